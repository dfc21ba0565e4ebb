use crate::config::AppConfig;
use crate::services::audit::AuditService;
use crate::services::notifications::Notifier;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

pub mod attach;
pub mod jobs;
pub mod links;
pub mod manage;
pub mod permissions;
pub mod tree;

pub use attach::AttachRequest;
pub use jobs::{JobRunSummary, ShareJobPayload, ShareOutcome};
pub use links::LinkOptions;
pub use manage::{CURRENT_USER, EntryUser};
pub use permissions::SharePermissions;
pub use tree::EntryTreeWalker;

/// Sharing of drive entries between users: propagation over folder trees,
/// permission changes, removal, shareable links and deferred shares.
pub struct ShareService {
    db: DatabaseConnection,
    config: AppConfig,
    notifier: Arc<dyn Notifier>,
    audit: AuditService,
}

impl ShareService {
    pub fn new(
        db: DatabaseConnection,
        config: AppConfig,
        notifier: Arc<dyn Notifier>,
        audit: AuditService,
    ) -> Self {
        Self {
            db,
            config,
            notifier,
            audit,
        }
    }
}
