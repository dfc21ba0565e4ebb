use crate::entities::{notifications, users};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{DatabaseConnection, EntityTrait, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const KIND_FILE_ENTRY_SHARED: &str = "file_entry_shared";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShareNotification {
    pub sharer_id: String,
    pub sharer_name: Option<String>,
    pub entry_ids: Vec<String>,
    pub entry_names: Vec<String>,
}

/// Delivery channel for "entries were shared with you" messages.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_share(
        &self,
        recipients: &[users::Model],
        notification: &ShareNotification,
    ) -> anyhow::Result<()>;
}

/// Stores notifications in the `notifications` table for the client to poll.
pub struct DatabaseNotifier {
    db: DatabaseConnection,
}

impl DatabaseNotifier {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Notifier for DatabaseNotifier {
    async fn notify_share(
        &self,
        recipients: &[users::Model],
        notification: &ShareNotification,
    ) -> anyhow::Result<()> {
        if recipients.is_empty() {
            return Ok(());
        }

        let data = serde_json::to_string(notification)?;
        let now = Utc::now();
        let rows = recipients.iter().map(|user| notifications::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            user_id: Set(user.id.clone()),
            kind: Set(KIND_FILE_ENTRY_SHARED.to_string()),
            data: Set(data.clone()),
            read_at: Set(None),
            created_at: Set(now),
        });

        notifications::Entity::insert_many(rows).exec(&self.db).await?;

        tracing::debug!(
            "📨 Share notification stored for {} recipient(s)",
            recipients.len()
        );
        Ok(())
    }
}
