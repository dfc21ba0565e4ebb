use super::tree::{EntryTreeWalker, live_entry_ids};
use super::{SharePermissions, ShareService};
use crate::api::error::AppError;
use crate::entities::{file_entry_models, prelude::*, users};
use crate::utils::validation::normalize_emails;
use chrono::Utc;
use sea_orm::sea_query::{Expr, Func};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QuerySelect, Set,
    TransactionTrait,
};
use std::collections::HashSet;
use uuid::Uuid;

/// Rows per INSERT, keeping bound parameters under SQLite's limit.
const INSERT_ROWS_PER_STATEMENT: usize = 75;

#[derive(Debug, Clone)]
pub struct AttachRequest {
    pub emails: Vec<String>,
    pub entry_ids: Vec<String>,
    pub permissions: SharePermissions,
    pub premium: bool,
    pub price: i64,
}

impl ShareService {
    /// Grants every user matching `emails` access to the requested entries and
    /// to all of their current descendants.
    ///
    /// Unknown emails are dropped. Existing associations are left untouched,
    /// so repeating a share never duplicates rows. Returns the resolved users.
    pub async fn attach_users(&self, request: &AttachRequest) -> Result<Vec<users::Model>, AppError> {
        let emails = normalize_emails(&request.emails);
        if emails.is_empty() {
            return Ok(Vec::new());
        }

        let roots = live_entry_ids(&self.db, &request.entry_ids).await?;
        if roots.is_empty() {
            return Err(AppError::NotFound("Entry not found".to_string()));
        }

        let sharees = self.resolve_recipients(&emails).await?;

        if sharees.len() < emails.len() {
            tracing::debug!(
                "Dropped {} share recipient(s) without an account",
                emails.len() - sharees.len()
            );
        }

        let user_ids: Vec<String> = sharees.iter().map(|u| u.id.clone()).collect();
        let created = self
            .propagate(
                &user_ids,
                &roots,
                request.permissions,
                request.premium,
                request.price,
            )
            .await?;

        tracing::info!(
            "🔗 Shared {} root entr(y/ies) with {} user(s), {} association(s) created",
            roots.len(),
            sharees.len(),
            created
        );

        Ok(sharees)
    }

    /// Existing users whose email matches one of `emails`, ignoring case.
    /// Looked up in recipient-sized chunks.
    async fn resolve_recipients(&self, emails: &[String]) -> Result<Vec<users::Model>, AppError> {
        let mut seen = HashSet::new();
        let mut sharees = Vec::new();

        for chunk in emails.chunks(self.config.share_recipient_chunk_size.max(1)) {
            let found = Users::find()
                .filter(
                    Expr::expr(Func::lower(Expr::col(users::Column::Email)))
                        .is_in(chunk.iter().cloned()),
                )
                .all(&self.db)
                .await?;
            sharees.extend(found.into_iter().filter(|u| seen.insert(u.id.clone())));
        }

        Ok(sharees)
    }

    /// Attaches `user_ids` to `roots` and every current descendant, skipping
    /// pairs that already exist. Returns the number of associations created.
    pub(crate) async fn propagate(
        &self,
        user_ids: &[String],
        roots: &[String],
        permissions: SharePermissions,
        premium: bool,
        price: i64,
    ) -> Result<usize, AppError> {
        let permissions = permissions.normalized().to_json();
        let price = if premium { price.max(0) } else { 0 };
        let mut created = 0usize;

        for recipients in user_ids.chunks(self.config.share_recipient_chunk_size.max(1)) {
            let mut walker =
                EntryTreeWalker::new(roots.to_vec(), self.config.share_entry_chunk_size);

            while let Some(entry_ids) = walker.next_batch(&self.db).await? {
                let txn = self.db.begin().await?;
                created +=
                    attach_batch(&txn, recipients, &entry_ids, &permissions, premium, price)
                        .await?;
                txn.commit().await?;
            }
        }

        Ok(created)
    }
}

/// Inserts the missing `(user, entry)` associations of one batch.
async fn attach_batch<C: ConnectionTrait>(
    db: &C,
    user_ids: &[String],
    entry_ids: &[String],
    permissions: &str,
    premium: bool,
    price: i64,
) -> Result<usize, DbErr> {
    // A shared folder may contain entries already shared with some of these
    // users, possibly by a different owner.
    let existing: HashSet<(String, String)> = FileEntryModels::find()
        .select_only()
        .column(file_entry_models::Column::ModelId)
        .column(file_entry_models::Column::FileEntryId)
        .filter(file_entry_models::Column::ModelType.eq(file_entry_models::MODEL_TYPE_USER))
        .filter(file_entry_models::Column::ModelId.is_in(user_ids.to_vec()))
        .filter(file_entry_models::Column::FileEntryId.is_in(entry_ids.to_vec()))
        .into_tuple::<(String, String)>()
        .all(db)
        .await?
        .into_iter()
        .collect();

    let now = Utc::now();
    let mut records: Vec<file_entry_models::ActiveModel> = user_ids
        .iter()
        .flat_map(|user_id| entry_ids.iter().map(move |entry_id| (user_id, entry_id)))
        .filter(|(user_id, entry_id)| !existing.contains(&((*user_id).clone(), (*entry_id).clone())))
        .map(|(user_id, entry_id)| file_entry_models::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            file_entry_id: Set(entry_id.clone()),
            model_id: Set(user_id.clone()),
            model_type: Set(file_entry_models::MODEL_TYPE_USER.to_string()),
            permissions: Set(permissions.to_string()),
            owner: Set(false),
            premium: Set(premium),
            price: Set(price),
            paid: Set(false),
            created_at: Set(Some(now)),
            updated_at: Set(Some(now)),
        })
        .collect();

    let created = records.len();
    while !records.is_empty() {
        let take = INSERT_ROWS_PER_STATEMENT.min(records.len());
        let statement: Vec<_> = records.drain(..take).collect();
        FileEntryModels::insert_many(statement).exec(db).await?;
    }

    Ok(created)
}
