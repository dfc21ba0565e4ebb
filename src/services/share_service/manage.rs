use super::tree::{EntryTreeWalker, live_entry_ids};
use super::{SharePermissions, ShareService};
use crate::api::error::AppError;
use crate::entities::{file_entries, file_entry_models, prelude::*, users};
use crate::services::audit::AuditEventType;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    TransactionTrait,
};
use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;

/// Caller alias accepted by the remove-user endpoint
pub const CURRENT_USER: &str = "me";

/// A user with access to an entry, as shown in the share dialog
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EntryUser {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub permissions: SharePermissions,
    pub owns_entry: bool,
    pub premium: bool,
    pub price: i64,
    pub paid: bool,
}

impl ShareService {
    /// Loads a live (not soft-deleted) entry.
    pub async fn find_entry(&self, entry_id: &str) -> Result<file_entries::Model, AppError> {
        FileEntries::find_by_id(entry_id.to_string())
            .filter(file_entries::Column::DeletedAt.is_null())
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Entry not found".to_string()))
    }

    /// Whether `user_id` may modify the entry: the owner, or a user holding
    /// an association with edit permission.
    pub async fn can_update(
        &self,
        user_id: &str,
        entry: &file_entries::Model,
    ) -> Result<bool, AppError> {
        if entry.owner_id == user_id {
            return Ok(true);
        }

        let association = FileEntryModels::find()
            .filter(file_entry_models::Column::FileEntryId.eq(&entry.id))
            .filter(file_entry_models::Column::ModelId.eq(user_id))
            .filter(file_entry_models::Column::ModelType.eq(file_entry_models::MODEL_TYPE_USER))
            .one(&self.db)
            .await?;

        Ok(association.is_some_and(|a| {
            a.owner || SharePermissions::from_json(&a.permissions).edit
        }))
    }

    /// Whether `user_id` can see the entry at all.
    pub async fn can_view(
        &self,
        user_id: &str,
        entry: &file_entries::Model,
    ) -> Result<bool, AppError> {
        if entry.owner_id == user_id {
            return Ok(true);
        }

        let associations = FileEntryModels::find()
            .filter(file_entry_models::Column::FileEntryId.eq(&entry.id))
            .filter(file_entry_models::Column::ModelId.eq(user_id))
            .filter(file_entry_models::Column::ModelType.eq(file_entry_models::MODEL_TYPE_USER))
            .count(&self.db)
            .await?;

        Ok(associations > 0)
    }

    /// Fails with `Forbidden` unless `user_id` may update every listed entry.
    pub async fn authorize_update(
        &self,
        user_id: &str,
        entry_ids: &[String],
    ) -> Result<(), AppError> {
        for entry_id in entry_ids {
            let entry = self.find_entry(entry_id).await?;
            if !self.can_update(user_id, &entry).await? {
                return Err(AppError::Forbidden(
                    "You do not have permission to modify this entry".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Users associated with the entry, owner first.
    pub async fn entry_users(&self, entry_id: &str) -> Result<Vec<EntryUser>, AppError> {
        let entry = self.find_entry(entry_id).await?;

        let rows = FileEntryModels::find()
            .filter(file_entry_models::Column::FileEntryId.eq(&entry.id))
            .filter(file_entry_models::Column::ModelType.eq(file_entry_models::MODEL_TYPE_USER))
            .order_by_desc(file_entry_models::Column::Owner)
            .order_by_asc(file_entry_models::Column::CreatedAt)
            .find_also_related(Users)
            .all(&self.db)
            .await?;

        let mut result: Vec<EntryUser> = rows
            .into_iter()
            .filter_map(|(association, user)| user.map(|u| (association, u)))
            .map(|(association, user)| EntryUser {
                id: user.id,
                email: user.email,
                name: user.name,
                permissions: if association.owner {
                    SharePermissions::owner()
                } else {
                    SharePermissions::from_json(&association.permissions)
                },
                owns_entry: association.owner || association.model_id == entry.owner_id,
                premium: association.premium,
                price: association.price,
                paid: association.paid,
            })
            .collect();

        // Entries created outside the share flow may lack an owner association
        if !result.iter().any(|u| u.id == entry.owner_id) {
            if let Some(owner) = Users::find_by_id(entry.owner_id.clone()).one(&self.db).await? {
                result.insert(
                    0,
                    EntryUser {
                        id: owner.id,
                        email: owner.email,
                        name: owner.name,
                        permissions: SharePermissions::owner(),
                        owns_entry: true,
                        premium: false,
                        price: 0,
                        paid: false,
                    },
                );
            }
        }

        Ok(result)
    }

    /// Replaces the permissions of one user's shared associations on the entry
    /// and all of its descendants.
    pub async fn change_permissions(
        &self,
        actor_id: &str,
        entry_id: &str,
        target_user_id: &str,
        permissions: SharePermissions,
    ) -> Result<Vec<EntryUser>, AppError> {
        let entry = self.find_entry(entry_id).await?;
        if !self.can_update(actor_id, &entry).await? {
            return Err(AppError::Forbidden(
                "You do not have permission to modify this entry".to_string(),
            ));
        }

        let encoded = permissions.normalized().to_json();
        let mut walker =
            EntryTreeWalker::new(vec![entry.id.clone()], self.config.share_entry_chunk_size);
        let mut updated = 0u64;

        while let Some(batch) = walker.next_batch(&self.db).await? {
            let result = FileEntryModels::update_many()
                .col_expr(file_entry_models::Column::Permissions, Expr::value(encoded.clone()))
                .col_expr(file_entry_models::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(non_owner_rows(target_user_id, batch))
                .exec(&self.db)
                .await?;
            updated += result.rows_affected;
        }

        tracing::info!(
            "Permissions of user {} changed on {} association(s) under entry {}",
            target_user_id,
            updated,
            entry.id
        );

        self.audit.log(
            AuditEventType::SharePermissionsChange,
            Some(actor_id.to_string()),
            Some(entry.id.clone()),
            "change_permissions",
            "success",
            Some(json!({ "target_user_id": target_user_id, "permissions": permissions.normalized() })),
        );

        self.entry_users(&entry.id).await
    }

    /// Removes a user's shared associations from the entries and everything
    /// below them. `target` may be [`CURRENT_USER`].
    ///
    /// Leaving a share needs no rights; removing someone else requires update
    /// rights on every entry. Owner associations are never removed.
    pub async fn detach_user(
        &self,
        actor_id: &str,
        entry_ids: &[String],
        target: &str,
    ) -> Result<u64, AppError> {
        let target_user_id = if target == CURRENT_USER { actor_id } else { target };

        let roots = live_entry_ids(&self.db, entry_ids).await?;
        if roots.is_empty() {
            return Err(AppError::NotFound("Entry not found".to_string()));
        }

        if target_user_id != actor_id {
            self.authorize_update(actor_id, &roots).await?;
        }

        let mut walker = EntryTreeWalker::new(roots.clone(), self.config.share_entry_chunk_size);
        let mut removed = 0u64;

        while let Some(batch) = walker.next_batch(&self.db).await? {
            let txn = self.db.begin().await?;
            let result = FileEntryModels::delete_many()
                .filter(non_owner_rows(target_user_id, batch))
                .exec(&txn)
                .await?;
            txn.commit().await?;
            removed += result.rows_affected;
        }

        tracing::info!(
            "Detached user {} from {} association(s)",
            target_user_id,
            removed
        );

        self.audit.log(
            AuditEventType::ShareDetach,
            Some(actor_id.to_string()),
            Some(roots.join(",")),
            "detach_user",
            "success",
            Some(json!({ "target_user_id": target_user_id, "removed": removed })),
        );

        Ok(removed)
    }
}

fn non_owner_rows(user_id: &str, entry_ids: Vec<String>) -> Condition {
    Condition::all()
        .add(file_entry_models::Column::ModelId.eq(user_id))
        .add(file_entry_models::Column::ModelType.eq(file_entry_models::MODEL_TYPE_USER))
        .add(file_entry_models::Column::Owner.eq(false))
        .add(file_entry_models::Column::FileEntryId.is_in(entry_ids))
}
