use super::manage::EntryUser;
use super::{SharePermissions, ShareService};
use crate::api::error::AppError;
use crate::entities::{prelude::*, shareable_links};
use crate::services::audit::AuditEventType;
use argon2::{
    Argon2,
    password_hash::{PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use base64::Engine;
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct LinkOptions {
    pub allow_edit: bool,
    pub allow_download: bool,
    pub password: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// URL-safe random token identifying a shareable link
pub fn generate_token() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..24).map(|_| rng.r#gen()).collect();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&bytes)
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(e.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let parsed_hash =
        argon2::PasswordHash::new(hash).map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

impl ShareService {
    /// Creates a link through which signed-in users can add the entry to
    /// their drive. Only users allowed to update the entry may create one.
    pub async fn create_link(
        &self,
        actor_id: &str,
        entry_id: &str,
        options: LinkOptions,
    ) -> Result<shareable_links::Model, AppError> {
        let entry = self.find_entry(entry_id).await?;
        if !self.can_update(actor_id, &entry).await? {
            return Err(AppError::Forbidden(
                "You do not have permission to share this entry".to_string(),
            ));
        }

        if let Some(expires_at) = options.expires_at {
            if expires_at <= Utc::now() {
                return Err(AppError::field(
                    "expires_at",
                    "Expiry date must be in the future",
                ));
            }
        }

        let password_hash = match options.password.as_deref() {
            Some(p) if !p.is_empty() => Some(hash_password(p)?),
            _ => None,
        };

        let link = shareable_links::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            hash: Set(generate_token()),
            entry_id: Set(entry.id.clone()),
            user_id: Set(actor_id.to_string()),
            allow_edit: Set(options.allow_edit),
            allow_download: Set(options.allow_download || options.allow_edit),
            password_hash: Set(password_hash),
            expires_at: Set(options.expires_at),
            created_at: Set(Some(Utc::now())),
        }
        .insert(&self.db)
        .await?;

        self.audit.log(
            AuditEventType::ShareLinkCreate,
            Some(actor_id.to_string()),
            Some(entry.id),
            "create_link",
            "success",
            Some(json!({ "link_id": link.id, "protected": link.password_hash.is_some() })),
        );

        Ok(link)
    }

    /// Adds the link's entry (and its descendants) to the caller's drive with
    /// the permissions the link grants.
    pub async fn import_link(
        &self,
        user_id: &str,
        token: &str,
        password: Option<&str>,
    ) -> Result<Vec<EntryUser>, AppError> {
        let link = ShareableLinks::find()
            .filter(shareable_links::Column::Hash.eq(token))
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Shareable link not found".to_string()))?;

        if link.expires_at.is_some_and(|expires_at| expires_at <= Utc::now()) {
            return Err(AppError::Gone("Shareable link has expired".to_string()));
        }

        if let Some(hash) = link.password_hash.as_deref() {
            let supplied = password.unwrap_or_default();
            if supplied.is_empty() || !verify_password(supplied, hash)? {
                return Err(AppError::Forbidden("Invalid link password".to_string()));
            }
        }

        let entry = self.find_entry(&link.entry_id).await?;

        if entry.owner_id != user_id {
            let permissions = SharePermissions {
                view: true,
                edit: link.allow_edit,
                download: link.allow_download,
            };
            let created = self
                .propagate(&[user_id.to_string()], &[entry.id.clone()], permissions, false, 0)
                .await?;

            tracing::info!(
                "User {} imported entry {} via link ({} association(s))",
                user_id,
                entry.id,
                created
            );

            self.audit.log(
                AuditEventType::ShareLinkImport,
                Some(user_id.to_string()),
                Some(entry.id.clone()),
                "import_link",
                "success",
                Some(json!({ "link_id": link.id, "created": created })),
            );
        }

        self.entry_users(&entry.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_url_safe_and_unique() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_password_hash_roundtrip() {
        let hash = hash_password("hunter2").unwrap();
        assert!(verify_password("hunter2", &hash).unwrap());
        assert!(!verify_password("hunter3", &hash).unwrap());
    }
}
