use crate::AppState;
use crate::api::error::AppError;
use crate::services::share_service::{
    AttachRequest, EntryUser, LinkOptions, SharePermissions, ShareOutcome,
};
use crate::utils::auth::Claims;
use crate::utils::validation::validate_emails;
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ShareRequest {
    #[validate(
        length(min = 1, message = "At least one email is required"),
        custom(function = "validate_emails")
    )]
    pub emails: Vec<String>,
    /// Entries to share; defaults to the entry in the path
    #[serde(default)]
    pub entry_ids: Vec<String>,
    #[serde(default)]
    pub permissions: SharePermissions,
    #[serde(default)]
    pub premium: bool,
    /// Price in minor units, required when `premium` is set
    #[serde(default)]
    #[validate(range(min = 0, message = "Price cannot be negative"))]
    pub price: i64,
    /// RFC 3339 time at which to perform the share
    pub scheduled_at: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ShareResponse {
    pub users: Vec<EntryUser>,
    pub scheduled: bool,
    pub job_id: Option<String>,
    pub run_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EntryUsersResponse {
    pub users: Vec<EntryUser>,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ChangePermissionsRequest {
    #[validate(length(min = 1, message = "User is required"))]
    pub user_id: String,
    pub permissions: SharePermissions,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RemoveUserQuery {
    /// User to remove, or `me`
    pub user_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RemoveUserResponse {
    pub removed: u64,
}

#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct CreateLinkRequest {
    #[serde(default)]
    pub allow_edit: bool,
    #[serde(default)]
    pub allow_download: bool,
    #[validate(length(min = 4, max = 128, message = "Password must be 4 to 128 characters"))]
    pub password: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ShareableLinkResponse {
    pub id: String,
    pub hash: String,
    pub url: String,
    pub entry_id: String,
    pub allow_edit: bool,
    pub allow_download: bool,
    pub password_protected: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ImportLinkRequest {
    pub password: Option<String>,
}

#[utoipa::path(
    post,
    path = "/file-entries/{id}/share",
    params(("id" = String, Path, description = "Entry id")),
    request_body = ShareRequest,
    responses(
        (status = 200, description = "Entry shared or share scheduled", body = ShareResponse),
        (status = 403, description = "No permission to share the entry"),
        (status = 422, description = "Invalid emails, price or schedule")
    ),
    security(("jwt" = [])),
    tag = "shares"
)]
pub async fn share_entry(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(payload): Json<ShareRequest>,
) -> Result<Json<ShareResponse>, AppError> {
    payload.validate()?;
    if payload.premium && payload.price <= 0 {
        return Err(AppError::field(
            "price",
            "Premium shares need a price above zero",
        ));
    }

    // The response lists this entry's users
    state
        .share_service
        .authorize_update(&claims.sub, std::slice::from_ref(&id))
        .await?;

    let entry_ids = if payload.entry_ids.is_empty() {
        vec![id.clone()]
    } else {
        payload.entry_ids
    };

    let request = AttachRequest {
        emails: payload.emails,
        entry_ids,
        permissions: payload.permissions,
        premium: payload.premium,
        price: payload.price,
    };

    let outcome = state
        .share_service
        .share(&claims.sub, request, payload.scheduled_at.as_deref())
        .await?;

    let (scheduled, job_id, run_at) = match outcome {
        ShareOutcome::Shared(_) => (false, None, None),
        ShareOutcome::Scheduled(job) => (true, Some(job.id), Some(job.run_at)),
    };

    let response = ShareResponse {
        users: state.share_service.entry_users(&id).await?,
        scheduled,
        job_id,
        run_at,
    };

    Ok(Json(response))
}

#[utoipa::path(
    get,
    path = "/file-entries/{id}/users",
    params(("id" = String, Path, description = "Entry id")),
    responses(
        (status = 200, description = "Users with access to the entry", body = EntryUsersResponse),
        (status = 404, description = "Entry not found")
    ),
    security(("jwt" = [])),
    tag = "shares"
)]
pub async fn list_entry_users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<EntryUsersResponse>, AppError> {
    let entry = state.share_service.find_entry(&id).await?;
    if !state.share_service.can_view(&claims.sub, &entry).await? {
        // Do not reveal entries the caller cannot see
        return Err(AppError::NotFound("Entry not found".to_string()));
    }

    let users = state.share_service.entry_users(&entry.id).await?;
    Ok(Json(EntryUsersResponse { users }))
}

#[utoipa::path(
    put,
    path = "/file-entries/{id}/change-permissions",
    params(("id" = String, Path, description = "Entry id")),
    request_body = ChangePermissionsRequest,
    responses(
        (status = 200, description = "Permissions updated", body = EntryUsersResponse),
        (status = 403, description = "No permission to modify the entry")
    ),
    security(("jwt" = [])),
    tag = "shares"
)]
pub async fn change_permissions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(payload): Json<ChangePermissionsRequest>,
) -> Result<Json<EntryUsersResponse>, AppError> {
    payload.validate()?;

    let users = state
        .share_service
        .change_permissions(&claims.sub, &id, &payload.user_id, payload.permissions)
        .await?;

    Ok(Json(EntryUsersResponse { users }))
}

#[utoipa::path(
    delete,
    path = "/file-entries/{ids}/remove-user",
    params(
        ("ids" = String, Path, description = "Comma separated entry ids"),
        RemoveUserQuery
    ),
    responses(
        (status = 200, description = "User removed from the entries", body = RemoveUserResponse),
        (status = 403, description = "No permission to modify the entries")
    ),
    security(("jwt" = [])),
    tag = "shares"
)]
pub async fn remove_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(ids): Path<String>,
    Query(query): Query<RemoveUserQuery>,
) -> Result<Json<RemoveUserResponse>, AppError> {
    let entry_ids: Vec<String> = ids
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(String::from)
        .collect();

    if entry_ids.is_empty() {
        return Err(AppError::field("ids", "At least one entry id is required"));
    }
    if query.user_id.trim().is_empty() {
        return Err(AppError::field("user_id", "User is required"));
    }

    let removed = state
        .share_service
        .detach_user(&claims.sub, &entry_ids, query.user_id.trim())
        .await?;

    Ok(Json(RemoveUserResponse { removed }))
}

#[utoipa::path(
    post,
    path = "/file-entries/{id}/shareable-link",
    params(("id" = String, Path, description = "Entry id")),
    request_body = CreateLinkRequest,
    responses(
        (status = 200, description = "Link created", body = ShareableLinkResponse),
        (status = 403, description = "No permission to share the entry")
    ),
    security(("jwt" = [])),
    tag = "shares"
)]
pub async fn create_shareable_link(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(payload): Json<CreateLinkRequest>,
) -> Result<Json<ShareableLinkResponse>, AppError> {
    payload.validate()?;

    let link = state
        .share_service
        .create_link(
            &claims.sub,
            &id,
            LinkOptions {
                allow_edit: payload.allow_edit,
                allow_download: payload.allow_download,
                password: payload.password,
                expires_at: payload.expires_at,
            },
        )
        .await?;

    Ok(Json(ShareableLinkResponse {
        url: format!(
            "{}/drive/s/{}",
            state.config.app_url.trim_end_matches('/'),
            link.hash
        ),
        id: link.id,
        hash: link.hash,
        entry_id: link.entry_id,
        allow_edit: link.allow_edit,
        allow_download: link.allow_download,
        password_protected: link.password_hash.is_some(),
        expires_at: link.expires_at,
    }))
}

#[utoipa::path(
    post,
    path = "/shareable-links/{id}/import",
    params(("id" = String, Path, description = "Link token")),
    request_body = ImportLinkRequest,
    responses(
        (status = 200, description = "Entry added to the caller's drive", body = EntryUsersResponse),
        (status = 403, description = "Wrong link password"),
        (status = 404, description = "Link not found"),
        (status = 410, description = "Link expired")
    ),
    security(("jwt" = [])),
    tag = "shares"
)]
pub async fn import_shareable_link(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    payload: Option<Json<ImportLinkRequest>>,
) -> Result<Json<EntryUsersResponse>, AppError> {
    let Json(payload) = payload.unwrap_or_default();

    let users = state
        .share_service
        .import_link(&claims.sub, &id, payload.password.as_deref())
        .await?;

    Ok(Json(EntryUsersResponse { users }))
}
