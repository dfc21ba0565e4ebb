use super::{AttachRequest, SharePermissions, ShareService};
use crate::api::error::AppError;
use crate::entities::{file_entries, prelude::*, share_jobs, users};
use crate::services::audit::AuditEventType;
use crate::services::notifications::ShareNotification;
use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

/// Base delay before a failed job is retried; doubles per attempt.
const RETRY_BASE_SECS: i64 = 30;

/// Stored form of a deferred share
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareJobPayload {
    pub emails: Vec<String>,
    pub entry_ids: Vec<String>,
    pub permissions: SharePermissions,
    #[serde(default)]
    pub premium: bool,
    #[serde(default)]
    pub price: i64,
}

impl From<&AttachRequest> for ShareJobPayload {
    fn from(request: &AttachRequest) -> Self {
        Self {
            emails: request.emails.clone(),
            entry_ids: request.entry_ids.clone(),
            permissions: request.permissions,
            premium: request.premium,
            price: request.price,
        }
    }
}

impl From<ShareJobPayload> for AttachRequest {
    fn from(payload: ShareJobPayload) -> Self {
        Self {
            emails: payload.emails,
            entry_ids: payload.entry_ids,
            permissions: payload.permissions,
            premium: payload.premium,
            price: payload.price,
        }
    }
}

#[derive(Debug)]
pub enum ShareOutcome {
    /// Executed inline; holds the resolved recipients
    Shared(Vec<users::Model>),
    Scheduled(share_jobs::Model),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct JobRunSummary {
    pub completed: usize,
    pub retried: usize,
    pub failed: usize,
}

/// Parses an RFC 3339 schedule that must lie strictly in the future.
pub fn parse_schedule(raw: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, AppError> {
    let run_at = DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| AppError::field("scheduled_at", "Invalid date format, expected RFC 3339"))?;

    if run_at <= now {
        return Err(AppError::field(
            "scheduled_at",
            "Scheduled time must be in the future",
        ));
    }

    Ok(run_at)
}

fn retry_delay(attempts: i32) -> Duration {
    let exponent = attempts.clamp(1, 10) as u32 - 1;
    Duration::seconds(RETRY_BASE_SECS * 2i64.pow(exponent))
}

impl ShareService {
    /// Entry point of the share endpoint: checks that the sharer may update
    /// every entry, then either shares right away or queues a job.
    pub async fn share(
        &self,
        sharer_id: &str,
        request: AttachRequest,
        scheduled_at: Option<&str>,
    ) -> Result<ShareOutcome, AppError> {
        // Rejected before anything else so a bad schedule never queues a job
        let run_at = match scheduled_at.filter(|s| !s.trim().is_empty()) {
            Some(raw) => Some(parse_schedule(raw, Utc::now())?),
            None => None,
        };

        self.authorize_update(sharer_id, &request.entry_ids).await?;

        match run_at {
            Some(run_at) => {
                let job = self.schedule_share(sharer_id, &request, run_at).await?;
                Ok(ShareOutcome::Scheduled(job))
            }
            None => {
                let recipients = self.run_share(sharer_id, &request).await?;
                Ok(ShareOutcome::Shared(recipients))
            }
        }
    }

    pub async fn schedule_share(
        &self,
        sharer_id: &str,
        request: &AttachRequest,
        run_at: DateTime<Utc>,
    ) -> Result<share_jobs::Model, AppError> {
        let payload = serde_json::to_string(&ShareJobPayload::from(request))
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let now = Utc::now();

        let job = share_jobs::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            sharer_id: Set(sharer_id.to_string()),
            payload: Set(payload),
            status: Set(share_jobs::STATUS_PENDING.to_string()),
            attempts: Set(0),
            run_at: Set(run_at),
            last_error: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.db)
        .await?;

        tracing::info!("⏰ Share job {} scheduled for {}", job.id, run_at);

        self.audit.log(
            AuditEventType::ShareSchedule,
            Some(sharer_id.to_string()),
            Some(request.entry_ids.join(",")),
            "schedule_share",
            "success",
            Some(json!({ "job_id": job.id, "run_at": run_at })),
        );

        Ok(job)
    }

    /// Attaches the recipients and notifies them.
    pub async fn run_share(
        &self,
        sharer_id: &str,
        request: &AttachRequest,
    ) -> Result<Vec<users::Model>, AppError> {
        let recipients = self.attach_users(request).await?;

        self.audit.log(
            AuditEventType::ShareAttach,
            Some(sharer_id.to_string()),
            Some(request.entry_ids.join(",")),
            "attach_users",
            "success",
            Some(json!({ "recipients": recipients.len(), "premium": request.premium })),
        );

        self.notify_recipients(sharer_id, &recipients, &request.entry_ids)
            .await;

        Ok(recipients)
    }

    /// Failures are logged; a share never fails because of its notification.
    async fn notify_recipients(
        &self,
        sharer_id: &str,
        recipients: &[users::Model],
        entry_ids: &[String],
    ) {
        if !self.config.send_share_notification || recipients.is_empty() {
            return;
        }

        let notification = match self.share_notification(sharer_id, entry_ids).await {
            Ok(notification) => notification,
            Err(e) => {
                tracing::warn!("Could not build share notification: {}", e);
                return;
            }
        };

        if let Err(e) = self.notifier.notify_share(recipients, &notification).await {
            tracing::warn!(
                "Failed to notify {} recipient(s) of share by {}: {:#}",
                recipients.len(),
                sharer_id,
                e
            );
        }
    }

    async fn share_notification(
        &self,
        sharer_id: &str,
        entry_ids: &[String],
    ) -> Result<ShareNotification, sea_orm::DbErr> {
        let sharer = Users::find_by_id(sharer_id.to_string()).one(&self.db).await?;

        let entry_names: Vec<String> = FileEntries::find()
            .select_only()
            .column(file_entries::Column::Name)
            .filter(file_entries::Column::Id.is_in(entry_ids.to_vec()))
            .into_tuple()
            .all(&self.db)
            .await?;

        Ok(ShareNotification {
            sharer_id: sharer_id.to_string(),
            sharer_name: sharer.and_then(|u| u.name),
            entry_ids: entry_ids.to_vec(),
            entry_names,
        })
    }

    /// Runs up to `limit` pending jobs whose time has come.
    ///
    /// Each job is claimed with a conditional status update, so concurrent
    /// workers never run the same job twice at once. Failed jobs are retried
    /// with exponential backoff until `share_job_max_attempts` is reached.
    pub async fn process_due_jobs(&self, limit: u64) -> Result<JobRunSummary, AppError> {
        let now = Utc::now();
        let due = ShareJobs::find()
            .filter(share_jobs::Column::Status.eq(share_jobs::STATUS_PENDING))
            .filter(share_jobs::Column::RunAt.lte(now))
            .order_by_asc(share_jobs::Column::RunAt)
            .limit(limit)
            .all(&self.db)
            .await?;

        let mut summary = JobRunSummary::default();

        for job in due {
            let claimed = ShareJobs::update_many()
                .col_expr(
                    share_jobs::Column::Status,
                    Expr::value(share_jobs::STATUS_RUNNING),
                )
                .col_expr(
                    share_jobs::Column::Attempts,
                    Expr::col(share_jobs::Column::Attempts).add(1),
                )
                .col_expr(share_jobs::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(share_jobs::Column::Id.eq(&job.id))
                .filter(share_jobs::Column::Status.eq(share_jobs::STATUS_PENDING))
                .exec(&self.db)
                .await?;

            if claimed.rows_affected != 1 {
                continue;
            }

            let attempts = job.attempts + 1;
            let (result, retryable) = match serde_json::from_str::<ShareJobPayload>(&job.payload)
            {
                Ok(payload) => (
                    self.run_share(&job.sharer_id, &payload.into())
                        .await
                        .map(|_| ())
                        .map_err(|e| e.to_string()),
                    true,
                ),
                Err(e) => (Err(format!("invalid payload: {}", e)), false),
            };

            let mut active: share_jobs::ActiveModel = job.into();
            active.attempts = Set(attempts);
            active.updated_at = Set(Utc::now());

            match result {
                Ok(()) => {
                    active.status = Set(share_jobs::STATUS_COMPLETED.to_string());
                    active.last_error = Set(None);
                    summary.completed += 1;
                }
                Err(message) => {
                    let exhausted =
                        !retryable || attempts >= self.config.share_job_max_attempts;
                    if exhausted {
                        tracing::error!("Share job failed permanently: {}", message);
                        active.status = Set(share_jobs::STATUS_FAILED.to_string());
                        summary.failed += 1;
                    } else {
                        tracing::warn!("Share job attempt {} failed: {}", attempts, message);
                        active.status = Set(share_jobs::STATUS_PENDING.to_string());
                        active.run_at = Set(Utc::now() + retry_delay(attempts));
                        summary.retried += 1;
                    }
                    active.last_error = Set(Some(message));
                }
            }

            active.update(&self.db).await?;
        }

        if summary != JobRunSummary::default() {
            tracing::info!(
                "Share jobs processed: {} completed, {} retried, {} failed",
                summary.completed,
                summary.retried,
                summary.failed
            );
        }

        Ok(summary)
    }

    /// Returns jobs stuck in `running` (e.g. after a crash) to the queue.
    pub async fn recover_stale_jobs(&self, older_than: Duration) -> Result<u64, AppError> {
        let result = ShareJobs::update_many()
            .col_expr(
                share_jobs::Column::Status,
                Expr::value(share_jobs::STATUS_PENDING),
            )
            .col_expr(share_jobs::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(share_jobs::Column::Status.eq(share_jobs::STATUS_RUNNING))
            .filter(share_jobs::Column::UpdatedAt.lt(Utc::now() - older_than))
            .exec(&self.db)
            .await?;

        if result.rows_affected > 0 {
            tracing::warn!("Requeued {} stale share job(s)", result.rows_affected);
        }

        Ok(result.rows_affected)
    }
}
