use crate::api::error::AppError;
use crate::config::AppConfig;
use crate::entities::{prelude::*, transactions, users};
use crate::services::audit::{AuditEventType, AuditService};
use crate::services::payments::Gateways;
use crate::utils::keyed_mutex::KeyedMutex;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

pub const STATUS_WITHDRAWN: &str = "Withdrawn";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Withdrawal {
    /// Transfer id assigned by the payout provider
    pub transaction_id: String,
    pub amount: i64,
    pub currency: String,
    /// Balance left after the withdrawal
    pub balance: i64,
}

/// Pays out earned balances to the owners' connected accounts.
pub struct WithdrawService {
    db: DatabaseConnection,
    config: AppConfig,
    gateways: Gateways,
    locks: KeyedMutex,
    audit: AuditService,
}

impl WithdrawService {
    pub fn new(
        db: DatabaseConnection,
        config: AppConfig,
        gateways: Gateways,
        locks: KeyedMutex,
        audit: AuditService,
    ) -> Self {
        Self {
            db,
            config,
            gateways,
            locks,
            audit,
        }
    }

    async fn find_user(&self, user_id: &str) -> Result<users::Model, AppError> {
        Users::find_by_id(user_id.to_string())
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    /// Transfers the whole balance to the user's connected account.
    ///
    /// The balance is only decremented once the transfer succeeded; a failed
    /// transfer leaves it untouched.
    pub async fn withdraw(&self, user_id: &str) -> Result<Withdrawal, AppError> {
        let _guard = self.locks.lock(user_id).await;

        let user = self.find_user(user_id).await?;
        if user.balance <= 0 {
            return Err(AppError::BadRequest("Nothing to withdraw".to_string()));
        }
        let destination = user
            .stripe_account_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::BadRequest("No payout account connected".to_string()))?;

        let amount = user.balance;
        let idempotency_key = Uuid::new_v4().to_string();

        let transfer = match self
            .gateways
            .payouts
            .transfer(amount, &self.config.currency, &destination, &idempotency_key)
            .await
        {
            Ok(transfer) => transfer,
            Err(e) => {
                tracing::error!("Withdrawal transfer for user {} failed: {}", user_id, e);
                self.audit.log(
                    AuditEventType::WithdrawalFailed,
                    Some(user_id.to_string()),
                    None,
                    "withdraw",
                    "failure",
                    Some(json!({ "amount": amount, "error": e.to_string() })),
                );
                return Err(e.into());
            }
        };

        let txn = self.db.begin().await?;

        transactions::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            user_id: Set(user.id.clone()),
            payment_processor: Set(self.gateways.payouts.processor().as_str().to_string()),
            transaction_id: Set(transfer.id.clone()),
            amount: Set(transfer.amount),
            currency: Set(transfer.currency.to_lowercase()),
            status: Set(STATUS_WITHDRAWN.to_string()),
            kind: Set(transactions::TYPE_SUBTRACT.to_string()),
            file_entry_id: Set(None),
            model_id: Set(None),
            created_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await?;

        let debited = Users::update_many()
            .col_expr(
                users::Column::Balance,
                Expr::col(users::Column::Balance).sub(transfer.amount),
            )
            .filter(users::Column::Id.eq(&user.id))
            .filter(users::Column::Balance.gte(transfer.amount))
            .exec(&txn)
            .await?;

        if debited.rows_affected != 1 {
            // Money already left; needs manual reconciliation
            tracing::error!(
                "Transfer {} of {} succeeded but balance of user {} could not be debited",
                transfer.id,
                transfer.amount,
                user.id
            );
            return Err(AppError::Internal(
                "Balance changed during withdrawal".to_string(),
            ));
        }

        txn.commit().await?;

        let balance = user.balance - transfer.amount;

        tracing::info!(
            "🏦 User {} withdrew {} {} (transfer {})",
            user.id,
            transfer.amount,
            transfer.currency,
            transfer.id
        );

        self.audit.log(
            AuditEventType::Withdrawal,
            Some(user.id.clone()),
            Some(transfer.id.clone()),
            "withdraw",
            "success",
            Some(json!({ "amount": transfer.amount, "destination": destination })),
        );

        Ok(Withdrawal {
            transaction_id: transfer.id,
            amount: transfer.amount,
            currency: transfer.currency,
            balance,
        })
    }

    /// Returns a hosted onboarding URL, creating the connected account first
    /// when the user has none.
    pub async fn connect_account(&self, user_id: &str) -> Result<String, AppError> {
        let user = self.find_user(user_id).await?;

        let account_id = match user.stripe_account_id.clone().filter(|id| !id.is_empty()) {
            Some(id) => id,
            None => {
                let id = self
                    .gateways
                    .payouts
                    .create_connected_account(&user.email)
                    .await?;

                let mut active: users::ActiveModel = user.clone().into();
                active.stripe_account_id = Set(Some(id.clone()));
                active.update(&self.db).await?;
                id
            }
        };

        let base = self.config.app_url.trim_end_matches('/');
        let url = self
            .gateways
            .payouts
            .create_onboarding_link(
                &account_id,
                &format!("{}/earnings?connect=refresh", base),
                &format!("{}/earnings?connect=done", base),
            )
            .await?;

        self.audit.log(
            AuditEventType::PayoutAccountConnect,
            Some(user.id),
            Some(account_id),
            "connect_account",
            "success",
            None,
        );

        Ok(url)
    }

    /// Forgets the connected account so the user can onboard again.
    pub async fn reset_account(&self, user_id: &str) -> Result<(), AppError> {
        let user = self.find_user(user_id).await?;
        let previous = user.stripe_account_id.clone();

        let mut active: users::ActiveModel = user.into();
        active.stripe_account_id = Set(None);
        active.update(&self.db).await?;

        self.audit.log(
            AuditEventType::PayoutAccountReset,
            Some(user_id.to_string()),
            previous,
            "reset_account",
            "success",
            None,
        );

        Ok(())
    }
}
