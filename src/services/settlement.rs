use crate::api::error::AppError;
use crate::config::AppConfig;
use crate::entities::{file_entries, file_entry_models, prelude::*, transactions, users};
use crate::services::audit::{AuditEventType, AuditService};
use crate::services::payments::{
    Gateways, PaymentIntent, PaymentProcessor, VerifiedPayment, is_valid_external_id,
};
use crate::utils::keyed_mutex::KeyedMutex;
use crate::utils::money::{net_amount, platform_fee};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
    SqlErr, TransactionTrait,
};
use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

/// Smallest charge Stripe accepts, in minor units
pub const MINIMUM_CHARGE: i64 = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Settlement {
    /// Provider payment id (Stripe payment intent, PayPal order)
    pub transaction_id: String,
    pub entry_id: String,
    /// Amount credited to the owner after the platform fee
    pub amount: i64,
    pub currency: String,
    /// True when the payment had been recorded before this request
    pub already_settled: bool,
}

impl Settlement {
    fn from_transaction(txn: transactions::Model, already_settled: bool) -> Self {
        Self {
            transaction_id: txn.transaction_id,
            entry_id: txn.file_entry_id.unwrap_or_default(),
            amount: txn.amount,
            currency: txn.currency,
            already_settled,
        }
    }
}

/// Confirms buyer payments against the provider and credits entry owners.
pub struct SettlementService {
    db: DatabaseConnection,
    config: AppConfig,
    gateways: Gateways,
    locks: KeyedMutex,
    audit: AuditService,
}

impl SettlementService {
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

    /// Loads the buyer's association on a live premium entry.
    async fn premium_association(
        &self,
        buyer_id: &str,
        entry_id: &str,
    ) -> Result<(file_entries::Model, file_entry_models::Model), AppError> {
        let entry = FileEntries::find_by_id(entry_id.to_string())
            .filter(file_entries::Column::DeletedAt.is_null())
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Entry not found".to_string()))?;

        let association = FileEntryModels::find()
            .filter(file_entry_models::Column::FileEntryId.eq(&entry.id))
            .filter(file_entry_models::Column::ModelId.eq(buyer_id))
            .filter(file_entry_models::Column::ModelType.eq(file_entry_models::MODEL_TYPE_USER))
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::Forbidden("Entry is not shared with you".to_string()))?;

        if !association.premium || association.price <= 0 {
            return Err(AppError::BadRequest(
                "Entry is not offered for purchase".to_string(),
            ));
        }

        Ok((entry, association))
    }

    /// Creates a Stripe payment intent for the buyer's price on the entry.
    pub async fn create_payment_intent(
        &self,
        buyer_id: &str,
        entry_id: &str,
    ) -> Result<PaymentIntent, AppError> {
        let (entry, association) = self.premium_association(buyer_id, entry_id).await?;

        if association.paid {
            return Err(AppError::BadRequest(
                "Entry has already been purchased".to_string(),
            ));
        }
        if association.price < MINIMUM_CHARGE {
            return Err(AppError::BadRequest(
                "Price is below the minimum charge amount".to_string(),
            ));
        }

        let intent = self
            .gateways
            .stripe
            .create_payment_intent(
                association.price,
                &self.config.currency,
                &[("entry_id", entry.id.as_str()), ("buyer_id", buyer_id)],
            )
            .await?;

        tracing::info!(
            "💳 Payment intent {} created for entry {} ({})",
            intent.id,
            entry.id,
            association.price
        );

        Ok(intent)
    }

    /// Records a completed buyer payment and credits the entry owner.
    ///
    /// The payment state is always fetched from the provider and must name
    /// this entry and buyer. Replaying an already recorded payment returns
    /// the original settlement without touching any balance.
    pub async fn settle(
        &self,
        processor: PaymentProcessor,
        external_id: &str,
        entry_id: &str,
        buyer_id: &str,
    ) -> Result<Settlement, AppError> {
        if !is_valid_external_id(external_id) {
            return Err(AppError::field("transaction_id", "Invalid payment id"));
        }

        let (entry, association) = self.premium_association(buyer_id, entry_id).await?;

        if let Some(existing) = self.find_settled(external_id).await? {
            return settled_for(existing, &entry.id, buyer_id);
        }

        let payment = self
            .gateways
            .provider(processor)
            .retrieve_payment(external_id)
            .await?;

        let checked = self.check_payment(&payment, association.price, &entry.id, buyer_id);
        if let Err(reason) = checked {
            tracing::warn!(
                "Rejected {} payment {} for entry {}: {}",
                processor,
                external_id,
                entry.id,
                reason
            );
            self.audit.log(
                AuditEventType::PaymentRejected,
                Some(buyer_id.to_string()),
                Some(entry.id.clone()),
                "settle",
                "rejected",
                Some(json!({ "processor": processor, "payment_id": external_id, "reason": reason })),
            );
            return Err(AppError::PaymentRequired(
                "Payment has not been completed".to_string(),
            ));
        }

        let gross = association.price;
        let net = net_amount(gross, self.config.platform_fee_percentage);

        let _guard = self.locks.lock(&entry.owner_id).await;

        let record = transactions::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            user_id: Set(entry.owner_id.clone()),
            payment_processor: Set(processor.as_str().to_string()),
            transaction_id: Set(payment.id.clone()),
            amount: Set(net),
            currency: Set(payment.currency.to_lowercase()),
            status: Set(payment.status.clone()),
            kind: Set(transactions::TYPE_ADD.to_string()),
            file_entry_id: Set(Some(entry.id.clone())),
            model_id: Set(Some(buyer_id.to_string())),
            created_at: Set(Utc::now()),
        };

        let txn = self.db.begin().await?;
        let inserted = match record.insert(&txn).await {
            Ok(inserted) => inserted,
            Err(e) if is_unique_violation(&e) => {
                // A concurrent confirmation of the same payment won the race
                drop(txn);
                return match self.find_settled(&payment.id).await? {
                    Some(existing) => settled_for(existing, &entry.id, buyer_id),
                    None => Err(AppError::Database(e)),
                };
            }
            Err(e) => return Err(e.into()),
        };

        FileEntryModels::update_many()
            .col_expr(file_entry_models::Column::Paid, Expr::value(true))
            .col_expr(file_entry_models::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(file_entry_models::Column::Id.eq(&association.id))
            .exec(&txn)
            .await?;

        let credited = Users::update_many()
            .col_expr(
                users::Column::Balance,
                Expr::col(users::Column::Balance).add(net),
            )
            .filter(users::Column::Id.eq(&entry.owner_id))
            .exec(&txn)
            .await?;

        if credited.rows_affected != 1 {
            return Err(AppError::NotFound("Entry owner not found".to_string()));
        }

        txn.commit().await?;

        tracing::info!(
            "💰 Settled {} payment {}: gross {}, fee {}, credited {} to {}",
            processor,
            inserted.transaction_id,
            gross,
            platform_fee(gross, self.config.platform_fee_percentage),
            net,
            entry.owner_id
        );

        self.audit.log(
            AuditEventType::PaymentSettled,
            Some(buyer_id.to_string()),
            Some(entry.id.clone()),
            "settle",
            "success",
            Some(json!({
                "processor": processor,
                "payment_id": inserted.transaction_id,
                "payee_id": entry.owner_id,
                "gross": gross,
                "net": net,
            })),
        );

        Ok(Settlement::from_transaction(inserted, false))
    }

    fn check_payment(
        &self,
        payment: &VerifiedPayment,
        price: i64,
        entry_id: &str,
        buyer_id: &str,
    ) -> Result<(), String> {
        if !payment.completed {
            return Err(format!("status is {}", payment.status));
        }
        match &payment.purchase {
            Some(purchase) if purchase.matches(entry_id, buyer_id) => {}
            Some(purchase) => {
                return Err(format!(
                    "payment belongs to entry {} for buyer {}",
                    purchase.entry_id, purchase.buyer_id
                ));
            }
            None => return Err("payment carries no purchase reference".to_string()),
        }
        if payment.amount < price {
            return Err(format!("amount {} is below price {}", payment.amount, price));
        }
        if !payment.currency.eq_ignore_ascii_case(&self.config.currency) {
            return Err(format!("unexpected currency {}", payment.currency));
        }
        Ok(())
    }

    async fn find_settled(&self, external_id: &str) -> Result<Option<transactions::Model>, DbErr> {
        Transactions::find()
            .filter(transactions::Column::TransactionId.eq(external_id))
            .filter(transactions::Column::Kind.eq(transactions::TYPE_ADD))
            .one(&self.db)
            .await
    }
}

/// A recorded payment only answers for the purchase it settled.
fn settled_for(
    existing: transactions::Model,
    entry_id: &str,
    buyer_id: &str,
) -> Result<Settlement, AppError> {
    let same_purchase = existing.file_entry_id.as_deref() == Some(entry_id)
        && existing.model_id.as_deref() == Some(buyer_id);
    if !same_purchase {
        return Err(AppError::PaymentRequired(
            "Payment belongs to another purchase".to_string(),
        ));
    }
    Ok(Settlement::from_transaction(existing, true))
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}
