use crate::api::error::AppError;
use crate::config::AppConfig;
use crate::entities::{prelude::*, transactions};
use sea_orm::sea_query::{Alias, Expr, Func};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use serde::Serialize;
use utoipa::ToSchema;

pub const DEFAULT_PER_PAGE: u64 = 15;
pub const MAX_PER_PAGE: u64 = 100;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TransactionView {
    pub id: String,
    pub payment_processor: String,
    pub transaction_id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub file_entry_id: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<transactions::Model> for TransactionView {
    fn from(m: transactions::Model) -> Self {
        Self {
            id: m.id,
            payment_processor: m.payment_processor,
            transaction_id: m.transaction_id,
            amount: m.amount,
            currency: m.currency,
            status: m.status,
            kind: m.kind,
            file_entry_id: m.file_entry_id,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TransactionPage {
    pub data: Vec<TransactionView>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    pub last_page: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Earnings {
    pub balance: i64,
    pub total_earned: i64,
    pub total_withdrawn: i64,
    pub currency: String,
}

/// Read-only views over a user's transactions and balance.
pub struct LedgerService {
    db: DatabaseConnection,
    config: AppConfig,
}

impl LedgerService {
    pub fn new(db: DatabaseConnection, config: AppConfig) -> Self {
        Self { db, config }
    }

    /// Newest first. `page` is 1-based; `per_page` is clamped to
    /// `1..=MAX_PER_PAGE`.
    pub async fn transactions(
        &self,
        user_id: &str,
        page: Option<u64>,
        per_page: Option<u64>,
    ) -> Result<TransactionPage, AppError> {
        let page = page.unwrap_or(1).max(1);
        let per_page = per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);

        let paginator = Transactions::find()
            .filter(transactions::Column::UserId.eq(user_id))
            .order_by_desc(transactions::Column::CreatedAt)
            .order_by_desc(transactions::Column::Id)
            .paginate(&self.db, per_page);

        let counts = paginator.num_items_and_pages().await?;
        let data = paginator
            .fetch_page(page - 1)
            .await?
            .into_iter()
            .map(TransactionView::from)
            .collect();

        Ok(TransactionPage {
            data,
            total: counts.number_of_items,
            page,
            per_page,
            last_page: counts.number_of_pages.max(1),
        })
    }

    pub async fn earnings(&self, user_id: &str) -> Result<Earnings, AppError> {
        let user = Users::find_by_id(user_id.to_string())
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let totals: Vec<(String, i64)> = Transactions::find()
            .select_only()
            .column(transactions::Column::Kind)
            .column_as(
                Expr::expr(Func::sum(Expr::col(transactions::Column::Amount)))
                    .cast_as(Alias::new("BIGINT")),
                "total",
            )
            .filter(transactions::Column::UserId.eq(user_id))
            .group_by(transactions::Column::Kind)
            .into_tuple()
            .all(&self.db)
            .await?;

        let total_for = |kind: &str| {
            totals
                .iter()
                .find(|(k, _)| k == kind)
                .map(|(_, total)| *total)
                .unwrap_or(0)
        };

        Ok(Earnings {
            balance: user.balance,
            total_earned: total_for(transactions::TYPE_ADD),
            total_withdrawn: total_for(transactions::TYPE_SUBTRACT),
            currency: self.config.currency.clone(),
        })
    }
}
