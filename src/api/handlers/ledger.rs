use crate::AppState;
use crate::api::error::AppError;
use crate::services::ledger::{Earnings, TransactionPage};
use crate::utils::auth::Claims;
use axum::{
    Extension, Json,
    extract::{Query, State},
};
use serde::Deserialize;
use utoipa::IntoParams;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TransactionsQuery {
    /// 1-based page number
    pub page: Option<u64>,
    /// Page size (default 15, max 100)
    pub per_page: Option<u64>,
}

#[utoipa::path(
    get,
    path = "/transactions",
    params(TransactionsQuery),
    responses(
        (status = 200, description = "Caller's transactions, newest first", body = TransactionPage)
    ),
    security(("jwt" = [])),
    tag = "ledger"
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<TransactionsQuery>,
) -> Result<Json<TransactionPage>, AppError> {
    let page = state
        .ledger
        .transactions(&claims.sub, query.page, query.per_page)
        .await?;
    Ok(Json(page))
}

#[utoipa::path(
    get,
    path = "/earnings",
    responses(
        (status = 200, description = "Balance and lifetime totals", body = Earnings)
    ),
    security(("jwt" = [])),
    tag = "ledger"
)]
pub async fn earnings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Earnings>, AppError> {
    let earnings = state.ledger.earnings(&claims.sub).await?;
    Ok(Json(earnings))
}
