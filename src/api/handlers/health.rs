use crate::AppState;
use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub payments: PaymentsHealth,
    pub version: String,
}

/// Which payment gateways have credentials configured
#[derive(Serialize, ToSchema)]
pub struct PaymentsHealth {
    pub stripe: bool,
    pub paypal: bool,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "System health status", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let db_status = if state.db.ping().await.is_ok() {
        "connected"
    } else {
        "disconnected"
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        database: db_status.to_string(),
        payments: PaymentsHealth {
            stripe: state.config.stripe_secret_key.is_some(),
            paypal: state.config.paypal_client_id.is_some() && state.config.paypal_secret.is_some(),
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
