use crate::AppState;
use crate::api::error::AppError;
use crate::services::payments::{PaymentProcessor, is_valid_external_id};
use crate::services::settlement::Settlement;
use crate::services::withdraw::Withdrawal;
use crate::utils::auth::Claims;
use axum::{Extension, Json, extract::State};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

fn validate_external_id(id: &str) -> Result<(), ValidationError> {
    if is_valid_external_id(id) {
        Ok(())
    } else {
        let mut error = ValidationError::new("external_id");
        error.message = Some("Invalid payment id".into());
        Err(error)
    }
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreatePaymentIntentRequest {
    #[validate(length(min = 1, message = "Entry is required"))]
    pub entry_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentIntentResponse {
    pub id: String,
    pub client_secret: String,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct StripePurchaseRequest {
    #[validate(custom(function = "validate_external_id"))]
    pub payment_intent_id: String,
    #[validate(length(min = 1, message = "Entry is required"))]
    pub entry_id: String,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct PaypalPurchaseRequest {
    #[validate(custom(function = "validate_external_id"))]
    pub order_id: String,
    #[validate(length(min = 1, message = "Entry is required"))]
    pub entry_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConnectResponse {
    pub url: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SuccessResponse {
    pub success: bool,
}

#[utoipa::path(
    post,
    path = "/billing/stripe/create-payment-intent",
    request_body = CreatePaymentIntentRequest,
    responses(
        (status = 200, description = "Payment intent created", body = PaymentIntentResponse),
        (status = 400, description = "Entry is not for sale or already paid"),
        (status = 502, description = "Payment provider request failed")
    ),
    security(("jwt" = [])),
    tag = "billing"
)]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreatePaymentIntentRequest>,
) -> Result<Json<PaymentIntentResponse>, AppError> {
    payload.validate()?;

    let intent = state
        .settlement
        .create_payment_intent(&claims.sub, &payload.entry_id)
        .await?;

    Ok(Json(PaymentIntentResponse {
        id: intent.id,
        client_secret: intent.client_secret,
        amount: intent.amount,
        currency: intent.currency,
    }))
}

#[utoipa::path(
    post,
    path = "/billing/stripe/store-purchase-details-locally",
    request_body = StripePurchaseRequest,
    responses(
        (status = 200, description = "Purchase recorded", body = Settlement),
        (status = 402, description = "Payment has not been completed"),
        (status = 502, description = "Payment provider request failed")
    ),
    security(("jwt" = [])),
    tag = "billing"
)]
pub async fn store_stripe_purchase(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<StripePurchaseRequest>,
) -> Result<Json<Settlement>, AppError> {
    payload.validate()?;

    let settlement = state
        .settlement
        .settle(
            PaymentProcessor::Stripe,
            &payload.payment_intent_id,
            &payload.entry_id,
            &claims.sub,
        )
        .await?;

    Ok(Json(settlement))
}

#[utoipa::path(
    post,
    path = "/billing/paypal/store-purchase-details-locally",
    request_body = PaypalPurchaseRequest,
    responses(
        (status = 200, description = "Purchase recorded", body = Settlement),
        (status = 402, description = "Payment has not been completed"),
        (status = 502, description = "Payment provider request failed")
    ),
    security(("jwt" = [])),
    tag = "billing"
)]
pub async fn store_paypal_purchase(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<PaypalPurchaseRequest>,
) -> Result<Json<Settlement>, AppError> {
    payload.validate()?;

    let settlement = state
        .settlement
        .settle(
            PaymentProcessor::Paypal,
            &payload.order_id,
            &payload.entry_id,
            &claims.sub,
        )
        .await?;

    Ok(Json(settlement))
}

#[utoipa::path(
    post,
    path = "/billing/stripe/connect",
    responses(
        (status = 200, description = "Onboarding link for the connected account", body = ConnectResponse),
        (status = 502, description = "Payment provider request failed")
    ),
    security(("jwt" = [])),
    tag = "billing"
)]
pub async fn connect_stripe_account(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ConnectResponse>, AppError> {
    let url = state.withdraw.connect_account(&claims.sub).await?;
    Ok(Json(ConnectResponse { url }))
}

#[utoipa::path(
    delete,
    path = "/billing/stripe/connect",
    responses(
        (status = 200, description = "Connected account cleared", body = SuccessResponse)
    ),
    security(("jwt" = [])),
    tag = "billing"
)]
pub async fn reset_stripe_account(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.withdraw.reset_account(&claims.sub).await?;
    Ok(Json(SuccessResponse { success: true }))
}

#[utoipa::path(
    post,
    path = "/billing/withdraw",
    responses(
        (status = 200, description = "Balance transferred", body = Withdrawal),
        (status = 400, description = "Nothing to withdraw or no connected account"),
        (status = 502, description = "Payment provider request failed")
    ),
    security(("jwt" = [])),
    tag = "billing"
)]
pub async fn withdraw(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Withdrawal>, AppError> {
    let withdrawal = state.withdraw.withdraw(&claims.sub).await?;
    Ok(Json(withdrawal))
}
