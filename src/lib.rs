pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod services;
pub mod utils;

use crate::config::AppConfig;
use crate::services::audit::AuditService;
use crate::services::ledger::LedgerService;
use crate::services::notifications::Notifier;
use crate::services::payments::Gateways;
use crate::services::settlement::SettlementService;
use crate::services::share_service::ShareService;
use crate::services::withdraw::WithdrawService;
use crate::utils::keyed_mutex::KeyedMutex;
use axum::{
    Router,
    http::HeaderValue,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::health::health_check,
        api::handlers::shares::share_entry,
        api::handlers::shares::list_entry_users,
        api::handlers::shares::change_permissions,
        api::handlers::shares::remove_user,
        api::handlers::shares::create_shareable_link,
        api::handlers::shares::import_shareable_link,
        api::handlers::billing::create_payment_intent,
        api::handlers::billing::store_stripe_purchase,
        api::handlers::billing::store_paypal_purchase,
        api::handlers::billing::connect_stripe_account,
        api::handlers::billing::reset_stripe_account,
        api::handlers::billing::withdraw,
        api::handlers::ledger::list_transactions,
        api::handlers::ledger::earnings,
    ),
    components(
        schemas(
            api::handlers::health::HealthResponse,
            api::handlers::health::PaymentsHealth,
            api::handlers::shares::ShareRequest,
            api::handlers::shares::ShareResponse,
            api::handlers::shares::EntryUsersResponse,
            api::handlers::shares::ChangePermissionsRequest,
            api::handlers::shares::RemoveUserResponse,
            api::handlers::shares::CreateLinkRequest,
            api::handlers::shares::ShareableLinkResponse,
            api::handlers::shares::ImportLinkRequest,
            api::handlers::billing::CreatePaymentIntentRequest,
            api::handlers::billing::PaymentIntentResponse,
            api::handlers::billing::StripePurchaseRequest,
            api::handlers::billing::PaypalPurchaseRequest,
            api::handlers::billing::ConnectResponse,
            api::handlers::billing::SuccessResponse,
            services::share_service::EntryUser,
            services::share_service::SharePermissions,
            services::settlement::Settlement,
            services::withdraw::Withdrawal,
            services::ledger::TransactionView,
            services::ledger::TransactionPage,
            services::ledger::Earnings,
        )
    ),
    tags(
        (name = "system", description = "Health and diagnostics"),
        (name = "shares", description = "Sharing entries with other users"),
        (name = "billing", description = "Purchases, payouts and connected accounts"),
        (name = "ledger", description = "Transactions and earnings")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: AppConfig,
    pub gateways: Gateways,
    pub locks: KeyedMutex,
    pub audit: AuditService,
    pub share_service: Arc<ShareService>,
    pub settlement: Arc<SettlementService>,
    pub withdraw: Arc<WithdrawService>,
    pub ledger: Arc<LedgerService>,
}

impl AppState {
    /// Wires every service around one connection, config and lock table.
    pub fn new(
        db: DatabaseConnection,
        config: AppConfig,
        gateways: Gateways,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let locks = KeyedMutex::new();
        let audit = AuditService::new(db.clone());

        let share_service = Arc::new(ShareService::new(
            db.clone(),
            config.clone(),
            notifier,
            audit.clone(),
        ));
        let settlement = Arc::new(SettlementService::new(
            db.clone(),
            config.clone(),
            gateways.clone(),
            locks.clone(),
            audit.clone(),
        ));
        let withdraw = Arc::new(WithdrawService::new(
            db.clone(),
            config.clone(),
            gateways.clone(),
            locks.clone(),
            audit.clone(),
        ));
        let ledger = Arc::new(LedgerService::new(db.clone(), config.clone()));

        Self {
            db,
            config,
            gateways,
            locks,
            audit,
            share_service,
            settlement,
            withdraw,
            ledger,
        }
    }
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if config.allowed_origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    cors.allow_origin(AllowOrigin::list(origins))
}

pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/file-entries/:id/share",
            post(api::handlers::shares::share_entry),
        )
        .route(
            "/file-entries/:id/users",
            get(api::handlers::shares::list_entry_users),
        )
        .route(
            "/file-entries/:id/change-permissions",
            put(api::handlers::shares::change_permissions),
        )
        .route(
            "/file-entries/:id/remove-user",
            axum::routing::delete(api::handlers::shares::remove_user),
        )
        .route(
            "/file-entries/:id/shareable-link",
            post(api::handlers::shares::create_shareable_link),
        )
        .route(
            "/shareable-links/:id/import",
            post(api::handlers::shares::import_shareable_link),
        )
        .route(
            "/billing/stripe/create-payment-intent",
            post(api::handlers::billing::create_payment_intent),
        )
        .route(
            "/billing/stripe/store-purchase-details-locally",
            post(api::handlers::billing::store_stripe_purchase),
        )
        .route(
            "/billing/paypal/store-purchase-details-locally",
            post(api::handlers::billing::store_paypal_purchase),
        )
        .route(
            "/billing/stripe/connect",
            post(api::handlers::billing::connect_stripe_account)
                .delete(api::handlers::billing::reset_stripe_account),
        )
        .route("/billing/withdraw", post(api::handlers::billing::withdraw))
        .route("/transactions", get(api::handlers::ledger::list_transactions))
        .route("/earnings", get(api::handlers::ledger::earnings))
        .route_layer(from_fn_with_state(
            state.clone(),
            api::middleware::auth::auth_middleware,
        ));

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .merge(protected)
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(cors_layer(&state.config))
        .with_state(state)
}
