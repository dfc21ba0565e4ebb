#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use drive_share_backend::AppState;
use drive_share_backend::config::AppConfig;
use drive_share_backend::entities::{file_entries, file_entry_models, users};
use drive_share_backend::infrastructure::database;
use drive_share_backend::services::notifications::{Notifier, ShareNotification};
use drive_share_backend::services::payments::{
    Gateways, GatewayError, PaymentIntent, PaymentProcessor, PaymentProvider, PayoutProvider,
    PurchaseReference, Transfer, VerifiedPayment,
};
use drive_share_backend::services::share_service::SharePermissions;
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use uuid::Uuid;

pub async fn setup_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    database::run_migrations(&db).await.unwrap();
    db
}

pub fn test_config() -> AppConfig {
    AppConfig {
        platform_fee_percentage: 10.0,
        currency: "usd".to_string(),
        jwt_secret: "test_secret".to_string(),
        ..AppConfig::development()
    }
}

pub async fn create_user(db: &DatabaseConnection, email: &str) -> users::Model {
    users::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        email: Set(email.to_string()),
        name: Set(Some(email.split('@').next().unwrap_or_default().to_string())),
        balance: Set(0),
        stripe_account_id: Set(None),
        created_at: Set(Some(Utc::now())),
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn set_balance(
    db: &DatabaseConnection,
    user: &users::Model,
    balance: i64,
    stripe_account_id: Option<&str>,
) -> users::Model {
    let mut active: users::ActiveModel = user.clone().into();
    active.balance = Set(balance);
    active.stripe_account_id = Set(stripe_account_id.map(String::from));
    active.update(db).await.unwrap()
}

/// Creates an entry plus the owner's own association, as the drive does on upload.
pub async fn create_entry(
    db: &DatabaseConnection,
    owner: &users::Model,
    parent: Option<&file_entries::Model>,
    name: &str,
    entry_type: &str,
) -> file_entries::Model {
    let entry = file_entries::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        name: Set(name.to_string()),
        owner_id: Set(owner.id.clone()),
        parent_id: Set(parent.map(|p| p.id.clone())),
        entry_type: Set(entry_type.to_string()),
        file_size: Set(if entry_type == file_entries::TYPE_FILE { 1024 } else { 0 }),
        created_at: Set(Some(Utc::now())),
        deleted_at: Set(None),
    }
    .insert(db)
    .await
    .unwrap();

    file_entry_models::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        file_entry_id: Set(entry.id.clone()),
        model_id: Set(owner.id.clone()),
        model_type: Set(file_entry_models::MODEL_TYPE_USER.to_string()),
        permissions: Set(SharePermissions::owner().to_json()),
        owner: Set(true),
        premium: Set(false),
        price: Set(0),
        paid: Set(false),
        created_at: Set(Some(Utc::now())),
        updated_at: Set(Some(Utc::now())),
    }
    .insert(db)
    .await
    .unwrap();

    entry
}

pub async fn create_folder(
    db: &DatabaseConnection,
    owner: &users::Model,
    parent: Option<&file_entries::Model>,
    name: &str,
) -> file_entries::Model {
    create_entry(db, owner, parent, name, file_entries::TYPE_FOLDER).await
}

pub async fn create_file(
    db: &DatabaseConnection,
    owner: &users::Model,
    parent: Option<&file_entries::Model>,
    name: &str,
) -> file_entries::Model {
    create_entry(db, owner, parent, name, file_entries::TYPE_FILE).await
}

/// Grants `user` a premium, unpaid association on `entry`.
pub async fn grant_premium(
    db: &DatabaseConnection,
    entry: &file_entries::Model,
    user: &users::Model,
    price: i64,
) -> file_entry_models::Model {
    file_entry_models::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        file_entry_id: Set(entry.id.clone()),
        model_id: Set(user.id.clone()),
        model_type: Set(file_entry_models::MODEL_TYPE_USER.to_string()),
        permissions: Set(SharePermissions::default().normalized().to_json()),
        owner: Set(false),
        premium: Set(true),
        price: Set(price),
        paid: Set(false),
        created_at: Set(Some(Utc::now())),
        updated_at: Set(Some(Utc::now())),
    }
    .insert(db)
    .await
    .unwrap()
}

/// Payment provider answering from a canned table of payments.
pub struct MockPaymentProvider {
    processor: PaymentProcessor,
    payments: Mutex<HashMap<String, VerifiedPayment>>,
    pub retrieve_calls: AtomicUsize,
    pub intents: Mutex<Vec<(i64, String)>>,
}

impl MockPaymentProvider {
    pub fn new(processor: PaymentProcessor) -> Self {
        Self {
            processor,
            payments: Mutex::new(HashMap::new()),
            retrieve_calls: AtomicUsize::new(0),
            intents: Mutex::new(Vec::new()),
        }
    }

    /// Registers a payment started for `(entry_id, buyer_id)`.
    pub fn add_payment(
        &self,
        id: &str,
        status: &str,
        amount: i64,
        currency: &str,
        purchase: (&str, &str),
    ) {
        let completed = matches!(status, "succeeded" | "COMPLETED");
        self.payments.lock().unwrap().insert(
            id.to_string(),
            VerifiedPayment {
                id: id.to_string(),
                status: status.to_string(),
                completed,
                amount,
                currency: currency.to_string(),
                purchase: Some(PurchaseReference {
                    entry_id: purchase.0.to_string(),
                    buyer_id: purchase.1.to_string(),
                }),
            },
        );
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    fn processor(&self) -> PaymentProcessor {
        self.processor
    }

    async fn retrieve_payment(&self, external_id: &str) -> Result<VerifiedPayment, GatewayError> {
        self.retrieve_calls.fetch_add(1, Ordering::SeqCst);
        self.payments
            .lock()
            .unwrap()
            .get(external_id)
            .cloned()
            .ok_or_else(|| GatewayError::Api {
                provider: "mock",
                status: 404,
                message: "No such payment".to_string(),
            })
    }

    async fn create_payment_intent(
        &self,
        amount: i64,
        currency: &str,
        _metadata: &[(&str, &str)],
    ) -> Result<PaymentIntent, GatewayError> {
        self.intents
            .lock()
            .unwrap()
            .push((amount, currency.to_string()));
        Ok(PaymentIntent {
            id: "pi_mock".to_string(),
            client_secret: "pi_mock_secret_123".to_string(),
            amount,
            currency: currency.to_string(),
        })
    }
}

/// Payout provider that records transfers and can be told to fail.
#[derive(Default)]
pub struct MockPayouts {
    pub fail: AtomicBool,
    pub transfers: Mutex<Vec<(i64, String, String)>>,
    pub accounts_created: AtomicUsize,
}

#[async_trait]
impl PayoutProvider for MockPayouts {
    fn processor(&self) -> PaymentProcessor {
        PaymentProcessor::Stripe
    }

    async fn transfer(
        &self,
        amount: i64,
        currency: &str,
        destination: &str,
        _idempotency_key: &str,
    ) -> Result<Transfer, GatewayError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Api {
                provider: "mock",
                status: 400,
                message: "Insufficient platform funds".to_string(),
            });
        }

        let mut transfers = self.transfers.lock().unwrap();
        transfers.push((amount, currency.to_string(), destination.to_string()));
        Ok(Transfer {
            id: format!("tr_mock_{}", transfers.len()),
            amount,
            currency: currency.to_string(),
        })
    }

    async fn create_connected_account(&self, _email: &str) -> Result<String, GatewayError> {
        let n = self.accounts_created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("acct_mock_{}", n))
    }

    async fn create_onboarding_link(
        &self,
        account_id: &str,
        _refresh_url: &str,
        _return_url: &str,
    ) -> Result<String, GatewayError> {
        Ok(format!("https://connect.example.test/setup/{}", account_id))
    }
}

/// Notifier recording every delivery; optionally failing.
#[derive(Default)]
pub struct RecordingNotifier {
    pub fail: AtomicBool,
    pub sent: Mutex<Vec<(Vec<String>, ShareNotification)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_share(
        &self,
        recipients: &[users::Model],
        notification: &ShareNotification,
    ) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("mail transport unavailable");
        }
        self.sent.lock().unwrap().push((
            recipients.iter().map(|u| u.email.clone()).collect(),
            notification.clone(),
        ));
        Ok(())
    }
}

pub struct TestContext {
    pub db: DatabaseConnection,
    pub state: AppState,
    pub stripe: Arc<MockPaymentProvider>,
    pub paypal: Arc<MockPaymentProvider>,
    pub payouts: Arc<MockPayouts>,
    pub notifier: Arc<RecordingNotifier>,
}

pub async fn setup_context(config: AppConfig) -> TestContext {
    let db = setup_test_db().await;

    let stripe = Arc::new(MockPaymentProvider::new(PaymentProcessor::Stripe));
    let paypal = Arc::new(MockPaymentProvider::new(PaymentProcessor::Paypal));
    let payouts = Arc::new(MockPayouts::default());
    let notifier = Arc::new(RecordingNotifier::default());

    let gateways = Gateways {
        stripe: stripe.clone(),
        paypal: paypal.clone(),
        payouts: payouts.clone(),
    };

    let state = AppState::new(db.clone(), config, gateways, notifier.clone());

    TestContext {
        db,
        state,
        stripe,
        paypal,
        payouts,
        notifier,
    }
}
