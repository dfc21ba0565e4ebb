use crate::config::AppConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub mod paypal;
pub mod stripe;

pub use paypal::PaypalClient;
pub use stripe::StripeClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentProcessor {
    Stripe,
    Paypal,
}

impl PaymentProcessor {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentProcessor::Stripe => "stripe",
            PaymentProcessor::Paypal => "paypal",
        }
    }
}

impl fmt::Display for PaymentProcessor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("{0} credentials are not configured")]
    NotConfigured(&'static str),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} API error ({status}): {message}")]
    Api {
        provider: &'static str,
        status: u16,
        message: String,
    },

    #[error("Unexpected {provider} response: {message}")]
    Decode {
        provider: &'static str,
        message: String,
    },

    #[error("{0} does not support this operation")]
    Unsupported(&'static str),
}

/// Payment state as reported by the provider itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPayment {
    pub id: String,
    pub status: String,
    /// True only for the provider's terminal success state
    /// (`succeeded` for Stripe, `COMPLETED` for PayPal)
    pub completed: bool,
    pub amount: i64,
    pub currency: String,
    /// Purchase the payment was started for, when the provider carries one
    pub purchase: Option<PurchaseReference>,
}

/// Entry and buyer stamped on a payment when it is created
/// (Stripe intent metadata, PayPal `reference_id`/`custom_id`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseReference {
    pub entry_id: String,
    pub buyer_id: String,
}

impl PurchaseReference {
    pub fn matches(&self, entry_id: &str, buyer_id: &str) -> bool {
        self.entry_id == entry_id && self.buyer_id == buyer_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub id: String,
    pub amount: i64,
    pub currency: String,
}

/// Source of truth for buyer payments.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn processor(&self) -> PaymentProcessor;

    /// Fetch the authoritative state of a payment (Stripe payment intent,
    /// PayPal order).
    async fn retrieve_payment(&self, external_id: &str) -> Result<VerifiedPayment, GatewayError>;

    /// Start a payment the client will confirm.
    async fn create_payment_intent(
        &self,
        _amount: i64,
        _currency: &str,
        _metadata: &[(&str, &str)],
    ) -> Result<PaymentIntent, GatewayError> {
        Err(GatewayError::Unsupported(self.processor().as_str()))
    }
}

/// Moves platform funds to a seller's connected account.
#[async_trait]
pub trait PayoutProvider: Send + Sync {
    fn processor(&self) -> PaymentProcessor;

    async fn transfer(
        &self,
        amount: i64,
        currency: &str,
        destination: &str,
        idempotency_key: &str,
    ) -> Result<Transfer, GatewayError>;

    /// Creates a connected account and returns its id.
    async fn create_connected_account(&self, email: &str) -> Result<String, GatewayError>;

    /// Returns a hosted onboarding URL for a connected account.
    async fn create_onboarding_link(
        &self,
        account_id: &str,
        refresh_url: &str,
        return_url: &str,
    ) -> Result<String, GatewayError>;
}

#[derive(Clone)]
pub struct Gateways {
    pub stripe: Arc<dyn PaymentProvider>,
    pub paypal: Arc<dyn PaymentProvider>,
    pub payouts: Arc<dyn PayoutProvider>,
}

impl Gateways {
    pub fn from_config(config: &AppConfig) -> Self {
        let stripe = Arc::new(StripeClient::new(
            config.stripe_secret_key.clone(),
            config.stripe_api_base.clone(),
        ));
        let paypal = Arc::new(PaypalClient::new(
            config.paypal_client_id.clone(),
            config.paypal_secret.clone(),
            config.paypal_api_base.clone(),
        ));

        Self {
            stripe: stripe.clone(),
            paypal,
            payouts: stripe,
        }
    }

    pub fn provider(&self, processor: PaymentProcessor) -> &Arc<dyn PaymentProvider> {
        match processor {
            PaymentProcessor::Stripe => &self.stripe,
            PaymentProcessor::Paypal => &self.paypal,
        }
    }
}

/// Provider ids are interpolated into request paths.
pub fn is_valid_external_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 255
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_id_validation() {
        assert!(is_valid_external_id("pi_3NkA1b2C3d"));
        assert!(is_valid_external_id("5O190127TN364715T"));
        assert!(!is_valid_external_id(""));
        assert!(!is_valid_external_id("../v1/balance"));
        assert!(!is_valid_external_id("pi_1?expand=x"));
    }

    #[test]
    fn test_processor_names() {
        assert_eq!(PaymentProcessor::Stripe.to_string(), "stripe");
        assert_eq!(
            serde_json::to_string(&PaymentProcessor::Paypal).unwrap(),
            "\"paypal\""
        );
    }
}
