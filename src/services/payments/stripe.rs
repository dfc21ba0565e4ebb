use super::{
    GatewayError, PaymentIntent, PaymentProcessor, PaymentProvider, PayoutProvider,
    PurchaseReference, Transfer, VerifiedPayment,
};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;

const PROVIDER: &str = "stripe";
const API_VERSION: &str = "2022-08-01";

#[derive(Debug, Deserialize)]
pub struct StripePaymentIntent {
    pub id: String,
    pub status: String,
    pub amount: i64,
    #[serde(default)]
    pub amount_received: i64,
    pub currency: String,
    pub client_secret: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl From<StripePaymentIntent> for VerifiedPayment {
    fn from(intent: StripePaymentIntent) -> Self {
        let completed = intent.status == "succeeded";
        let amount = if intent.amount_received > 0 {
            intent.amount_received
        } else {
            intent.amount
        };
        let purchase = match (
            intent.metadata.get("entry_id"),
            intent.metadata.get("buyer_id"),
        ) {
            (Some(entry_id), Some(buyer_id)) => Some(PurchaseReference {
                entry_id: entry_id.clone(),
                buyer_id: buyer_id.clone(),
            }),
            _ => None,
        };
        VerifiedPayment {
            id: intent.id,
            status: intent.status,
            completed,
            amount,
            currency: intent.currency,
            purchase,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StripeTransfer {
    pub id: String,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Deserialize)]
struct StripeAccount {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StripeAccountLink {
    url: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorContainer {
    error: StripeErrorBody,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    message: Option<String>,
    code: Option<String>,
}

/// Minimal Stripe REST client (payment intents, transfers, Connect onboarding).
pub struct StripeClient {
    http: reqwest::Client,
    api_base: String,
    secret_key: Option<String>,
}

impl StripeClient {
    pub fn new(secret_key: Option<String>, api_base: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            secret_key: secret_key.filter(|k| !k.is_empty()),
        }
    }

    fn secret_key(&self) -> Result<&str, GatewayError> {
        self.secret_key
            .as_deref()
            .ok_or(GatewayError::NotConfigured(PROVIDER))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        let request = self
            .http
            .get(format!("{}{}", self.api_base, path))
            .bearer_auth(self.secret_key()?)
            .header("Stripe-Version", API_VERSION);
        Self::send(request).await
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(String, String)],
        idempotency_key: Option<&str>,
    ) -> Result<T, GatewayError> {
        let body = serde_urlencoded::to_string(params).map_err(|e| GatewayError::Decode {
            provider: PROVIDER,
            message: e.to_string(),
        })?;

        let mut request = self
            .http
            .post(format!("{}{}", self.api_base, path))
            .bearer_auth(self.secret_key()?)
            .header("Stripe-Version", API_VERSION)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body);

        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }

        Self::send(request).await
    }

    async fn send<T: DeserializeOwned>(request: reqwest::RequestBuilder) -> Result<T, GatewayError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<StripeErrorContainer>(&body)
                .map(|c| {
                    let message = c.error.message.unwrap_or_default();
                    match c.error.code {
                        Some(code) => format!("{} [{}]", message, code),
                        None => message,
                    }
                })
                .unwrap_or(body);
            return Err(GatewayError::Api {
                provider: PROVIDER,
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|e| GatewayError::Decode {
            provider: PROVIDER,
            message: e.to_string(),
        })
    }
}

fn param(key: &str, value: impl ToString) -> (String, String) {
    (key.to_string(), value.to_string())
}

#[async_trait]
impl PaymentProvider for StripeClient {
    fn processor(&self) -> PaymentProcessor {
        PaymentProcessor::Stripe
    }

    async fn retrieve_payment(&self, external_id: &str) -> Result<VerifiedPayment, GatewayError> {
        let intent: StripePaymentIntent = self
            .get(&format!("/v1/payment_intents/{}", external_id))
            .await?;
        Ok(intent.into())
    }

    async fn create_payment_intent(
        &self,
        amount: i64,
        currency: &str,
        metadata: &[(&str, &str)],
    ) -> Result<PaymentIntent, GatewayError> {
        let mut params = vec![
            param("amount", amount),
            param("currency", currency),
            param("automatic_payment_methods[enabled]", "true"),
        ];
        params.extend(
            metadata
                .iter()
                .map(|(k, v)| param(&format!("metadata[{}]", k), v)),
        );

        let intent: StripePaymentIntent = self.post_form("/v1/payment_intents", &params, None).await?;
        let client_secret = intent.client_secret.ok_or_else(|| GatewayError::Decode {
            provider: PROVIDER,
            message: "payment intent has no client_secret".to_string(),
        })?;

        Ok(PaymentIntent {
            id: intent.id,
            client_secret,
            amount: intent.amount,
            currency: intent.currency,
        })
    }
}

#[async_trait]
impl PayoutProvider for StripeClient {
    fn processor(&self) -> PaymentProcessor {
        PaymentProcessor::Stripe
    }

    async fn transfer(
        &self,
        amount: i64,
        currency: &str,
        destination: &str,
        idempotency_key: &str,
    ) -> Result<Transfer, GatewayError> {
        let params = vec![
            param("amount", amount),
            param("currency", currency),
            param("destination", destination),
            param("transfer_group", idempotency_key),
        ];

        let transfer: StripeTransfer = self
            .post_form("/v1/transfers", &params, Some(idempotency_key))
            .await?;

        Ok(Transfer {
            id: transfer.id,
            amount: transfer.amount,
            currency: transfer.currency,
        })
    }

    async fn create_connected_account(&self, email: &str) -> Result<String, GatewayError> {
        let params = vec![
            param("type", "express"),
            param("email", email),
            param("capabilities[transfers][requested]", "true"),
        ];
        let account: StripeAccount = self.post_form("/v1/accounts", &params, None).await?;
        Ok(account.id)
    }

    async fn create_onboarding_link(
        &self,
        account_id: &str,
        refresh_url: &str,
        return_url: &str,
    ) -> Result<String, GatewayError> {
        let params = vec![
            param("account", account_id),
            param("refresh_url", refresh_url),
            param("return_url", return_url),
            param("type", "account_onboarding"),
        ];
        let link: StripeAccountLink = self.post_form("/v1/account_links", &params, None).await?;
        Ok(link.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_succeeded_intent_is_completed() {
        let intent: StripePaymentIntent = serde_json::from_str(
            r#"{"id":"pi_1","status":"succeeded","amount":1500,"amount_received":1500,"currency":"usd","client_secret":null,"metadata":{"entry_id":"e1","buyer_id":"u1"}}"#,
        )
        .unwrap();
        let payment = VerifiedPayment::from(intent);
        assert!(payment.completed);
        assert_eq!(payment.amount, 1500);
        assert_eq!(payment.currency, "usd");
        assert!(payment.purchase.unwrap().matches("e1", "u1"));
    }

    #[test]
    fn test_processing_intent_is_not_completed() {
        let intent: StripePaymentIntent = serde_json::from_str(
            r#"{"id":"pi_2","status":"processing","amount":1500,"currency":"usd"}"#,
        )
        .unwrap();
        let payment = VerifiedPayment::from(intent);
        assert!(!payment.completed);
        assert_eq!(payment.amount, 1500);
        assert!(payment.purchase.is_none());
    }

    #[tokio::test]
    async fn test_missing_key_is_reported() {
        let client = StripeClient::new(None, "http://127.0.0.1:9".to_string());
        let err = client.retrieve_payment("pi_1").await.unwrap_err();
        assert!(matches!(err, GatewayError::NotConfigured("stripe")));
    }
}
