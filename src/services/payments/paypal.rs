use super::{GatewayError, PaymentProcessor, PaymentProvider, PurchaseReference, VerifiedPayment};
use crate::utils::money::parse_decimal_minor;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tokio::sync::RwLock;

const PROVIDER: &str = "paypal";

#[derive(Debug, Deserialize)]
struct PaypalToken {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct PaypalOrder {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub purchase_units: Vec<PaypalPurchaseUnit>,
}

#[derive(Debug, Deserialize)]
pub struct PaypalPurchaseUnit {
    /// Entry id set by the client when creating the order
    pub reference_id: Option<String>,
    /// Buyer id set by the client when creating the order
    pub custom_id: Option<String>,
    pub amount: Option<PaypalAmount>,
}

#[derive(Debug, Deserialize)]
pub struct PaypalAmount {
    pub currency_code: String,
    pub value: String,
}

impl TryFrom<PaypalOrder> for VerifiedPayment {
    type Error = GatewayError;

    fn try_from(order: PaypalOrder) -> Result<Self, Self::Error> {
        let unit = order.purchase_units.into_iter().next();
        let purchase = unit.as_ref().and_then(|unit| {
            Some(PurchaseReference {
                entry_id: unit.reference_id.clone()?,
                buyer_id: unit.custom_id.clone()?,
            })
        });
        let amount = unit
            .and_then(|unit| unit.amount)
            .ok_or_else(|| GatewayError::Decode {
                provider: PROVIDER,
                message: format!("order {} has no purchase amount", order.id),
            })?;

        let minor = parse_decimal_minor(&amount.value).ok_or_else(|| GatewayError::Decode {
            provider: PROVIDER,
            message: format!("unparsable amount '{}'", amount.value),
        })?;

        Ok(VerifiedPayment {
            completed: order.status == "COMPLETED",
            id: order.id,
            status: order.status,
            amount: minor,
            currency: amount.currency_code.to_lowercase(),
            purchase,
        })
    }
}

/// PayPal Orders v2 client using OAuth2 client credentials.
pub struct PaypalClient {
    http: reqwest::Client,
    api_base: String,
    client_id: Option<String>,
    secret: Option<String>,
    token: RwLock<Option<CachedToken>>,
}

impl PaypalClient {
    pub fn new(client_id: Option<String>, secret: Option<String>, api_base: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            client_id: client_id.filter(|v| !v.is_empty()),
            secret: secret.filter(|v| !v.is_empty()),
            token: RwLock::new(None),
        }
    }

    async fn access_token(&self) -> Result<String, GatewayError> {
        let (Some(client_id), Some(secret)) = (&self.client_id, &self.secret) else {
            return Err(GatewayError::NotConfigured(PROVIDER));
        };

        if let Some(cached) = self.token.read().await.as_ref()
            && cached.expires_at > Utc::now()
        {
            return Ok(cached.value.clone());
        }

        let response = self
            .http
            .post(format!("{}/v1/oauth2/token", self.api_base))
            .basic_auth(client_id, Some(secret))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body("grant_type=client_credentials")
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(GatewayError::Api {
                provider: PROVIDER,
                status: status.as_u16(),
                message: body,
            });
        }

        let token: PaypalToken = serde_json::from_str(&body).map_err(|e| GatewayError::Decode {
            provider: PROVIDER,
            message: e.to_string(),
        })?;

        // Refresh a minute early so in-flight requests never carry a stale token
        let expires_at = Utc::now() + Duration::seconds((token.expires_in - 60).max(0));
        *self.token.write().await = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at,
        });

        Ok(token.access_token)
    }
}

#[async_trait]
impl PaymentProvider for PaypalClient {
    fn processor(&self) -> PaymentProcessor {
        PaymentProcessor::Paypal
    }

    async fn retrieve_payment(&self, external_id: &str) -> Result<VerifiedPayment, GatewayError> {
        let token = self.access_token().await?;

        let response = self
            .http
            .get(format!("{}/v2/checkout/orders/{}", self.api_base, external_id))
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(GatewayError::Api {
                provider: PROVIDER,
                status: status.as_u16(),
                message: "Could not retrieve PayPal order details".to_string(),
            });
        }

        let order: PaypalOrder = serde_json::from_str(&body).map_err(|e| GatewayError::Decode {
            provider: PROVIDER,
            message: e.to_string(),
        })?;

        order.try_into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completed_order() {
        let order: PaypalOrder = serde_json::from_str(
            r#"{"id":"5O190127TN364715T","status":"COMPLETED","purchase_units":[{"reference_id":"e1","custom_id":"u1","amount":{"currency_code":"USD","value":"12.50"}}]}"#,
        )
        .unwrap();
        let payment = VerifiedPayment::try_from(order).unwrap();
        assert!(payment.completed);
        assert_eq!(payment.amount, 1250);
        assert_eq!(payment.currency, "usd");
        assert!(payment.purchase.unwrap().matches("e1", "u1"));
    }

    #[test]
    fn test_approved_order_is_not_completed() {
        let order: PaypalOrder = serde_json::from_str(
            r#"{"id":"O1","status":"APPROVED","purchase_units":[{"amount":{"currency_code":"USD","value":"1.00"}}]}"#,
        )
        .unwrap();
        assert!(!VerifiedPayment::try_from(order).unwrap().completed);
    }

    #[test]
    fn test_order_without_amount_is_rejected() {
        let order: PaypalOrder =
            serde_json::from_str(r#"{"id":"O2","status":"COMPLETED","purchase_units":[]}"#).unwrap();
        assert!(matches!(
            VerifiedPayment::try_from(order),
            Err(GatewayError::Decode { .. })
        ));
    }
}
