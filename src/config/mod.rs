use std::env;

/// Runtime configuration for sharing, billing and payouts
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// JWT Secret Key (Required in production)
    pub jwt_secret: String,

    /// Allowed CORS Origins (comma separated)
    pub allowed_origins: Vec<String>,

    /// Public base URL of the web client, used for Stripe Connect redirects
    pub app_url: String,

    /// Percentage of every purchase retained by the platform (default: 0)
    pub platform_fee_percentage: f64,

    /// Notify recipients when entries are shared with them (default: true)
    pub send_share_notification: bool,

    /// Recipients attached per batch when sharing (default: 200)
    pub share_recipient_chunk_size: usize,

    /// Entry ids walked per batch when propagating a share (default: 500)
    pub share_entry_chunk_size: usize,

    /// ISO currency used for purchases and payouts (default: "usd")
    pub currency: String,

    /// Stripe secret API key
    pub stripe_secret_key: Option<String>,
    /// Stripe API base URL (default: "https://api.stripe.com")
    pub stripe_api_base: String,

    /// PayPal REST client id
    pub paypal_client_id: Option<String>,
    /// PayPal REST secret
    pub paypal_secret: Option<String>,
    /// PayPal API base URL (default: sandbox)
    pub paypal_api_base: String,

    /// Seconds between queue polls in the background worker (default: 15)
    pub worker_poll_interval_secs: u64,

    /// Attempts before a deferred share job is marked failed (default: 3)
    pub share_job_max_attempts: i32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "secret".to_string(),
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(), // Vite default
                "http://127.0.0.1:3000".to_string(),
            ],
            app_url: "http://localhost:5173".to_string(),
            platform_fee_percentage: 0.0,
            send_share_notification: true,
            share_recipient_chunk_size: 200,
            share_entry_chunk_size: 500,
            currency: "usd".to_string(),
            stripe_secret_key: None,
            stripe_api_base: "https://api.stripe.com".to_string(),
            paypal_client_id: None,
            paypal_secret: None,
            paypal_api_base: "https://api-m.sandbox.paypal.com".to_string(),
            worker_poll_interval_secs: 15,
            share_job_max_attempts: 3,
        }
    }
}

fn parsed<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(fallback)
}

fn flag(key: &str, fallback: bool) -> bool {
    env::var(key)
        .map(|v| v.to_lowercase() != "false" && v != "0")
        .unwrap_or(fallback)
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            jwt_secret: env::var("JWT_SECRET").unwrap_or(default.jwt_secret),

            allowed_origins: env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(default.allowed_origins),

            app_url: env::var("APP_URL").unwrap_or(default.app_url),

            platform_fee_percentage: parsed::<f64>(
                "PLATFORM_FEE_PERCENTAGE",
                default.platform_fee_percentage,
            )
            .clamp(0.0, 100.0),

            send_share_notification: flag(
                "SEND_SHARE_NOTIFICATION",
                default.send_share_notification,
            ),

            share_recipient_chunk_size: parsed(
                "SHARE_RECIPIENT_CHUNK_SIZE",
                default.share_recipient_chunk_size,
            )
            .max(1),

            share_entry_chunk_size: parsed("SHARE_ENTRY_CHUNK_SIZE", default.share_entry_chunk_size)
                .max(1),

            currency: env::var("BILLING_CURRENCY")
                .map(|v| v.to_lowercase())
                .unwrap_or(default.currency),

            stripe_secret_key: env::var("STRIPE_SECRET_KEY").ok(),
            stripe_api_base: env::var("STRIPE_API_BASE").unwrap_or(default.stripe_api_base),

            paypal_client_id: env::var("PAYPAL_CLIENT_ID").ok(),
            paypal_secret: env::var("PAYPAL_SECRET").ok(),
            paypal_api_base: env::var("PAYPAL_API_BASE").unwrap_or(default.paypal_api_base),

            worker_poll_interval_secs: parsed(
                "WORKER_POLL_INTERVAL_SECS",
                default.worker_poll_interval_secs,
            )
            .max(1),

            share_job_max_attempts: parsed(
                "SHARE_JOB_MAX_ATTEMPTS",
                default.share_job_max_attempts,
            )
            .max(1),
        }
    }

    /// Create config for development (no fee, localhost origins, fast worker)
    pub fn development() -> Self {
        Self {
            worker_poll_interval_secs: 2,
            ..Self::default()
        }
    }

    /// Create config for production (strict secrets)
    pub fn production() -> Self {
        let config = Self::from_env();
        Self {
            jwt_secret: env::var("JWT_SECRET").expect("CRITICAL: JWT_SECRET must be set"),
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|| vec![config.app_url.clone()]),
            paypal_api_base: env::var("PAYPAL_API_BASE")
                .unwrap_or_else(|_| "https://api-m.paypal.com".to_string()),
            ..config
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.platform_fee_percentage, 0.0);
        assert_eq!(config.share_recipient_chunk_size, 200);
        assert_eq!(config.share_entry_chunk_size, 500);
        assert_eq!(config.currency, "usd");
        assert!(config.send_share_notification);
    }

    #[test]
    fn test_development_config() {
        let config = AppConfig::development();
        assert_eq!(config.worker_poll_interval_secs, 2);
        assert!(config.stripe_secret_key.is_none());
    }

    #[test]
    fn test_production_config() {
        unsafe { env::set_var("JWT_SECRET", "test_secret") };
        let config = AppConfig::production();
        unsafe { env::remove_var("JWT_SECRET") };
        assert_eq!(config.jwt_secret, "test_secret");
        assert!(!config.allowed_origins.contains(&"*".to_string()));
    }

    #[test]
    fn test_from_env_fee_is_clamped() {
        unsafe { env::set_var("PLATFORM_FEE_PERCENTAGE", "250") };
        let config = AppConfig::from_env();
        unsafe { env::remove_var("PLATFORM_FEE_PERCENTAGE") };
        assert_eq!(config.platform_fee_percentage, 100.0);
    }
}
