use std::env;

use anyhow::{Context, bail};

const DEFAULT_MP_API_BASE_URL: &str = "https://api.mercadopago.com";

const DEFAULT_BILLING_DAYS: i64 = 30;

/// Ten years. Keeps `days * SECONDS_PER_DAY` and later expiry sums well inside i64.
pub const MAX_BILLING_DAYS: i64 = 3650;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    /// Shared secret for the admin surface
    pub admin_api_key: String,
    /// Days added to a monthly license on creation and on each confirmed payment
    pub default_billing_days: i64,
    pub mercadopago: MercadoPagoConfig,
    /// Origins allowed by CORS (empty = any)
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MercadoPagoConfig {
    /// None disables payment creation; notifications still ack
    pub access_token: Option<String>,
    pub api_base_url: String,
    pub timeout_secs: u64,
    pub payment_description: String,
    pub notification_url: Option<String>,
}

impl Default for MercadoPagoConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            api_base_url: DEFAULT_MP_API_BASE_URL.to_string(),
            timeout_secs: 20,
            payment_description: "Prospecta - assinatura mensal".to_string(),
            notification_url: None,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let admin_api_key = env::var("ADMIN_API_KEY")
            .map(|v| v.trim().to_string())
            .unwrap_or_default();
        if admin_api_key.len() < 8 {
            bail!("ADMIN_API_KEY is not set or is shorter than 8 characters");
        }

        let default_billing_days =
            parse_billing_days(env::var("DEFAULT_BILLING_DAYS").ok().as_deref())?;

        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8000);

        let timeout_secs: u64 = env::var("MP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|v| *v > 0)
            .unwrap_or(20);

        let defaults = MercadoPagoConfig::default();
        let mercadopago = MercadoPagoConfig {
            access_token: env::var("MP_ACCESS_TOKEN")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            api_base_url: env::var("MP_API_BASE_URL").unwrap_or(defaults.api_base_url),
            timeout_secs,
            payment_description: env::var("MP_PAYMENT_DESCRIPTION")
                .unwrap_or(defaults.payment_description),
            notification_url: env::var("MP_NOTIFICATION_URL").ok(),
        };

        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty() && s != "*")
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "prospecta.db".to_string()),
            admin_api_key,
            default_billing_days,
            mercadopago,
            cors_allowed_origins,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Billing period in days: unset means the default, anything outside
/// `1..=MAX_BILLING_DAYS` is a configuration error.
pub fn parse_billing_days(raw: Option<&str>) -> anyhow::Result<i64> {
    let days: i64 = match raw.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => v
            .parse()
            .context("DEFAULT_BILLING_DAYS must be an integer")?,
        None => DEFAULT_BILLING_DAYS,
    };
    if !(1..=MAX_BILLING_DAYS).contains(&days) {
        bail!(
            "DEFAULT_BILLING_DAYS must be between 1 and {}, got {}",
            MAX_BILLING_DAYS,
            days
        );
    }
    Ok(days)
}
