use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Deserializer, Serialize};

use crate::config::MercadoPagoConfig;
use crate::error::{AppError, Result};

#[derive(Debug, Serialize)]
struct CreatePaymentRequest<'a> {
    transaction_amount: f64,
    description: &'a str,
    payment_method_id: &'a str,
    /// Lets support correlate processor records with licenses; never trusted on the way back
    external_reference: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    payer: Option<Payer<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    notification_url: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct Payer<'a> {
    email: &'a str,
}

/// Payment as reported by the processor.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorPayment {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub external_reference: Option<String>,
    /// QR code / ticket data for the payer, passed through untouched
    #[serde(default)]
    pub point_of_interaction: Option<serde_json::Value>,
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

/// Client for the two processor operations this service depends on:
/// creating a PIX payment and reading a payment back.
#[derive(Debug, Clone)]
pub struct MercadoPagoClient {
    client: Client,
    access_token: Option<String>,
    api_base_url: String,
    description: String,
    notification_url: Option<String>,
}

impl MercadoPagoClient {
    pub fn new(config: &MercadoPagoConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            access_token: config.access_token.clone(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            description: config.payment_description.clone(),
            notification_url: config.notification_url.clone(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.access_token.is_some()
    }

    fn access_token(&self) -> Result<&str> {
        self.access_token
            .as_deref()
            .ok_or_else(|| AppError::UpstreamUnavailable("Payment processor is not configured".into()))
    }

    /// Create a PIX payment. `idempotency_key` must be fresh for every call.
    pub async fn create_payment(
        &self,
        license_key: &str,
        amount: f64,
        payer_email: Option<&str>,
        idempotency_key: &str,
    ) -> Result<ProcessorPayment> {
        let request = CreatePaymentRequest {
            transaction_amount: amount,
            description: &self.description,
            payment_method_id: "pix",
            external_reference: license_key,
            payer: payer_email.map(|email| Payer { email }),
            notification_url: self.notification_url.as_deref(),
        };

        let response = self
            .client
            .post(format!("{}/v1/payments", self.api_base_url))
            .bearer_auth(self.access_token()?)
            .header("X-Idempotency-Key", idempotency_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            tracing::warn!("Mercado Pago rejected payment creation ({}): {}", status, error_text);
            return Err(AppError::UpstreamUnavailable(format!(
                "Payment processor rejected the request ({})",
                status.as_u16()
            )));
        }

        response.json().await.map_err(|e| {
            tracing::warn!("Failed to parse Mercado Pago response: {}", e);
            AppError::UpstreamUnavailable("Unexpected payment processor response".into())
        })
    }

    /// Fetch the authoritative state of a payment.
    pub async fn get_payment(&self, payment_id: &str) -> Result<ProcessorPayment> {
        let response = self
            .client
            .get(format!("{}/v1/payments/{}", self.api_base_url, payment_id))
            .bearer_auth(self.access_token()?)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(format!(
                "Payment {} not found at Mercado Pago",
                payment_id
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            tracing::warn!(
                "Mercado Pago lookup of payment {} failed ({}): {}",
                payment_id,
                status,
                error_text
            );
            return Err(AppError::UpstreamUnavailable(format!(
                "Payment processor lookup failed ({})",
                status.as_u16()
            )));
        }

        response.json().await.map_err(|e| {
            tracing::warn!("Failed to parse Mercado Pago response: {}", e);
            AppError::UpstreamUnavailable("Unexpected payment processor response".into())
        })
    }
}
