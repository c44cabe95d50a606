//! Payment reconciliation: creating payments for a license and turning
//! processor notifications into license renewals.
//!
//! Notifications are at-least-once, may arrive out of order and carry nothing
//! we trust except a payment identifier. Status always comes from a fresh
//! lookup at the processor, and the license always comes from our own payment
//! row.

use std::collections::HashMap;

use rusqlite::TransactionBehavior;
use serde::Serialize;
use serde_json::Value;

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::licensing;
use crate::models::{CreatePayment, PAYMENT_STATUS_APPROVED};

/// Longest payment identifier accepted from a notification.
const MAX_PAYMENT_ID_LEN: usize = 64;

/// Returned to the client that asked for a payment.
#[derive(Debug, Serialize)]
pub struct PaymentHandle {
    pub payment_id: String,
    pub license_key: String,
    pub amount: f64,
    pub status: String,
    /// Processor-provided QR/redirect data, not interpreted here
    pub point_of_interaction: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum NotificationOutcome {
    Ignored {
        reason: &'static str,
    },
    /// Status mirrored, no renewal (not approved, or approval already applied)
    Updated {
        payment_id: String,
        status: String,
    },
    Renewed {
        payment_id: String,
        license_key: String,
        expires_at: i64,
    },
}

/// Ask the processor for a payment that funds `input.license_key`.
///
/// Nothing is stored unless the processor accepted the request.
pub async fn create_payment(state: &AppState, input: &CreatePayment) -> Result<PaymentHandle> {
    let license_key = input.license_key.trim();
    if license_key.is_empty() {
        return Err(AppError::InvalidLicense("License key is required".into()));
    }
    if !input.amount.is_finite() || input.amount <= 0.0 {
        return Err(AppError::BadRequest("Amount must be a positive number".into()));
    }
    let payer_email = input
        .payer_email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty());

    {
        let conn = state.db.get()?;
        let license = queries::get_license_by_key(&conn, license_key)?
            .ok_or_else(|| AppError::InvalidLicense("License not found".into()))?;
        if license.revoked {
            return Err(AppError::InvalidLicense("License has been revoked".into()));
        }
    }

    let idempotency_key = uuid::Uuid::new_v4().to_string();
    let remote = state
        .mercadopago
        .create_payment(license_key, input.amount, payer_email, &idempotency_key)
        .await?;

    let conn = state.db.get()?;
    let payment = queries::create_payment(&conn, &remote.id, license_key, input.amount, &remote.status)?;

    tracing::info!(
        "Payment {} created for license {} (amount={}, status={})",
        payment.payment_id,
        license_key,
        payment.amount,
        payment.status
    );

    Ok(PaymentHandle {
        payment_id: payment.payment_id,
        license_key: payment.license_key,
        amount: payment.amount,
        status: payment.status,
        point_of_interaction: remote.point_of_interaction,
    })
}

/// Process one processor notification.
///
/// Returns `Err` only when the authoritative status could not be determined
/// (processor or database unavailable), so the processor redelivers later.
pub async fn handle_notification(
    state: &AppState,
    query: &HashMap<String, String>,
    body: &[u8],
) -> Result<NotificationOutcome> {
    let Some(payment_id) = extract_payment_id(query, body) else {
        tracing::debug!("Notification without a payment id, ignoring");
        return Ok(NotificationOutcome::Ignored {
            reason: "no_payment_id",
        });
    };

    let payment = {
        let conn = state.db.get()?;
        queries::get_payment(&conn, &payment_id)?
    };
    let Some(payment) = payment else {
        tracing::warn!("Notification for unknown payment {}, ignoring", payment_id);
        return Ok(NotificationOutcome::Ignored {
            reason: "unknown_payment",
        });
    };

    let remote = match state.mercadopago.get_payment(&payment_id).await {
        Ok(p) => p,
        Err(AppError::NotFound(_)) => {
            tracing::warn!("Payment {} is unknown to the processor, ignoring", payment_id);
            return Ok(NotificationOutcome::Ignored {
                reason: "unknown_upstream_payment",
            });
        }
        Err(e) => return Err(e),
    };

    if remote
        .external_reference
        .as_deref()
        .is_some_and(|r| r != payment.license_key)
    {
        tracing::warn!(
            "Payment {} external_reference {:?} differs from stored license {}",
            payment_id,
            remote.external_reference,
            payment.license_key
        );
    }

    let now = queries::now();
    let mut conn = state.db.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    if !queries::update_payment_status(&tx, &payment_id, &remote.status)? {
        tracing::warn!(
            "Payment {} is already approved, ignoring stale status {}",
            payment_id,
            remote.status
        );
        return Ok(NotificationOutcome::Ignored {
            reason: "stale_status",
        });
    }

    let outcome = if remote.status == PAYMENT_STATUS_APPROVED
        && queries::try_mark_payment_approved(&tx, &payment_id, now)?
    {
        let expires_at = licensing::extend(
            &tx,
            &payment.license_key,
            state.config.default_billing_days,
            now,
        )?;
        tracing::info!(
            "Payment {} approved: license {} renewed until {}",
            payment_id,
            payment.license_key,
            expires_at
        );
        NotificationOutcome::Renewed {
            payment_id,
            license_key: payment.license_key,
            expires_at,
        }
    } else {
        tracing::info!("Payment {} status is {}", payment_id, remote.status);
        NotificationOutcome::Updated {
            payment_id,
            status: remote.status,
        }
    };

    tx.commit()?;
    Ok(outcome)
}

/// Find the payment identifier in a notification.
///
/// The delivery format is not fixed, so several shapes are accepted, in order:
/// query `data.id`, query `id` (payment topic), body `data.id`, body `id`
/// (only without `data`, where it names the event instead), body `resource`
/// (URL or bare id). Notifications about other topics yield `None`.
pub fn extract_payment_id(query: &HashMap<String, String>, body: &[u8]) -> Option<String> {
    let body: Option<Value> = serde_json::from_slice(body).ok();
    let body = body.as_ref().filter(|v| v.is_object());

    let query_topic = query
        .get("topic")
        .or_else(|| query.get("type"))
        .map(String::as_str);
    let body_topic = body.and_then(|b| {
        b.get("topic")
            .or_else(|| b.get("type"))
            .and_then(Value::as_str)
    });

    if let Some(topic) = query_topic.or(body_topic) {
        if !is_payment_topic(topic) {
            return None;
        }
    }

    if let Some(id) = query.get("data.id").and_then(|v| sanitize_id(v)) {
        return Some(id);
    }
    if let Some(id) = query.get("id").and_then(|v| sanitize_id(v)) {
        return Some(id);
    }

    let body = body?;

    if let Some(id) = body.get("data").and_then(|d| d.get("id")) {
        return id_from_value(id);
    }
    if body.get("data").is_none() {
        if let Some(id) = body.get("id").and_then(id_from_value) {
            return Some(id);
        }
    }
    body.get("resource")
        .and_then(Value::as_str)
        .and_then(|r| r.trim_end_matches('/').rsplit('/').next())
        .and_then(sanitize_id)
}

fn is_payment_topic(topic: &str) -> bool {
    topic == "payment" || topic.starts_with("payment.")
}

fn id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => sanitize_id(s),
        Value::Number(n) => sanitize_id(&n.to_string()),
        _ => None,
    }
}

/// The id ends up in a processor URL, so only plain identifier characters pass.
fn sanitize_id(raw: &str) -> Option<String> {
    let id = raw.trim();
    let ok = !id.is_empty()
        && id.len() <= MAX_PAYMENT_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    ok.then(|| id.to_string())
}
