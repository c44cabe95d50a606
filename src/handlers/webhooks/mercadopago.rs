use std::collections::HashMap;

use axum::{body::Bytes, extract::State};
use serde::Serialize;

use crate::db::AppState;
use crate::error::Result;
use crate::extractors::{Json, Query};
use crate::payments::{self, NotificationOutcome};

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub ok: bool,
    #[serde(flatten)]
    pub outcome: NotificationOutcome,
}

/// Mercado Pago notification endpoint.
///
/// Anything that isn't a usable payment notification is acknowledged with 200
/// so the processor stops retrying. Errors (processor or database down) map to
/// non-2xx so it delivers again later.
pub async fn handle_mercadopago_webhook(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Result<Json<WebhookAck>> {
    let outcome = payments::handle_notification(&state, &query, &body)
        .await
        .inspect_err(|e| tracing::error!("Mercado Pago notification failed: {}", e))?;

    Ok(Json(WebhookAck { ok: true, outcome }))
}
