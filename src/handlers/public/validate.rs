use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::db::{AppState, queries};
use crate::error::Result;
use crate::extractors::{Json, Query};
use crate::licensing::{self, Decision, InvalidReason};
use crate::models::Plan;

/// Missing fields are a validation outcome, not a malformed request.
#[derive(Debug, Default, Deserialize)]
pub struct ValidateRequest {
    #[serde(default, alias = "license_key")]
    pub key: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bound: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<InvalidReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl From<Decision> for ValidateResponse {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Valid { bound, license } => ValidateResponse {
                valid: true,
                bound: Some(bound),
                reason: None,
                plan: Some(license.plan),
                expires_at: Some(license.expires_at),
            },
            Decision::Invalid(reason) => ValidateResponse {
                valid: false,
                bound: None,
                reason: Some(reason),
                plan: None,
                expires_at: None,
            },
        }
    }
}

pub async fn validate_license(
    State(state): State<AppState>,
    Json(request): Json<ValidateRequest>,
) -> Result<Json<ValidateResponse>> {
    run_validation(&state, &request)
}

/// Query-string form kept for older clients.
pub async fn validate_license_query(
    State(state): State<AppState>,
    Query(request): Query<ValidateRequest>,
) -> Result<Json<ValidateResponse>> {
    run_validation(&state, &request)
}

fn run_validation(state: &AppState, request: &ValidateRequest) -> Result<Json<ValidateResponse>> {
    let mut conn = state.db.get()?;
    let decision = licensing::validate(
        &mut conn,
        request.key.as_deref().unwrap_or_default(),
        request.device_id.as_deref().unwrap_or_default(),
        queries::now(),
    )?;

    if let Decision::Invalid(reason) = &decision {
        tracing::debug!("License validation refused: {}", reason.as_ref());
    }

    Ok(Json(decision.into()))
}
