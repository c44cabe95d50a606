//! License lifecycle: issuing keys, computing expiry, device binding ("activate
//! once, lock to device") and the admin overrides.
//!
//! Validation failures are ordinary outcomes and come back as [`Decision`]
//! values. `Err` is reserved for authorization and infrastructure failures.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;
use strum::AsRefStr;
use subtle::ConstantTimeEq;

use crate::db::queries;
use crate::error::{AppError, Result};
use crate::models::{CreateLicense, License, LicenseState, LicenseWithStatus, Plan, StatusFilter};
use crate::pagination::{Paginated, PaginationQuery};

/// Random bytes behind a generated key (24 characters once encoded).
const KEY_BYTES: usize = 18;

/// Attempts at finding an unused generated key before giving up.
const KEY_GENERATION_ATTEMPTS: usize = 5;

/// Shortest device identifier accepted for binding.
pub const MIN_DEVICE_ID_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InvalidReason {
    MissingKey,
    MissingDeviceId,
    NotFound,
    Inactive,
    Revoked,
    Expired,
    DeviceMismatch,
}

/// Outcome of a validation request.
#[derive(Debug, Clone)]
pub enum Decision {
    /// `bound` is true only for the request that locked the license to its device.
    Valid { bound: bool, license: License },
    Invalid(InvalidReason),
}

impl Decision {
    pub fn is_valid(&self) -> bool {
        matches!(self, Decision::Valid { .. })
    }

    pub fn reason(&self) -> Option<InvalidReason> {
        match self {
            Decision::Valid { .. } => None,
            Decision::Invalid(reason) => Some(*reason),
        }
    }
}

/// Check an admin credential against the configured secret in constant time.
pub fn verify_admin_key(expected: &str, provided: Option<&str>) -> Result<()> {
    let provided = provided.map(str::trim).unwrap_or_default();
    if provided.is_empty() || expected.is_empty() {
        return Err(AppError::Unauthorized);
    }
    if bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        Err(AppError::Unauthorized)
    }
}

/// Generate a URL-safe license key from 18 bytes of OS-seeded randomness.
pub fn generate_license_key() -> String {
    let mut bytes = [0u8; KEY_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Expiry of a license of `plan` issued at `issued_at`.
pub fn compute_expiration(plan: Plan, issued_at: i64, billing_days: i64) -> i64 {
    issued_at + plan.horizon_secs(billing_days)
}

/// Issue a new license. A blank key means "generate one"; an explicit key that
/// already exists fails with `DuplicateKey`.
pub fn create_license(
    conn: &Connection,
    billing_days: i64,
    input: &CreateLicense,
    now: i64,
) -> Result<License> {
    let expires_at = compute_expiration(input.plan, now, billing_days);

    let explicit = input
        .key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty());

    let license = match explicit {
        Some(key) => queries::insert_license(conn, key, input.plan, now, expires_at)?,
        None => insert_generated(conn, input.plan, now, expires_at)?,
    };

    tracing::info!(
        "Created {} license {} (expires_at={})",
        license.plan.as_ref(),
        license.key,
        license.expires_at
    );

    Ok(license)
}

fn insert_generated(conn: &Connection, plan: Plan, issued_at: i64, expires_at: i64) -> Result<License> {
    for _ in 0..KEY_GENERATION_ATTEMPTS {
        let key = generate_license_key();
        match queries::insert_license(conn, &key, plan, issued_at, expires_at) {
            Err(AppError::DuplicateKey(_)) => {
                tracing::warn!("Generated license key collided, retrying");
            }
            other => return other,
        }
    }
    Err(AppError::Internal(
        "Could not generate a unique license key".into(),
    ))
}

/// What the stored license says about a request from `device_id`.
/// `None` means the license is usable but unbound, so the caller should bind.
fn evaluate(license: &License, device_id: &str, now: i64) -> Option<Decision> {
    match license.state(now) {
        LicenseState::Revoked => Some(Decision::Invalid(InvalidReason::Revoked)),
        LicenseState::Inactive => Some(Decision::Invalid(InvalidReason::Inactive)),
        LicenseState::Expired => Some(Decision::Invalid(InvalidReason::Expired)),
        LicenseState::Provisioned => None,
        LicenseState::Bound => {
            if license.device_id.as_deref() == Some(device_id) {
                Some(Decision::Valid {
                    bound: false,
                    license: license.clone(),
                })
            } else {
                Some(Decision::Invalid(InvalidReason::DeviceMismatch))
            }
        }
    }
}

/// Validate a license for a device, binding it on first use.
///
/// The bind runs in an IMMEDIATE transaction that re-reads the row under the
/// write lock, so two concurrent first activations cannot both bind.
pub fn validate(conn: &mut Connection, key: &str, device_id: &str, now: i64) -> Result<Decision> {
    let key = key.trim();
    let device_id = device_id.trim();

    if key.is_empty() {
        return Ok(Decision::Invalid(InvalidReason::MissingKey));
    }
    if device_id.chars().count() < MIN_DEVICE_ID_LEN {
        return Ok(Decision::Invalid(InvalidReason::MissingDeviceId));
    }

    let Some(license) = queries::get_license_by_key(conn, key)? else {
        return Ok(Decision::Invalid(InvalidReason::NotFound));
    };

    if let Some(decision) = evaluate(&license, device_id, now) {
        return Ok(decision);
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    // Another request may have bound or changed the license since the first read
    let Some(license) = queries::get_license_by_key(&tx, key)? else {
        return Ok(Decision::Invalid(InvalidReason::NotFound));
    };

    let decision = match evaluate(&license, device_id, now) {
        Some(decision) => decision,
        None => {
            if !queries::bind_device(&tx, key, device_id, now)? {
                return Err(AppError::Internal(format!(
                    "License {} changed while holding the write lock",
                    key
                )));
            }
            tracing::info!("License {} bound to device {}", key, device_id);
            Decision::Valid {
                bound: true,
                license: License {
                    device_id: Some(device_id.to_string()),
                    activated_at: Some(now),
                    ..license
                },
            }
        }
    };

    tx.commit()?;
    Ok(decision)
}

fn require_license(conn: &Connection, key: &str) -> Result<License> {
    queries::get_license_by_key(conn, key)?
        .ok_or_else(|| AppError::NotFound("License not found".into()))
}

/// Revoke a license for good. Expiry and device binding are left as they are.
pub fn revoke(conn: &Connection, key: &str, reason: Option<&str>, now: i64) -> Result<License> {
    let reason = reason.map(str::trim).filter(|r| !r.is_empty());
    if !queries::revoke_license(conn, key, reason, now)? {
        return Err(AppError::NotFound("License not found".into()));
    }
    tracing::info!("License {} revoked (reason={:?})", key, reason);
    require_license(conn, key)
}

/// Drop the device binding so the license can be activated on another device.
pub fn reset_device(conn: &Connection, key: &str) -> Result<License> {
    if !queries::reset_device(conn, key)? {
        return Err(AppError::NotFound("License not found".into()));
    }
    tracing::info!("License {} device binding reset", key);
    require_license(conn, key)
}

/// Flip the admin `active` flag.
pub fn set_active(conn: &Connection, key: &str, active: bool) -> Result<License> {
    if !queries::set_license_active(conn, key, active)? {
        return Err(AppError::NotFound("License not found".into()));
    }
    tracing::info!("License {} active={}", key, active);
    require_license(conn, key)
}

/// Renew a license by `days`, keeping any unused time, and re-activate it.
/// Returns the new expiry.
pub fn extend(conn: &Connection, key: &str, days: i64, now: i64) -> Result<i64> {
    let seconds = days
        .checked_mul(crate::models::SECONDS_PER_DAY)
        .filter(|s| *s > 0 && now.checked_add(*s).is_some())
        .ok_or_else(|| AppError::BadRequest(format!("Invalid extension of {} days", days)))?;
    let expires_at = queries::extend_license(conn, key, seconds, now)?
        .ok_or_else(|| AppError::NotFound("License not found".into()))?;
    tracing::info!("License {} extended by {} days (expires_at={})", key, days, expires_at);
    Ok(expires_at)
}

/// Page through licenses with their derived status.
pub fn list(
    conn: &Connection,
    status: Option<StatusFilter>,
    search: Option<&str>,
    pagination: &PaginationQuery,
    now: i64,
) -> Result<Paginated<LicenseWithStatus>> {
    let limit = pagination.limit();
    let offset = pagination.offset();
    let (licenses, total) = queries::list_licenses_paginated(conn, status, search, now, limit, offset)?;
    let items = licenses
        .into_iter()
        .map(|l| LicenseWithStatus::at(l, now))
        .collect();
    Ok(Paginated::new(items, total, limit, offset))
}
