use chrono::Utc;
use rusqlite::{Connection, ErrorCode, ToSql, params};

use crate::error::{AppError, Result};
use crate::models::*;

use super::from_row::{LICENSE_COLS, PAYMENT_COLS, query_all, query_one};

pub fn now() -> i64 {
    Utc::now().timestamp()
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

// ============ Licenses ============

/// Insert a license. The primary key makes this an atomic insert-or-fail:
/// an existing key yields `DuplicateKey` without touching the stored row.
pub fn insert_license(
    conn: &Connection,
    key: &str,
    plan: Plan,
    issued_at: i64,
    expires_at: i64,
) -> Result<License> {
    conn.execute(
        "INSERT INTO licenses (key, plan, issued_at, expires_at, active, revoked)
         VALUES (?1, ?2, ?3, ?4, 1, 0)",
        params![key, plan.as_ref(), issued_at, expires_at],
    )
    .map_err(|e| {
        if is_constraint_violation(&e) {
            AppError::DuplicateKey("License already exists".into())
        } else {
            e.into()
        }
    })?;

    Ok(License {
        key: key.to_string(),
        plan,
        issued_at,
        expires_at,
        active: true,
        revoked: false,
        revoked_at: None,
        revoke_reason: None,
        device_id: None,
        activated_at: None,
    })
}

pub fn get_license_by_key(conn: &Connection, key: &str) -> Result<Option<License>> {
    query_one(
        conn,
        &format!("SELECT {} FROM licenses WHERE key = ?1", LICENSE_COLS),
        params![key],
    )
}

/// List licenses newest first, optionally filtered by derived status and a
/// substring matched against key, device and plan. Returns the page and the
/// total number of matching rows.
pub fn list_licenses_paginated(
    conn: &Connection,
    status: Option<StatusFilter>,
    search: Option<&str>,
    now: i64,
    limit: i64,
    offset: i64,
) -> Result<(Vec<License>, i64)> {
    let mut conditions: Vec<&str> = Vec::new();
    let mut named: Vec<(&str, &dyn ToSql)> = Vec::new();

    if let Some(filter) = status {
        conditions.push(filter.sql_predicate());
        if filter.uses_now() {
            named.push((":now", &now as &dyn ToSql));
        }
    }

    let pattern = search
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", escape_like(s)));
    if let Some(pattern) = &pattern {
        conditions.push(
            "(key LIKE :search ESCAPE '\\' OR IFNULL(device_id, '') LIKE :search ESCAPE '\\' OR plan LIKE :search ESCAPE '\\')",
        );
        named.push((":search", pattern as &dyn ToSql));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(
            "WHERE {}",
            conditions
                .iter()
                .map(|c| format!("({})", c))
                .collect::<Vec<_>>()
                .join(" AND ")
        )
    };

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM licenses {}", where_clause),
        named.as_slice(),
        |row| row.get(0),
    )?;

    let mut page_params = named.clone();
    page_params.push((":limit", &limit as &dyn ToSql));
    page_params.push((":offset", &offset as &dyn ToSql));

    let items = query_all(
        conn,
        &format!(
            "SELECT {} FROM licenses {} ORDER BY issued_at DESC, key ASC LIMIT :limit OFFSET :offset",
            LICENSE_COLS, where_clause
        ),
        page_params.as_slice(),
    )?;

    Ok((items, total))
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Bind a device to a license that has none. Conditional on the license still
/// being unbound, so of two racing binds only one changes the row.
///
/// Returns whether this call performed the bind.
pub fn bind_device(conn: &Connection, key: &str, device_id: &str, now: i64) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE licenses SET device_id = ?1, activated_at = ?2
         WHERE key = ?3 AND (device_id IS NULL OR device_id = '')",
        params![device_id, now, key],
    )?;
    Ok(affected > 0)
}

/// Clear the device binding. Plan, expiry, active and revoked state are untouched.
pub fn reset_device(conn: &Connection, key: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE licenses SET device_id = NULL, activated_at = NULL WHERE key = ?1",
        params![key],
    )?;
    Ok(affected > 0)
}

/// Mark a license revoked. A repeated revocation keeps the first timestamp.
pub fn revoke_license(conn: &Connection, key: &str, reason: Option<&str>, now: i64) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE licenses
         SET revoked = 1,
             revoked_at = COALESCE(revoked_at, ?2),
             revoke_reason = COALESCE(?3, revoke_reason)
         WHERE key = ?1",
        params![key, now, reason],
    )?;
    Ok(affected > 0)
}

pub fn set_license_active(conn: &Connection, key: &str, active: bool) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE licenses SET active = ?1 WHERE key = ?2",
        params![active as i32, key],
    )?;
    Ok(affected > 0)
}

/// Push expiry forward by `seconds`, counting from the later of the current
/// expiry and `now`, and re-activate the license. The device binding is kept.
///
/// Returns the new expiry, or None if the license does not exist.
pub fn extend_license(conn: &Connection, key: &str, seconds: i64, now: i64) -> Result<Option<i64>> {
    let affected = conn.execute(
        "UPDATE licenses SET expires_at = MAX(expires_at, ?2) + ?3, active = 1 WHERE key = ?1",
        params![key, now, seconds],
    )?;
    if affected == 0 {
        return Ok(None);
    }
    let expires_at = conn.query_row(
        "SELECT expires_at FROM licenses WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )?;
    Ok(Some(expires_at))
}

// ============ Payments ============

pub fn create_payment(
    conn: &Connection,
    payment_id: &str,
    license_key: &str,
    amount: f64,
    status: &str,
) -> Result<Payment> {
    let now = now();

    conn.execute(
        "INSERT INTO payments (payment_id, license_key, amount, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![payment_id, license_key, amount, status, now, now],
    )
    .map_err(|e| {
        if is_constraint_violation(&e) {
            AppError::Internal(format!("Payment {} already recorded", payment_id))
        } else {
            e.into()
        }
    })?;

    Ok(Payment {
        payment_id: payment_id.to_string(),
        license_key: license_key.to_string(),
        amount,
        status: status.to_string(),
        approved_at: None,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_payment(conn: &Connection, payment_id: &str) -> Result<Option<Payment>> {
    query_one(
        conn,
        &format!("SELECT {} FROM payments WHERE payment_id = ?1", PAYMENT_COLS),
        params![payment_id],
    )
}

pub fn list_payments_for_license(conn: &Connection, license_key: &str) -> Result<Vec<Payment>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM payments WHERE license_key = ?1 ORDER BY created_at DESC",
            PAYMENT_COLS
        ),
        params![license_key],
    )
}

/// Mirror the processor's status. Lookups can finish out of order, so an
/// approved payment never moves back to a pre-approval status.
///
/// Returns false when the write was refused as stale (or the row is missing).
pub fn update_payment_status(conn: &Connection, payment_id: &str, status: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE payments SET status = ?1, updated_at = ?2
         WHERE payment_id = ?3 AND (approved_at IS NULL OR ?4 = 0)",
        params![status, now(), payment_id, is_pre_approval_status(status)],
    )?;
    Ok(affected > 0)
}

/// Atomically record the first approval of a payment.
///
/// Compare-and-swap on `approved_at`: returns `true` only for the call that
/// moved it from NULL, so each payment funds at most one renewal no matter how
/// many approved notifications arrive.
pub fn try_mark_payment_approved(conn: &Connection, payment_id: &str, now: i64) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE payments SET approved_at = ?1 WHERE payment_id = ?2 AND approved_at IS NULL",
        params![now, payment_id],
    )?;
    Ok(affected > 0)
}
