//! Row mapping shared by the query functions.

use rusqlite::{Connection, OptionalExtension, Params, Row, types::Type};

use crate::error::Result;
use crate::models::{License, Payment, Plan};

pub const LICENSE_COLS: &str = "key, plan, issued_at, expires_at, active, revoked, revoked_at, revoke_reason, device_id, activated_at";

pub const PAYMENT_COLS: &str =
    "payment_id, license_key, amount, status, approved_at, created_at, updated_at";

pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

impl FromRow for License {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let plan: String = row.get(1)?;
        let plan: Plan = plan.parse().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e))
        })?;
        Ok(License {
            key: row.get(0)?,
            plan,
            issued_at: row.get(2)?,
            expires_at: row.get(3)?,
            active: row.get::<_, i32>(4)? != 0,
            revoked: row.get::<_, i32>(5)? != 0,
            revoked_at: row.get(6)?,
            revoke_reason: row.get(7)?,
            device_id: row.get(8)?,
            activated_at: row.get(9)?,
        })
    }
}

impl FromRow for Payment {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Payment {
            payment_id: row.get(0)?,
            license_key: row.get(1)?,
            amount: row.get(2)?,
            status: row.get(3)?,
            approved_at: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }
}

pub fn query_one<T: FromRow, P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Option<T>> {
    let row = conn.query_row(sql, params, |row| T::from_row(row)).optional()?;
    Ok(row)
}

pub fn query_all<T: FromRow, P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, |row| T::from_row(row))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
