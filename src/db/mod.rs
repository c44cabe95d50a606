mod from_row;
pub mod queries;

pub use from_row::*;

use std::sync::Arc;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::config::Config;
use crate::error::Result;
use crate::payments::MercadoPagoClient;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = r2d2::PooledConnection<SqliteConnectionManager>;

/// How long a writer waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Arc<Config>,
    pub mercadopago: MercadoPagoClient,
}

/// Open a pool against a database file, creating the schema if needed.
pub fn create_pool(path: &str) -> Result<DbPool> {
    let manager = SqliteConnectionManager::file(path).with_init(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
    });
    let pool = Pool::builder().max_size(16).build(manager)?;
    let conn = pool.get()?;
    init_db(&conn)?;
    Ok(pool)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS licenses (
            key TEXT PRIMARY KEY,
            plan TEXT NOT NULL DEFAULT 'monthly' CHECK (plan IN ('trial', 'monthly')),
            issued_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            revoked INTEGER NOT NULL DEFAULT 0,
            revoked_at INTEGER,
            revoke_reason TEXT,
            device_id TEXT,
            activated_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_licenses_issued_at ON licenses(issued_at);

        CREATE TABLE IF NOT EXISTS payments (
            payment_id TEXT PRIMARY KEY,
            license_key TEXT NOT NULL REFERENCES licenses(key),
            amount REAL NOT NULL,
            status TEXT NOT NULL,
            approved_at INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_payments_license ON payments(license_key);
        "#,
    )?;
    Ok(())
}
