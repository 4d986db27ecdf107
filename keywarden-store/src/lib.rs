//! SQLite persistence for Keywarden.
//!
//! Owns the three tables the verification core consumes:
//!
//! - `devices` — one row per licensed installation
//! - `blocked_devices` — explicit deny list, independent of device status
//! - `access_logs` — append-only, one row per verification attempt
//!
//! The store is the single serialization point of the service: request
//! handlers share one connection behind a mutex and rely on SQLite for
//! isolation. A busy timeout bounds how long a request may wait on the
//! backend; busy/locked failures surface as transient errors so callers
//! can distinguish "not entitled" from "can't tell".

mod access_log;
mod device_store;
mod error;

pub use error::{StoreError, StoreResult};

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Timestamp format used for every TEXT datetime column. Window queries
/// compare these as strings, so reads and writes must agree on one format.
pub(crate) const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the license database. Cheap to clone; all clones share one
/// connection.
#[derive(Clone)]
pub struct LicenseStore {
    conn: Arc<Mutex<Connection>>,
}

impl LicenseStore {
    /// Opens (or creates) the database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the schema cannot
    /// be initialized.
    pub fn open(path: &Path) -> StoreResult<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Opens an in-memory database (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub(crate) fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("store mutex poisoned")
    }

    fn init_schema(&self) -> StoreResult<()> {
        self.lock().execute_batch(
            "
            CREATE TABLE IF NOT EXISTS devices (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                device_id TEXT NOT NULL UNIQUE,
                owner_name TEXT,
                email TEXT,
                license_type TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                start_date TEXT NOT NULL,
                end_date TEXT,
                custom_interval INTEGER,
                features TEXT,
                update_url TEXT,
                update_hash TEXT,
                update_version TEXT,
                last_seen_at TEXT,
                last_seen_ip TEXT,
                last_hostname TEXT,
                last_version TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS blocked_devices (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                device_id TEXT NOT NULL UNIQUE,
                reason TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS access_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                device_id TEXT NOT NULL,
                ip TEXT NOT NULL,
                user_agent TEXT,
                hostname TEXT,
                client_version TEXT,
                telemetry_json TEXT,
                allowed INTEGER NOT NULL,
                message TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_access_logs_device_time
                ON access_logs (device_id, created_at);
            ",
        )?;
        Ok(())
    }
}
