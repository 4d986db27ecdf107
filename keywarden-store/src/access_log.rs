//! Append-only access log and the clone detector's window query.

use crate::error::StoreResult;
use crate::{LicenseStore, TS_FORMAT};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use keywarden_core::AccessLogEntry;
use rusqlite::{params, Row};

/// Most entries the window query will return; older entries carry no
/// additional signal for the heuristic.
const WINDOW_LIMIT: i64 = 20;

impl LicenseStore {
    /// Appends one row per verification attempt, regardless of outcome.
    pub fn insert_access(&self, entry: &AccessLogEntry) -> StoreResult<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO access_logs
                (device_id, ip, user_agent, hostname, client_version,
                 telemetry_json, allowed, message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                entry.device_id,
                entry.ip,
                entry.user_agent,
                entry.hostname,
                entry.client_version,
                entry.telemetry_json,
                entry.allowed,
                entry.message,
                entry.created_at.format(TS_FORMAT).to_string(),
            ],
        )?;
        Ok(())
    }

    /// The trailing window of *allowed* accesses for one device, newest
    /// first, capped at 20 entries. This is the clone detector's input.
    pub fn recent_allowed_accesses(
        &self,
        device_id: &str,
        window_secs: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<AccessLogEntry>> {
        let window_start = (now - Duration::seconds(window_secs))
            .format(TS_FORMAT)
            .to_string();

        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT device_id, ip, user_agent, hostname, client_version,
                    telemetry_json, allowed, message, created_at
               FROM access_logs
              WHERE device_id = ?1
                AND created_at >= ?2
                AND allowed = 1
              ORDER BY created_at DESC
              LIMIT ?3",
        )?;

        let entries = stmt
            .query_map(params![device_id, window_start, WINDOW_LIMIT], row_to_entry)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<AccessLogEntry> {
    let created_raw: String = row.get(8)?;
    let created_at = NaiveDateTime::parse_from_str(&created_raw, TS_FORMAT)
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                8,
                rusqlite::types::Type::Text,
                format!("bad access timestamp {created_raw}: {e}").into(),
            )
        })?
        .and_utc();

    Ok(AccessLogEntry {
        device_id: row.get(0)?,
        ip: row.get(1)?,
        user_agent: row.get(2)?,
        hostname: row.get(3)?,
        client_version: row.get(4)?,
        telemetry_json: row.get(5)?,
        allowed: row.get(6)?,
        message: row.get(7)?,
        created_at,
    })
}
