//! Device table operations: lookup, auto-provision, blocklist, mutation.

use crate::error::{StoreError, StoreResult};
use crate::{LicenseStore, TS_FORMAT};
use chrono::{DateTime, NaiveDate, Utc};
use keywarden_core::{end_date_for, Device, DeviceStatus, LicenseType};
use rusqlite::{params, OptionalExtension, Row};
use tracing::info;

const DATE_FORMAT: &str = "%Y-%m-%d";

const DEVICE_COLUMNS: &str = "id, device_id, owner_name, email, license_type, status, \
     start_date, end_date, custom_interval, features, \
     update_url, update_hash, update_version, \
     last_seen_at, last_seen_ip, last_hostname, last_version";

impl LicenseStore {
    /// Looks up a device by its client-generated identifier.
    pub fn fetch_device(&self, device_id: &str) -> StoreResult<Option<Device>> {
        let conn = self.lock();
        let device = conn
            .query_row(
                &format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE device_id = ?1 LIMIT 1"),
                params![device_id],
                row_to_device,
            )
            .optional()?;
        Ok(device)
    }

    /// Creates a pending monthly device for a first-seen identifier.
    ///
    /// The validity window starts today; the end date is computed with the
    /// standard calendar arithmetic.
    pub fn auto_provision(&self, device_id: &str, today: NaiveDate) -> StoreResult<Device> {
        let license_type = LicenseType::Monthly;
        let status = DeviceStatus::Pending;
        let end_date = end_date_for(license_type, today);

        let conn = self.lock();
        conn.execute(
            "INSERT INTO devices (device_id, license_type, status, start_date, end_date)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                device_id,
                license_type.as_str(),
                status.as_str(),
                today.format(DATE_FORMAT).to_string(),
                end_date.map(|d| d.format(DATE_FORMAT).to_string()),
            ],
        )?;
        let id = conn.last_insert_rowid();
        info!(device_id, id, "auto-provisioned pending device");

        Ok(Device {
            id,
            device_id: device_id.to_string(),
            owner_name: None,
            email: None,
            license_type,
            status,
            start_date: today,
            end_date,
            custom_interval: None,
            features: None,
            update_url: None,
            update_hash: None,
            update_version: None,
            last_seen_at: None,
            last_seen_ip: None,
            last_hostname: None,
            last_version: None,
        })
    }

    /// Inserts a fully specified device (administrative path and tests).
    /// Returns the new row id.
    pub fn insert_device(&self, device: &Device) -> StoreResult<i64> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO devices (device_id, owner_name, email, license_type, status,
                                  start_date, end_date, custom_interval, features,
                                  update_url, update_hash, update_version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                device.device_id,
                device.owner_name,
                device.email,
                device.license_type.as_str(),
                device.status.as_str(),
                device.start_date.format(DATE_FORMAT).to_string(),
                device.end_date.map(|d| d.format(DATE_FORMAT).to_string()),
                device.custom_interval,
                device.features,
                device.update_url,
                device.update_hash,
                device.update_version,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// True when the id sits in the explicit blocklist table, regardless of
    /// the device's own status.
    pub fn is_blocklisted(&self, device_id: &str) -> StoreResult<bool> {
        let conn = self.lock();
        let hit = conn
            .query_row(
                "SELECT 1 FROM blocked_devices WHERE device_id = ?1 LIMIT 1",
                params![device_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(hit.is_some())
    }

    /// Adds a device id to the explicit blocklist.
    pub fn add_to_blocklist(&self, device_id: &str, reason: Option<&str>) -> StoreResult<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR IGNORE INTO blocked_devices (device_id, reason) VALUES (?1, ?2)",
            params![device_id, reason],
        )?;
        Ok(())
    }

    /// Transitions a device's status. A single update statement; clone
    /// enforcement relies on this being atomic on its own.
    pub fn set_status(
        &self,
        device_id: &str,
        status: DeviceStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE devices SET status = ?1, updated_at = ?2 WHERE device_id = ?3",
            params![
                status.as_str(),
                now.format(TS_FORMAT).to_string(),
                device_id
            ],
        )?;
        Ok(())
    }

    /// Refreshes the telemetry snapshot after a verification attempt.
    pub fn update_seen(
        &self,
        id: i64,
        ip: &str,
        version: &str,
        hostname: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let now_str = now.format(TS_FORMAT).to_string();
        let conn = self.lock();
        conn.execute(
            "UPDATE devices
                SET last_seen_at = ?1,
                    last_seen_ip = ?2,
                    last_version = ?3,
                    last_hostname = ?4,
                    updated_at = ?5
              WHERE id = ?6",
            params![now_str, ip, version, hostname, now_str, id],
        )?;
        Ok(())
    }
}

/// Maps a `devices` row (selected via `DEVICE_COLUMNS`) to the typed
/// record. The only place raw rows become `Device`.
fn row_to_device(row: &Row<'_>) -> rusqlite::Result<Device> {
    let license_raw: String = row.get(4)?;
    let license_type = LicenseType::parse(&license_raw)
        .ok_or_else(|| text_error(4, format!("unknown license type: {license_raw}")))?;

    let status_raw: String = row.get(5)?;
    let status = DeviceStatus::parse(&status_raw)
        .ok_or_else(|| text_error(5, format!("unknown device status: {status_raw}")))?;

    let start_raw: String = row.get(6)?;
    let start_date = NaiveDate::parse_from_str(&start_raw, DATE_FORMAT)
        .map_err(|e| text_error(6, format!("bad start date {start_raw}: {e}")))?;

    let end_date = row
        .get::<_, Option<String>>(7)?
        .map(|raw| {
            NaiveDate::parse_from_str(&raw, DATE_FORMAT)
                .map_err(|e| text_error(7, format!("bad end date {raw}: {e}")))
        })
        .transpose()?;

    Ok(Device {
        id: row.get(0)?,
        device_id: row.get(1)?,
        owner_name: row.get(2)?,
        email: row.get(3)?,
        license_type,
        status,
        start_date,
        end_date,
        custom_interval: row.get(8)?,
        features: row.get(9)?,
        update_url: row.get(10)?,
        update_hash: row.get(11)?,
        update_version: row.get(12)?,
        last_seen_at: row.get(13)?,
        last_seen_ip: row.get(14)?,
        last_hostname: row.get(15)?,
        last_version: row.get(16)?,
    })
}

fn text_error(index: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        rusqlite::types::Type::Text,
        StoreError::InvalidData(message).into(),
    )
}
