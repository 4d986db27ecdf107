use chrono::{NaiveDate, TimeZone, Utc};
use keywarden_core::{AccessLogEntry, Device, DeviceStatus, LicenseType};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// An active annual device with no optional fields set.
pub fn base_device() -> Device {
    Device {
        id: 1,
        device_id: "abc123".to_string(),
        owner_name: None,
        email: None,
        license_type: LicenseType::Annual,
        status: DeviceStatus::Active,
        start_date: date(2024, 1, 15),
        end_date: Some(date(2025, 1, 15)),
        custom_interval: None,
        features: None,
        update_url: None,
        update_hash: None,
        update_version: None,
        last_seen_at: None,
        last_seen_ip: None,
        last_hostname: None,
        last_version: None,
    }
}

pub fn access_entry(device_id: &str, ip: &str, hostname: &str) -> AccessLogEntry {
    AccessLogEntry {
        device_id: device_id.to_string(),
        ip: ip.to_string(),
        user_agent: None,
        hostname: if hostname.is_empty() {
            None
        } else {
            Some(hostname.to_string())
        },
        client_version: Some("1.0.0".to_string()),
        telemetry_json: None,
        allowed: true,
        message: "License active.".to_string(),
        created_at: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
    }
}
