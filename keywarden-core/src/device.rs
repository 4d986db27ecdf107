//! Device records and license classification.
//!
//! One `Device` per licensed installation, keyed by an opaque
//! client-generated id. The record shape matches the backing `devices`
//! table; all decision logic receives this typed struct, never raw rows.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// The license duration class of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseType {
    /// One calendar month.
    Monthly,
    /// Three calendar months.
    Quarterly,
    /// Six calendar months.
    Semiannual,
    /// One calendar year.
    Annual,
    /// Three calendar years.
    Triennial,
    /// Never expires.
    Lifetime,
}

impl LicenseType {
    /// Storage/wire name of this license type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Semiannual => "semiannual",
            Self::Annual => "annual",
            Self::Triennial => "triennial",
            Self::Lifetime => "lifetime",
        }
    }

    /// Parses a storage/wire name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "monthly" => Some(Self::Monthly),
            "quarterly" => Some(Self::Quarterly),
            "semiannual" => Some(Self::Semiannual),
            "annual" => Some(Self::Annual),
            "triennial" => Some(Self::Triennial),
            "lifetime" => Some(Self::Lifetime),
            _ => None,
        }
    }

    /// License period as `(months, years)`, or `None` for lifetime.
    #[must_use]
    pub fn period(&self) -> Option<(u32, u32)> {
        match self {
            Self::Monthly => Some((1, 0)),
            Self::Quarterly => Some((3, 0)),
            Self::Semiannual => Some((6, 0)),
            Self::Annual => Some((0, 1)),
            Self::Triennial => Some((0, 3)),
            Self::Lifetime => None,
        }
    }
}

/// Administrative status of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    /// Approved and usable (subject to expiry).
    Active,
    /// Awaiting administrative approval.
    Pending,
    /// Denied regardless of expiry.
    Blocked,
}

impl DeviceStatus {
    /// Storage/wire name of this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Pending => "pending",
            Self::Blocked => "blocked",
        }
    }

    /// Parses a storage/wire name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "pending" => Some(Self::Pending),
            "blocked" => Some(Self::Blocked),
            _ => None,
        }
    }
}

/// One licensed installation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// Row id in the backing store.
    pub id: i64,
    /// Opaque client-generated identifier, unique and immutable.
    pub device_id: String,
    /// Optional account holder name; carried through untouched.
    pub owner_name: Option<String>,
    /// Optional contact address; carried through untouched.
    pub email: Option<String>,
    /// License duration class.
    pub license_type: LicenseType,
    /// Administrative status.
    pub status: DeviceStatus,
    /// First day of the validity window.
    pub start_date: NaiveDate,
    /// Last day of the validity window; absent for lifetime licenses or
    /// until computed from `start_date` and `license_type`.
    pub end_date: Option<NaiveDate>,
    /// Polling interval override in minutes.
    pub custom_interval: Option<i64>,
    /// Comma-separated capability tags.
    pub features: Option<String>,
    /// Optional update channel: download URL.
    pub update_url: Option<String>,
    /// Optional update channel: artifact SHA-256.
    pub update_hash: Option<String>,
    /// Optional update channel: advertised version.
    pub update_version: Option<String>,
    /// Telemetry: last verification time (store-formatted).
    pub last_seen_at: Option<String>,
    /// Telemetry: last network origin.
    pub last_seen_ip: Option<String>,
    /// Telemetry: last reported hostname.
    pub last_hostname: Option<String>,
    /// Telemetry: last reported client version.
    pub last_version: Option<String>,
}
