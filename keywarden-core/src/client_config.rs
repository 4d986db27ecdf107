//! The per-device configuration payload returned with every decision.

use crate::device::Device;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Default polling interval when the device carries no override.
pub const DEFAULT_INTERVAL_MINUTES: i64 = 30;

/// Floor applied to custom polling intervals.
pub const MIN_INTERVAL_MINUTES: i64 = 15;

const DEFAULT_FEATURE: &str = "core";

/// Optional update channel advertised to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateInfo {
    /// Download URL.
    pub url: String,
    /// Artifact SHA-256, if published.
    pub sha256: Option<String>,
    /// Advertised version, if published.
    pub version: Option<String>,
}

/// Client-facing configuration derived from the device record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Polling interval in minutes.
    pub interval: i64,
    /// Capability tags; defaults to `["core"]`.
    pub features: Vec<String>,
    /// Operator broadcast message; empty when unset.
    pub message: String,
    /// Update channel, when the device has one configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<UpdateInfo>,
    /// Effective license end date (`YYYY-MM-DD`), if any.
    pub license_expires_at: Option<String>,
    /// Days the client may trust a cached token while offline.
    pub offline_grace_days: u32,
}

impl ClientConfig {
    /// Builds the payload for a device and its effective end date.
    #[must_use]
    pub fn for_device(
        device: &Device,
        effective_end: Option<NaiveDate>,
        offline_grace_days: u32,
    ) -> Self {
        let interval = device
            .custom_interval
            .filter(|v| *v > 0)
            .map(|v| v.max(MIN_INTERVAL_MINUTES))
            .unwrap_or(DEFAULT_INTERVAL_MINUTES);

        let features = device
            .features
            .as_deref()
            .map(parse_features)
            .filter(|tags| !tags.is_empty())
            .unwrap_or_else(|| vec![DEFAULT_FEATURE.to_string()]);

        let update = device.update_url.as_ref().map(|url| UpdateInfo {
            url: url.clone(),
            sha256: device.update_hash.clone(),
            version: device.update_version.clone(),
        });

        Self {
            interval,
            features,
            message: String::new(),
            update,
            license_expires_at: effective_end.map(|d| d.format("%Y-%m-%d").to_string()),
            offline_grace_days,
        }
    }
}

/// Splits the stored CSV feature list, dropping empty segments.
fn parse_features(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}
