//! Access-log entries: one append-only row per verification attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A recorded verification attempt. Written regardless of outcome and never
/// mutated; the clone detector reads a trailing window of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessLogEntry {
    /// Device identifier the attempt was made for.
    pub device_id: String,
    /// Resolved network origin.
    pub ip: String,
    /// Caller user agent, if any.
    pub user_agent: Option<String>,
    /// Client-reported hostname, if any.
    pub hostname: Option<String>,
    /// Client-reported version.
    pub client_version: Option<String>,
    /// Opaque telemetry blob forwarded by the client; stored, never parsed.
    pub telemetry_json: Option<String>,
    /// Whether the verification was allowed.
    pub allowed: bool,
    /// The decision message returned to the client.
    pub message: String,
    /// When the attempt was recorded (UTC).
    pub created_at: DateTime<Utc>,
}
