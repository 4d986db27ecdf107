//! Error types for the verification pipeline.

use thiserror::Error;

/// Protocol- and authentication-level rejections.
///
/// These short-circuit the pipeline before the device store is mutated.
/// Business denies (expired, pending, blocked, clone) are not errors — they
/// flow through the full pipeline and come back as `allow: false`.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// Required request parameters are absent or empty.
    #[error("Missing parameters.")]
    MissingParams,

    /// API key does not match the configured value.
    #[error("Invalid API key.")]
    InvalidApiKey,

    /// Timestamp is not a 14-digit `YYYYMMDDHHMMSS` UTC value.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Client clock differs from server time by more than the allowed skew.
    #[error(
        "Clock out of sync. Difference: {}h {}min (maximum allowed: {}h). Synchronize the system clock.",
        .diff_secs / 3600,
        (.diff_secs % 3600) / 60,
        .max_skew_secs / 3600
    )]
    ClockSkewExceeded {
        /// Absolute client/server difference in seconds.
        diff_secs: i64,
        /// Configured maximum skew in seconds.
        max_skew_secs: i64,
    },

    /// Signature enforcement is on and the request carried no signature.
    #[error("Missing signature.")]
    MissingSignature,

    /// Request signature does not match the canonical digest.
    #[error("Invalid signature.")]
    InvalidSignature,

    /// Device id is on an explicit deny list.
    #[error("Device blocked.")]
    Blocklisted,

    /// Unknown device id and auto-provisioning is disabled.
    #[error("Device not registered.")]
    UnknownDevice,

    /// Serialization error while building a token payload.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl VerifyError {
    /// HTTP status for this rejection: 400 for protocol errors, 403 for
    /// authentication/authorization failures.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::MissingParams
            | Self::InvalidTimestamp(_)
            | Self::ClockSkewExceeded { .. } => 400,
            Self::InvalidApiKey
            | Self::MissingSignature
            | Self::InvalidSignature
            | Self::Blocklisted
            | Self::UnknownDevice => 403,
            Self::Serialization(_) => 500,
        }
    }
}

/// Result type for verification operations.
pub type VerifyResult<T> = Result<T, VerifyError>;
