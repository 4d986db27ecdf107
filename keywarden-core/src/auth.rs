//! Request authentication: timestamp skew guard, API key, request digest.
//!
//! The request signature is a plain SHA-256 hex digest of
//! `device_id|version|ts|shared_secret` — a keyed hash, not a true HMAC.
//! Deployed clients compute it this way, so the scheme is frozen; the
//! secret travels inside the digested material. Comparisons are
//! constant-time regardless.

use crate::error::{VerifyError, VerifyResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Parses a client timestamp in the fixed `YYYYMMDDHHMMSS` UTC format.
///
/// # Errors
///
/// Returns `InvalidTimestamp` for anything that is not exactly 14 ASCII
/// digits forming a valid UTC datetime.
pub fn parse_client_timestamp(ts: &str) -> VerifyResult<DateTime<Utc>> {
    if ts.len() != 14 || !ts.bytes().all(|b| b.is_ascii_digit()) {
        return Err(VerifyError::InvalidTimestamp(ts.to_string()));
    }
    NaiveDateTime::parse_from_str(ts, "%Y%m%d%H%M%S")
        .map(|dt| dt.and_utc())
        .map_err(|_| VerifyError::InvalidTimestamp(ts.to_string()))
}

/// Rejects requests whose clock differs from server time by more than the
/// allowed skew. A difference exactly at the maximum is accepted.
///
/// # Errors
///
/// Returns `ClockSkewExceeded` carrying the observed difference so the
/// message can tell the operator how far off the client clock is.
pub fn check_skew(
    client_time: DateTime<Utc>,
    now: DateTime<Utc>,
    max_skew_secs: i64,
) -> VerifyResult<()> {
    let diff_secs = (now - client_time).num_seconds().abs();
    if diff_secs > max_skew_secs {
        return Err(VerifyError::ClockSkewExceeded {
            diff_secs,
            max_skew_secs,
        });
    }
    Ok(())
}

/// Checks a caller-supplied API key (query parameter or header) against the
/// configured value. Exact match on either source passes.
#[must_use]
pub fn api_key_matches(from_query: &str, from_header: &str, expected: &str) -> bool {
    from_query == expected || from_header == expected
}

/// Computes the legacy request digest:
/// `sha256("{device_id}|{version}|{ts}|{secret}")` as lowercase hex.
#[must_use]
pub fn request_digest(device_id: &str, version: &str, ts: &str, secret: &str) -> String {
    let canonical = format!("{device_id}|{version}|{ts}|{secret}");
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Verifies a request signature in constant time.
#[must_use]
pub fn verify_request_signature(
    device_id: &str,
    version: &str,
    ts: &str,
    secret: &str,
    provided: &str,
) -> bool {
    let expected = request_digest(device_id, version, ts, secret);
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}
