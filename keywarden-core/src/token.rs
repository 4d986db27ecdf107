//! Signed license tokens for client-side caching.
//!
//! The token payload is serialized once, canonically, and the signature is
//! an HMAC-SHA256 over those exact bytes. Clients verify against
//! `payload_raw`, never a re-serialization — any canonicalization drift
//! between signer and verifier would break offline grace.
//!
//! Canonical form: JSON with keys in lexicographic order and no extraneous
//! whitespace. `LicenseClaims` declares its fields in that order, so plain
//! `serde_json::to_string` produces the canonical bytes.

use crate::device::{DeviceStatus, LicenseType};
use crate::error::VerifyResult;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Canonical token payload. Field order is the canonical key order — do
/// not reorder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseClaims {
    /// Device identifier the token was issued for.
    pub device_id: String,
    /// Effective license end date (`YYYY-MM-DD`), if any.
    pub expires_at: Option<String>,
    /// Capability tags granted to the client.
    pub features: Vec<String>,
    /// Issue time, RFC 3339 UTC.
    pub issued_at: String,
    /// License duration class.
    pub license_type: LicenseType,
    /// Device status at issue time.
    pub status: DeviceStatus,
}

/// A signed license token: payload, its exact serialized bytes, and the
/// HMAC signature over those bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseToken {
    /// Decoded payload for convenience.
    pub payload: LicenseClaims,
    /// The exact serialized payload the signature covers.
    pub payload_raw: String,
    /// Lowercase hex HMAC-SHA256 of `payload_raw` under the shared secret.
    pub signature: String,
}

/// Serializes and signs a token payload.
///
/// # Errors
///
/// Returns a serialization error if the claims cannot be encoded (does not
/// happen for well-formed claims).
pub fn issue_token(claims: LicenseClaims, secret: &str) -> VerifyResult<LicenseToken> {
    let payload_raw = serde_json::to_string(&claims)?;
    let signature = sign_token_payload(&payload_raw, secret);
    Ok(LicenseToken {
        payload: claims,
        payload_raw,
        signature,
    })
}

/// Signs serialized payload bytes: lowercase hex HMAC-SHA256.
#[must_use]
pub fn sign_token_payload(payload_raw: &str, secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC-SHA256 accepts keys of any length");
    mac.update(payload_raw.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a signature against the exact serialized payload bytes, in
/// constant time.
#[must_use]
pub fn verify_token_payload(payload_raw: &str, signature_hex: &str, secret: &str) -> bool {
    let expected = sign_token_payload(payload_raw, secret);
    expected.as_bytes().ct_eq(signature_hex.as_bytes()).into()
}
