//! License verification decision logic for Keywarden.
//!
//! This crate holds everything the verification endpoint needs to decide
//! whether an installation may run, without performing any I/O:
//!
//! - Request authentication (API key, timestamp skew guard, legacy request
//!   digest verification)
//! - License evaluation with calendar interval arithmetic
//! - Clone-usage detection heuristic
//! - Signed, client-cacheable license tokens
//! - The client configuration payload returned alongside a decision
//!
//! # Design Principles
//!
//! - **Pure decisions**: every function here is a function of its inputs;
//!   storage and clock access live in the caller
//! - **Wire compatibility**: the request digest and token signature schemes
//!   are frozen — deployed clients compute them byte-for-byte
//! - **Explicit configuration**: secrets and policy knobs are passed in,
//!   never read from ambient globals

mod access;
mod auth;
mod client_config;
mod clone;
mod device;
mod error;
mod evaluate;
mod period;
mod token;

pub use access::AccessLogEntry;
pub use auth::{api_key_matches, check_skew, parse_client_timestamp, request_digest, verify_request_signature};
pub use client_config::{ClientConfig, UpdateInfo, DEFAULT_INTERVAL_MINUTES, MIN_INTERVAL_MINUTES};
pub use clone::detect_clone;
pub use device::{Device, DeviceStatus, LicenseType};
pub use error::{VerifyError, VerifyResult};
pub use evaluate::{evaluate, Evaluation};
pub use period::end_date_for;
pub use token::{issue_token, sign_token_payload, verify_token_payload, LicenseClaims, LicenseToken};
