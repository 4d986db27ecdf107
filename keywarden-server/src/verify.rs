//! The `/verify` orchestrator.
//!
//! One request walks the pipeline: authenticate → clock guard → static
//! deny-list → device resolution → blocklist → evaluate → clone check →
//! record → token → respond. Protocol and authentication failures
//! short-circuit before any store mutation; business denies (expired,
//! pending, blocked, clone) flow through the whole pipeline so the access
//! log captures them, and come back as HTTP 200 with `allow: false`.

use crate::client_ip::resolve_client_ip;
use crate::AppState;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use keywarden_core::{
    api_key_matches, check_skew, detect_clone, evaluate, issue_token, parse_client_timestamp,
    verify_request_signature, AccessLogEntry, ClientConfig, Device, DeviceStatus, Evaluation,
    LicenseClaims, LicenseToken, VerifyError,
};
use keywarden_store::StoreError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use tracing::{error, info, warn};

/// Query parameters of a verification request. Everything optional at the
/// extraction layer; required fields are enforced by the pipeline so the
/// missing-parameter rejection is ours, not the framework's.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct VerifyParams {
    id: Option<String>,
    version: Option<String>,
    ts: Option<String>,
    sig: Option<String>,
    api_key: Option<String>,
    hostname: Option<String>,
    username: Option<String>,
    osbuild: Option<String>,
    ram_total: Option<String>,
    ram_free: Option<String>,
    cpu_load: Option<String>,
    client_time: Option<String>,
}

/// Successful verification body: the decision plus everything the client
/// needs to run and to survive offline.
#[derive(Debug, Serialize)]
struct VerifyResponse {
    allow: bool,
    msg: String,
    config: ClientConfig,
    license_token: LicenseToken,
}

pub(crate) async fn verify_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(params): Query<VerifyParams>,
    headers: HeaderMap,
) -> Response {
    let client_ip = resolve_client_ip(&headers, Some(peer));
    match run_pipeline(&state, &params, &headers, &client_ip) {
        Ok(response) => response,
        Err(PipelineError::Reject(err)) => reject(&err),
        Err(PipelineError::Store(err)) => store_failure(&err),
    }
}

/// How a request leaves the pipeline early.
enum PipelineError {
    /// Protocol/auth rejection with its own status code.
    Reject(VerifyError),
    /// The backing store could not answer.
    Store(StoreError),
}

impl From<VerifyError> for PipelineError {
    fn from(err: VerifyError) -> Self {
        Self::Reject(err)
    }
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

fn run_pipeline(
    state: &AppState,
    params: &VerifyParams,
    headers: &HeaderMap,
    client_ip: &str,
) -> Result<Response, PipelineError> {
    let config = &state.config;
    let now = Utc::now();
    let today = now.date_naive();

    let device_id = required(params.id.as_deref())?;
    let version = required(params.version.as_deref())?;
    let ts = required(params.ts.as_deref())?;

    if config.require_api_key && !config.api_key.is_empty() {
        let from_query = params.api_key.as_deref().unwrap_or("");
        let from_header = header_str(headers, "x-api-key");
        if !api_key_matches(from_query, from_header, &config.api_key) {
            return Err(VerifyError::InvalidApiKey.into());
        }
    }

    let client_time = parse_client_timestamp(ts)?;
    check_skew(client_time, now, config.max_time_skew_secs)?;

    if config.require_signature && !config.shared_secret.is_empty() {
        let sig = params
            .sig
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(VerifyError::MissingSignature)?;
        if !verify_request_signature(device_id, version, ts, &config.shared_secret, sig) {
            return Err(VerifyError::InvalidSignature.into());
        }
    }

    if config.static_blocklist.iter().any(|id| id == device_id) {
        return Err(VerifyError::Blocklisted.into());
    }

    let mut device = match state.store.fetch_device(device_id)? {
        Some(device) => device,
        None if config.allow_auto_provision => state.store.auto_provision(device_id, today)?,
        None => return Err(VerifyError::UnknownDevice.into()),
    };

    if state.store.is_blocklisted(device_id)? {
        return Err(VerifyError::Blocklisted.into());
    }

    let mut evaluation = evaluate(&device, today);

    // Runs regardless of the evaluation outcome: a lapsed or pending
    // license used from several machines still gets blocked and reported.
    let hostname = params.hostname.as_deref().unwrap_or("");
    if config.enable_clone_detection {
        let recent =
            state
                .store
                .recent_allowed_accesses(device_id, config.clone_window_secs, now)?;
        let verdict = detect_clone(
            &recent,
            device.last_seen_ip.as_deref(),
            device.last_hostname.as_deref(),
            client_ip,
            hostname,
            config.max_simultaneous_ips,
        );
        if let Some(clone_msg) = verdict {
            warn!(device_id, ip = client_ip, "clone usage detected, blocking device");
            state.store.set_status(device_id, DeviceStatus::Blocked, now)?;
            device.status = DeviceStatus::Blocked;
            evaluation = evaluate(&device, today);
            evaluation.message = clone_msg;
        }
    }

    state
        .store
        .update_seen(device.id, client_ip, version, hostname, now)?;

    let entry = AccessLogEntry {
        device_id: device_id.to_string(),
        ip: client_ip.to_string(),
        user_agent: non_empty(header_str(headers, "user-agent")),
        hostname: params.hostname.clone(),
        client_version: Some(version.to_string()),
        telemetry_json: telemetry_blob(params),
        allowed: evaluation.allow,
        message: evaluation.message.clone(),
        created_at: now,
    };
    if let Err(err) = state.store.insert_access(&entry) {
        // Best-effort: the decision is already made, the caller still gets it
        warn!(device_id, error = %err, "failed to record access");
    }

    info!(
        device_id,
        allow = evaluation.allow,
        ip = client_ip,
        msg = %evaluation.message,
        "verification decided"
    );

    respond(&device, &evaluation, config.offline_grace_days, &config.shared_secret, now)
}

fn respond(
    device: &Device,
    evaluation: &Evaluation,
    offline_grace_days: u32,
    secret: &str,
    now: chrono::DateTime<Utc>,
) -> Result<Response, PipelineError> {
    let client_config = ClientConfig::for_device(device, evaluation.effective_end, offline_grace_days);

    let claims = LicenseClaims {
        device_id: device.device_id.clone(),
        expires_at: client_config.license_expires_at.clone(),
        features: client_config.features.clone(),
        issued_at: now.to_rfc3339(),
        license_type: device.license_type,
        status: device.status,
    };
    let license_token = issue_token(claims, secret)?;

    let body = VerifyResponse {
        allow: evaluation.allow,
        msg: evaluation.message.clone(),
        config: client_config,
        license_token,
    };
    Ok((StatusCode::OK, Json(body)).into_response())
}

fn reject(err: &VerifyError) -> Response {
    let status = StatusCode::from_u16(err.http_status())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = json!({ "allow": false, "msg": err.to_string() });
    (status, Json(body)).into_response()
}

fn store_failure(err: &StoreError) -> Response {
    if err.is_transient() {
        warn!(error = %err, "license store unavailable");
        let body = json!({ "error": "license backend unavailable" });
        (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
    } else {
        error!(error = %err, "license store failure");
        let body = json!({ "error": "internal error" });
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

/// A required parameter must be present and non-empty.
fn required(value: Option<&str>) -> Result<&str, VerifyError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(VerifyError::MissingParams)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Serializes whatever telemetry fields the client sent into one opaque
/// blob; returns `None` when it sent none.
fn telemetry_blob(params: &VerifyParams) -> Option<String> {
    let mut blob = serde_json::Map::new();
    let fields = [
        ("hostname", &params.hostname),
        ("username", &params.username),
        ("osbuild", &params.osbuild),
        ("ram_total", &params.ram_total),
        ("ram_free", &params.ram_free),
        ("cpu_load", &params.cpu_load),
        ("client_time", &params.client_time),
    ];
    for (key, value) in fields {
        if let Some(value) = value {
            blob.insert(key.to_string(), json!(value));
        }
    }
    if blob.is_empty() {
        None
    } else {
        Some(serde_json::Value::Object(blob).to_string())
    }
}
