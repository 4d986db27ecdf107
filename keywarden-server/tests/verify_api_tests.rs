use chrono::{Duration, NaiveDate, Utc};
use keywarden_core::{
    end_date_for, request_digest, verify_token_payload, AccessLogEntry, Device, DeviceStatus,
    LicenseType,
};
use keywarden_server::config::Config;
use keywarden_server::{build_router, AppState};
use keywarden_store::LicenseStore;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;

const API_KEY: &str = "test-api-key";
const SECRET: &str = "test-shared-secret";

fn test_config() -> Config {
    Config {
        api_key: API_KEY.to_string(),
        shared_secret: SECRET.to_string(),
        ..Config::default()
    }
}

/// Spin up the service on an OS-assigned port over the given store,
/// returning the base URL.
async fn spawn_server(config: Config, store: LicenseStore) -> String {
    let state = AppState {
        config: Arc::new(config),
        store,
    };
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    format!("http://127.0.0.1:{}", port)
}

/// A correctly signed query for `device_id` with a fresh timestamp.
fn signed_query(device_id: &str, version: &str) -> Vec<(String, String)> {
    let ts = Utc::now().format("%Y%m%d%H%M%S").to_string();
    let sig = request_digest(device_id, version, &ts, SECRET);
    vec![
        ("id".to_string(), device_id.to_string()),
        ("version".to_string(), version.to_string()),
        ("ts".to_string(), ts),
        ("sig".to_string(), sig),
        ("api_key".to_string(), API_KEY.to_string()),
    ]
}

fn seed_device(
    store: &LicenseStore,
    device_id: &str,
    license_type: LicenseType,
    status: DeviceStatus,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
) {
    let device = Device {
        id: 0,
        device_id: device_id.to_string(),
        owner_name: None,
        email: None,
        license_type,
        status,
        start_date,
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
    };
    store.insert_device(&device).unwrap();
}

async fn get_verify(base: &str, query: &[(String, String)]) -> reqwest::Response {
    reqwest::Client::new()
        .get(format!("{}/verify", base))
        .query(query)
        .send()
        .await
        .unwrap()
}

// ── End-to-end scenarios ─────────────────────────────────────────

#[tokio::test]
async fn unknown_device_is_auto_provisioned_pending() {
    let store = LicenseStore::open_in_memory().unwrap();
    let config = Config {
        allow_auto_provision: true,
        ..test_config()
    };
    let base = spawn_server(config, store.clone()).await;

    let resp = get_verify(&base, &signed_query("new-device", "1.0.0")).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["allow"], false);
    assert!(
        body["msg"].as_str().unwrap().contains("awaiting approval"),
        "got: {}",
        body["msg"]
    );

    let device = store.fetch_device("new-device").unwrap().expect("provisioned");
    assert_eq!(device.status, DeviceStatus::Pending);
    assert_eq!(device.license_type, LicenseType::Monthly);
}

#[tokio::test]
async fn active_annual_device_without_end_date_is_allowed() {
    let store = LicenseStore::open_in_memory().unwrap();
    let start = Utc::now().date_naive() - Duration::days(30);
    seed_device(
        &store,
        "annual-dev",
        LicenseType::Annual,
        DeviceStatus::Active,
        start,
        None,
    );
    let base = spawn_server(test_config(), store.clone()).await;

    let resp = get_verify(&base, &signed_query("annual-dev", "2.1.0")).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["allow"], true);
    assert_eq!(body["msg"], "License active.");

    // The end date self-heals from start_date + license period
    let expected_end = end_date_for(LicenseType::Annual, start).unwrap();
    assert_eq!(
        body["config"]["license_expires_at"],
        expected_end.format("%Y-%m-%d").to_string()
    );
}

#[tokio::test]
async fn blocklisted_device_is_rejected_regardless_of_status() {
    let store = LicenseStore::open_in_memory().unwrap();
    seed_device(
        &store,
        "blocked-dev",
        LicenseType::Lifetime,
        DeviceStatus::Active,
        Utc::now().date_naive(),
        None,
    );
    store.add_to_blocklist("blocked-dev", Some("chargeback")).unwrap();
    let base = spawn_server(test_config(), store).await;

    let resp = get_verify(&base, &signed_query("blocked-dev", "1.0.0")).await;
    assert_eq!(resp.status(), 403);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["allow"], false);
    assert_eq!(body["msg"], "Device blocked.");
}

#[tokio::test]
async fn second_call_from_a_new_ip_is_flagged_and_blocked() {
    let store = LicenseStore::open_in_memory().unwrap();
    seed_device(
        &store,
        "cloned-dev",
        LicenseType::Lifetime,
        DeviceStatus::Active,
        Utc::now().date_naive(),
        None,
    );
    let base = spawn_server(test_config(), store.clone()).await;
    let client = reqwest::Client::new();

    let first = client
        .get(format!("{}/verify", base))
        .query(&signed_query("cloned-dev", "1.0.0"))
        .header("x-forwarded-for", "1.2.3.4")
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), 200);
    let first_body: Value = first.json().await.unwrap();
    assert_eq!(first_body["allow"], true);

    let second = client
        .get(format!("{}/verify", base))
        .query(&signed_query("cloned-dev", "1.0.0"))
        .header("x-forwarded-for", "5.6.7.8")
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), 200);
    let second_body: Value = second.json().await.unwrap();
    assert_eq!(second_body["allow"], false);
    assert!(
        second_body["msg"].as_str().unwrap().contains("cloning"),
        "got: {}",
        second_body["msg"]
    );

    let device = store.fetch_device("cloned-dev").unwrap().unwrap();
    assert_eq!(device.status, DeviceStatus::Blocked);
}

#[tokio::test]
async fn clone_detection_still_blocks_a_denied_device() {
    let store = LicenseStore::open_in_memory().unwrap();
    let start = Utc::now().date_naive() - Duration::days(400);
    seed_device(
        &store,
        "lapsed-dev",
        LicenseType::Monthly,
        DeviceStatus::Active,
        start,
        Some(start + Duration::days(30)),
    );
    // Two allowed accesses from one machine inside the window
    for _ in 0..2 {
        store
            .insert_access(&AccessLogEntry {
                device_id: "lapsed-dev".to_string(),
                ip: "5.6.7.8".to_string(),
                user_agent: None,
                hostname: Some("host-b".to_string()),
                client_version: Some("1.0.0".to_string()),
                telemetry_json: None,
                allowed: true,
                message: "License active.".to_string(),
                created_at: Utc::now(),
            })
            .unwrap();
    }
    let base = spawn_server(test_config(), store.clone()).await;

    // An expired license farmed from a second machine is still cloning
    let resp = reqwest::Client::new()
        .get(format!("{}/verify", base))
        .query(&signed_query("lapsed-dev", "1.0.0"))
        .header("x-forwarded-for", "9.9.9.9")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["allow"], false);
    assert!(
        body["msg"].as_str().unwrap().contains("cloning"),
        "got: {}",
        body["msg"]
    );

    let device = store.fetch_device("lapsed-dev").unwrap().unwrap();
    assert_eq!(device.status, DeviceStatus::Blocked);
}

// ── Protocol and authentication rejections ───────────────────────

#[tokio::test]
async fn missing_required_params_is_a_400() {
    let store = LicenseStore::open_in_memory().unwrap();
    let base = spawn_server(test_config(), store).await;

    let query = vec![("api_key".to_string(), API_KEY.to_string())];
    let resp = get_verify(&base, &query).await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["allow"], false);
    assert_eq!(body["msg"], "Missing parameters.");
}

#[tokio::test]
async fn malformed_timestamp_is_a_400() {
    let store = LicenseStore::open_in_memory().unwrap();
    let base = spawn_server(test_config(), store).await;

    let mut query = signed_query("dev1", "1.0.0");
    query[2] = ("ts".to_string(), "20240101".to_string());
    let resp = get_verify(&base, &query).await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(
        body["msg"].as_str().unwrap().contains("Invalid timestamp"),
        "got: {}",
        body["msg"]
    );
}

#[tokio::test]
async fn excessive_clock_skew_is_a_400() {
    let store = LicenseStore::open_in_memory().unwrap();
    let base = spawn_server(test_config(), store).await;

    // Default maximum skew is 4 hours; sign a timestamp 5 hours old
    let ts = (Utc::now() - Duration::hours(5))
        .format("%Y%m%d%H%M%S")
        .to_string();
    let sig = request_digest("dev1", "1.0.0", &ts, SECRET);
    let query = vec![
        ("id".to_string(), "dev1".to_string()),
        ("version".to_string(), "1.0.0".to_string()),
        ("ts".to_string(), ts),
        ("sig".to_string(), sig),
        ("api_key".to_string(), API_KEY.to_string()),
    ];
    let resp = get_verify(&base, &query).await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(
        body["msg"].as_str().unwrap().contains("Clock out of sync"),
        "got: {}",
        body["msg"]
    );
}

#[tokio::test]
async fn wrong_api_key_is_a_403() {
    let store = LicenseStore::open_in_memory().unwrap();
    let base = spawn_server(test_config(), store).await;

    let mut query = signed_query("dev1", "1.0.0");
    query[4] = ("api_key".to_string(), "wrong".to_string());
    let resp = get_verify(&base, &query).await;
    assert_eq!(resp.status(), 403);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["msg"], "Invalid API key.");
}

#[tokio::test]
async fn api_key_is_accepted_from_the_header() {
    let store = LicenseStore::open_in_memory().unwrap();
    seed_device(
        &store,
        "header-dev",
        LicenseType::Lifetime,
        DeviceStatus::Active,
        Utc::now().date_naive(),
        None,
    );
    let base = spawn_server(test_config(), store).await;

    let mut query = signed_query("header-dev", "1.0.0");
    query.remove(4); // drop the api_key query parameter
    let resp = reqwest::Client::new()
        .get(format!("{}/verify", base))
        .query(&query)
        .header("x-api-key", API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn missing_signature_is_a_403() {
    let store = LicenseStore::open_in_memory().unwrap();
    let base = spawn_server(test_config(), store).await;

    let mut query = signed_query("dev1", "1.0.0");
    query.remove(3); // drop sig
    let resp = get_verify(&base, &query).await;
    assert_eq!(resp.status(), 403);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["msg"], "Missing signature.");
}

#[tokio::test]
async fn tampered_signature_is_a_403() {
    let store = LicenseStore::open_in_memory().unwrap();
    let base = spawn_server(test_config(), store).await;

    let mut query = signed_query("dev1", "1.0.0");
    query[3] = ("sig".to_string(), "0".repeat(64));
    let resp = get_verify(&base, &query).await;
    assert_eq!(resp.status(), 403);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["msg"], "Invalid signature.");
}

#[tokio::test]
async fn unregistered_device_without_auto_provision_is_a_403() {
    let store = LicenseStore::open_in_memory().unwrap();
    let base = spawn_server(test_config(), store.clone()).await;

    let resp = get_verify(&base, &signed_query("nobody", "1.0.0")).await;
    assert_eq!(resp.status(), 403);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["msg"], "Device not registered.");
    assert!(store.fetch_device("nobody").unwrap().is_none());
}

#[tokio::test]
async fn static_blocklist_denies_before_the_store() {
    let store = LicenseStore::open_in_memory().unwrap();
    let config = Config {
        static_blocklist: vec!["banned-dev".to_string()],
        ..test_config()
    };
    let base = spawn_server(config, store).await;

    let resp = get_verify(&base, &signed_query("banned-dev", "1.0.0")).await;
    assert_eq!(resp.status(), 403);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["msg"], "Device blocked.");
}

// ── Business denies are 200s ─────────────────────────────────────

#[tokio::test]
async fn expired_license_is_a_200_deny() {
    let store = LicenseStore::open_in_memory().unwrap();
    let start = Utc::now().date_naive() - Duration::days(400);
    let end = start + Duration::days(30);
    seed_device(
        &store,
        "expired-dev",
        LicenseType::Monthly,
        DeviceStatus::Active,
        start,
        Some(end),
    );
    let base = spawn_server(test_config(), store).await;

    let resp = get_verify(&base, &signed_query("expired-dev", "1.0.0")).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["allow"], false);
    assert!(
        body["msg"].as_str().unwrap().contains("expired on"),
        "got: {}",
        body["msg"]
    );
}

// ── Token and config payload ─────────────────────────────────────

#[tokio::test]
async fn allowed_response_carries_a_verifiable_token() {
    let store = LicenseStore::open_in_memory().unwrap();
    seed_device(
        &store,
        "token-dev",
        LicenseType::Lifetime,
        DeviceStatus::Active,
        Utc::now().date_naive(),
        None,
    );
    let base = spawn_server(test_config(), store).await;

    let resp = get_verify(&base, &signed_query("token-dev", "3.0.1")).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["allow"], true);

    let payload_raw = body["license_token"]["payload_raw"].as_str().unwrap();
    let signature = body["license_token"]["signature"].as_str().unwrap();
    assert!(verify_token_payload(payload_raw, signature, SECRET));
    assert!(payload_raw.contains("\"device_id\":\"token-dev\""));

    assert_eq!(body["config"]["interval"], 30);
    assert_eq!(body["config"]["features"], serde_json::json!(["core"]));
    assert_eq!(body["config"]["offline_grace_days"], 7);
    assert_eq!(body["config"]["license_expires_at"], Value::Null);
}

#[tokio::test]
async fn telemetry_is_recorded_in_the_access_log() {
    let store = LicenseStore::open_in_memory().unwrap();
    seed_device(
        &store,
        "telemetry-dev",
        LicenseType::Lifetime,
        DeviceStatus::Active,
        Utc::now().date_naive(),
        None,
    );
    let base = spawn_server(test_config(), store.clone()).await;

    let mut query = signed_query("telemetry-dev", "1.4.2");
    query.push(("hostname".to_string(), "WORKSTATION-7".to_string()));
    query.push(("osbuild".to_string(), "22631".to_string()));
    let resp = reqwest::Client::new()
        .get(format!("{}/verify", base))
        .query(&query)
        .header("x-forwarded-for", "10.0.0.42")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let entries = store
        .recent_allowed_accesses("telemetry-dev", 300, Utc::now())
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].ip, "10.0.0.42");
    assert_eq!(entries[0].client_version.as_deref(), Some("1.4.2"));
    assert_eq!(entries[0].hostname.as_deref(), Some("WORKSTATION-7"));
    let telemetry = entries[0].telemetry_json.as_deref().unwrap();
    assert!(telemetry.contains("\"osbuild\":\"22631\""));

    let device = store.fetch_device("telemetry-dev").unwrap().unwrap();
    assert_eq!(device.last_seen_ip.as_deref(), Some("10.0.0.42"));
    assert_eq!(device.last_version.as_deref(), Some("1.4.2"));
}

#[tokio::test]
async fn access_log_failure_does_not_change_the_decision() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("licenses.db");
    let store = LicenseStore::open(&db_path).unwrap();
    seed_device(
        &store,
        "resilient-dev",
        LicenseType::Lifetime,
        DeviceStatus::Active,
        Utc::now().date_naive(),
        None,
    );
    // Break the log table out from under the service; clone detection is
    // off so the only access_logs use is the best-effort insert
    let raw = rusqlite::Connection::open(&db_path).unwrap();
    raw.execute_batch("DROP TABLE access_logs;").unwrap();
    let config = Config {
        enable_clone_detection: false,
        ..test_config()
    };
    let base = spawn_server(config, store).await;

    let resp = get_verify(&base, &signed_query("resilient-dev", "1.0.0")).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["allow"], true);
}

#[tokio::test]
async fn store_outage_is_a_503_not_a_deny() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("licenses.db");
    let store = LicenseStore::open(&db_path).unwrap();
    seed_device(
        &store,
        "outage-dev",
        LicenseType::Lifetime,
        DeviceStatus::Active,
        Utc::now().date_naive(),
        None,
    );
    let base = spawn_server(test_config(), store).await;

    // Hold an exclusive lock so the service's reads time out as busy
    let raw = rusqlite::Connection::open(&db_path).unwrap();
    raw.execute_batch("BEGIN EXCLUSIVE;").unwrap();

    let resp = get_verify(&base, &signed_query("outage-dev", "1.0.0")).await;
    assert_eq!(resp.status(), 503);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "license backend unavailable");
    assert!(body.get("allow").is_none(), "outage must not read as a deny");
}

// ── Service surface ──────────────────────────────────────────────

#[tokio::test]
async fn health_endpoint_returns_ok() {
    let store = LicenseStore::open_in_memory().unwrap();
    let base = spawn_server(test_config(), store).await;

    let resp = reqwest::get(format!("{}/health", base)).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let store = LicenseStore::open_in_memory().unwrap();
    let base = spawn_server(test_config(), store).await;

    let resp = reqwest::get(format!("{}/admin", base)).await.unwrap();
    assert_eq!(resp.status(), 404);
}
