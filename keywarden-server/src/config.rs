//! Process configuration, loaded once from the environment at startup.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Immutable service configuration. Constructed once and passed explicitly
/// into every component that needs it; there is no runtime mutation path.
#[derive(Debug, Clone)]
pub struct Config {
    /// Expected API key; empty disables the check even when required.
    pub api_key: String,
    /// Shared secret for request digests and token signatures; empty
    /// disables signature enforcement even when required.
    pub shared_secret: String,
    /// Maximum client/server clock difference, seconds.
    pub max_time_skew_secs: i64,
    /// Enforce the request signature check.
    pub require_signature: bool,
    /// Enforce the API key check.
    pub require_api_key: bool,
    /// Create pending device records on first sight of an unknown id.
    pub allow_auto_provision: bool,
    /// Run the clone-usage heuristic.
    pub enable_clone_detection: bool,
    /// Distinct origins allowed inside the detection window.
    pub max_simultaneous_ips: usize,
    /// Clone detection trailing window, seconds.
    pub clone_window_secs: i64,
    /// Days a client may trust a cached token while offline.
    pub offline_grace_days: u32,
    /// Device ids denied before any store access.
    pub static_blocklist: Vec<String>,
    /// SQLite database path.
    pub db_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            shared_secret: String::new(),
            max_time_skew_secs: 14_400,
            require_signature: true,
            require_api_key: true,
            allow_auto_provision: false,
            enable_clone_detection: true,
            max_simultaneous_ips: 1,
            clone_window_secs: 300,
            offline_grace_days: 7,
            static_blocklist: Vec::new(),
            db_path: PathBuf::from("keywarden.db"),
        }
    }
}

impl Config {
    /// Reads the configuration surface from environment variables,
    /// falling back to the defaults above for unset or unparsable values.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: env_string("API_KEY", &defaults.api_key),
            shared_secret: env_string("SHARED_SECRET", &defaults.shared_secret),
            max_time_skew_secs: env_parse("MAX_TIME_SKEW", defaults.max_time_skew_secs),
            require_signature: env_bool("REQUIRE_SIGNATURE", defaults.require_signature),
            require_api_key: env_bool("REQUIRE_API_KEY", defaults.require_api_key),
            allow_auto_provision: env_bool("ALLOW_AUTO_PROVISION", defaults.allow_auto_provision),
            enable_clone_detection: env_bool(
                "ENABLE_CLONE_DETECTION",
                defaults.enable_clone_detection,
            ),
            max_simultaneous_ips: env_parse("MAX_SIMULTANEOUS_IPS", defaults.max_simultaneous_ips),
            clone_window_secs: env_parse("CLONE_DETECTION_WINDOW", defaults.clone_window_secs),
            offline_grace_days: env_parse(
                "OFFLINE_GRACE_PERIOD_DAYS",
                defaults.offline_grace_days,
            ),
            static_blocklist: env_csv("STATIC_BLOCKLIST"),
            db_path: PathBuf::from(env_string(
                "DB_PATH",
                &defaults.db_path.to_string_lossy(),
            )),
        }
    }
}

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_bool(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(value) => value.to_ascii_lowercase() == "true",
        Err(_) => default,
    }
}

fn env_parse<T: FromStr + Copy>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

fn env_csv(name: &str) -> Vec<String> {
    env::var(name)
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
