//! Configuration module for the check-in terminal.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Configuration loading error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// How a scan of an already-ledgered team is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Drop the scan locally without asking the registry.
    Reject,
    /// Always re-resolve so the latest attendance and food flags are visible.
    Refresh,
}

impl FromStr for DuplicatePolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(DuplicatePolicy::Reject),
            "refresh" => Ok(DuplicatePolicy::Refresh),
            _ => Err(()),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Registry base URL, e.g. `https://host/api/scanner`
    pub registry_url: String,
    /// Timeout for a single registry request
    pub registry_timeout: Duration,
    /// Path to the SQLite ledger file
    pub ledger_path: PathBuf,
    /// Storage namespace the ledger rows live under
    pub ledger_namespace: String,
    /// Duplicate-scan handling
    pub duplicate_policy: DuplicatePolicy,
    /// Guard delay before the camera accepts frames again after a failed resolve
    pub rearm_delay: Duration,
    /// Re-arm the camera automatically after a completed commit
    pub auto_rearm: bool,
    /// Address to bind the operator API to
    pub bind_addr: SocketAddr,
    /// Pre-shared operator key (auth disabled when unset)
    pub operator_key: Option<String>,
    /// Remote lock status endpoint (watchdog disabled when unset)
    pub lock_status_url: Option<String>,
    /// App id reported to the lock status endpoint
    pub app_id: String,
    /// Lock status poll interval
    pub lock_poll: Duration,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let registry_url = env::var("CHECKIN_REGISTRY_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:5000/api/scanner".to_string());
        if reqwest::Url::parse(&registry_url).is_err() {
            return Err(ConfigError::Invalid {
                name: "CHECKIN_REGISTRY_URL",
                value: registry_url,
            });
        }

        let ledger_path = env::var("CHECKIN_LEDGER_PATH")
            .unwrap_or_else(|_| "./data/ledger.sqlite".to_string())
            .into();

        let ledger_namespace =
            env::var("CHECKIN_LEDGER_NAMESPACE").unwrap_or_else(|_| "scanned_teams".to_string());

        let duplicate_policy = parse_var("CHECKIN_DUPLICATE_POLICY", DuplicatePolicy::Refresh)?;

        let bind_addr = parse_var("CHECKIN_BIND_ADDR", SocketAddr::from(([127, 0, 0, 1], 8080)))?;

        let lock_status_url = env::var("CHECKIN_LOCK_STATUS_URL")
            .ok()
            .filter(|s| !s.trim().is_empty());

        Ok(Self {
            registry_url,
            registry_timeout: Duration::from_millis(parse_var("CHECKIN_REGISTRY_TIMEOUT_MS", 10_000)?),
            ledger_path,
            ledger_namespace,
            duplicate_policy,
            rearm_delay: Duration::from_millis(parse_var("CHECKIN_REARM_DELAY_MS", 300)?),
            auto_rearm: parse_var("CHECKIN_AUTO_REARM", false)?,
            bind_addr,
            operator_key: env::var("CHECKIN_OPERATOR_KEY").ok(),
            lock_status_url,
            app_id: env::var("CHECKIN_APP_ID").unwrap_or_else(|_| "checkin-terminal".to_string()),
            lock_poll: Duration::from_millis(parse_var("CHECKIN_LOCK_POLL_MS", 1500)?),
            log_level: env::var("CHECKIN_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}
