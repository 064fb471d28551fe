use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::transfer::RetryPolicy;
use crate::transfer::constants::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_ATTEMPTS, DEFAULT_READY_TIMEOUT, DEFAULT_RECEIVE_TIMEOUT,
    DEFAULT_RETRY_INTERVAL, MAX_PAYLOAD_SIZE,
};

const APP_QUALIFIER: &str = "com";
const APP_ORGANIZATION: &str = "peerdrop";
const APP_NAME: &str = "peerdrop";
const CONFIG_FILE: &str = "config.json";

/// Overrides the platform config directory (used by tests and portable installs)
pub const CONFIG_DIR_ENV: &str = "PEERDROP_CONFIG_DIR";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub download_path: PathBuf,
    pub handshake_interval_ms: u64,
    pub handshake_max_attempts: Option<u32>,
    pub handshake_deadline_ms: Option<u64>,
    pub ready_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub receive_timeout_ms: u64,
    pub max_payload_size: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        // ~/peerdrop on every platform
        let download_path = directories::UserDirs::new()
            .map(|dirs| dirs.home_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
            .join("peerdrop");

        Self {
            download_path,
            handshake_interval_ms: DEFAULT_RETRY_INTERVAL.as_millis() as u64,
            handshake_max_attempts: Some(DEFAULT_MAX_ATTEMPTS),
            handshake_deadline_ms: None,
            ready_timeout_ms: DEFAULT_READY_TIMEOUT.as_millis() as u64,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT.as_millis() as u64,
            receive_timeout_ms: DEFAULT_RECEIVE_TIMEOUT.as_millis() as u64,
            max_payload_size: MAX_PAYLOAD_SIZE,
        }
    }
}

/// Timeouts and limits an endpoint applies to every session it runs.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub retry: RetryPolicy,
    pub ready_timeout: Duration,
    pub connect_timeout: Duration,
    pub receive_timeout: Duration,
    pub max_payload_size: usize,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        AppConfig::default().endpoint_config()
    }
}

impl AppConfig {
    fn get_config_path() -> Option<PathBuf> {
        get_config_dir().map(|dir| dir.join(CONFIG_FILE))
    }

    /// Load config from disk or return default
    pub fn load() -> Self {
        match get_config_dir() {
            Some(dir) => Self::load_from(&dir),
            None => Self::default(),
        }
    }

    /// Load `config.json` from `dir`, falling back to defaults
    pub fn load_from(dir: &Path) -> Self {
        let path = dir.join(CONFIG_FILE);
        match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring malformed config {:?}: {}", path, e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save config to disk
    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::get_config_path()
            .ok_or_else(|| anyhow::anyhow!("No config directory available"))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            interval: Duration::from_millis(self.handshake_interval_ms.max(1)),
            max_attempts: self.handshake_max_attempts,
            deadline: self.handshake_deadline_ms.map(Duration::from_millis),
        }
    }

    pub fn endpoint_config(&self) -> EndpointConfig {
        EndpointConfig {
            retry: self.retry_policy(),
            ready_timeout: Duration::from_millis(self.ready_timeout_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            receive_timeout: Duration::from_millis(self.receive_timeout_ms),
            max_payload_size: self.max_payload_size,
        }
    }
}

/// Get the config directory path for this app
pub fn get_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        return Some(PathBuf::from(dir));
    }

    ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
        .map(|dirs| dirs.config_dir().to_path_buf())
}
