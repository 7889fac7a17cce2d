//! Configuration and data directory management.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default idle time before the reaper reclaims a session.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(600);
/// Default period between reaper sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Paths to all ChatBridge data files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// Credential bundle (`data/credentials.json`).
    pub credentials_file: PathBuf,
    /// API client configuration (`data/api-config.json`).
    pub api_config_file: PathBuf,
    /// Browser driver data (`data/browser-driver/`).
    pub browser_driver: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates directories if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let paths = Self {
            credentials_file: root.join("credentials.json"),
            api_config_file: root.join("api-config.json"),
            browser_driver: root.join("browser-driver"),
            root,
        };
        std::fs::create_dir_all(&paths.browser_driver)?;
        Ok(paths)
    }
}

/// Top-level ChatBridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// HTTP server port.
    pub port: u16,
    /// Data directory paths.
    pub data_paths: DataPaths,
    /// Idle time after which a session is reclaimed.
    pub session_ttl: Duration,
    /// Period of the reaper sweep.
    pub sweep_interval: Duration,
    /// Whether exhausted requests are handed to a human.
    pub relay_enabled: bool,
    /// Upper bound on a human relay wait. `None` waits until delivery or
    /// explicit cancellation.
    pub relay_timeout: Option<Duration>,
}

impl BridgeConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env(data_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let port = env_parse("PORT").unwrap_or(3010);
        let session_ttl = env_parse("CHATBRIDGE_SESSION_TTL_SECS")
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_SESSION_TTL);
        let sweep_interval = env_parse("CHATBRIDGE_SWEEP_INTERVAL_SECS")
            .filter(|s: &u64| *s > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_SWEEP_INTERVAL);
        let relay_enabled = std::env::var("CHATBRIDGE_RELAY_ENABLED")
            .map(|v| !matches!(v.to_lowercase().as_str(), "0" | "false" | "no" | "off"))
            .unwrap_or(true);
        let relay_timeout = env_parse("CHATBRIDGE_RELAY_TIMEOUT_SECS").map(Duration::from_secs);

        let data_paths = DataPaths::new(data_dir)?;

        Ok(Self {
            port,
            data_paths,
            session_ttl,
            sweep_interval,
            relay_enabled,
            relay_timeout,
        })
    }

    /// Defaults rooted at `data_dir`, ignoring the environment.
    pub fn with_defaults(data_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self {
            port: 3010,
            data_paths: DataPaths::new(data_dir)?,
            session_ttl: DEFAULT_SESSION_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            relay_enabled: true,
            relay_timeout: None,
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
