/// Configuration management for the session helper
///
/// Configuration is stored at: `$USER_HOME/.session-helper/config.json`.
/// Every field has a default, so a missing file (or a file naming only a few
/// fields) is valid.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default port of the IDE extension when no descriptor file is found
pub const DEFAULT_EXTENSION_PORT: u16 = 23983;

/// First port tried by the callback listener
pub const CALLBACK_PORT_START: u16 = 23984;

/// Name of the directory (under the home dir) holding config, history and request files
const BASE_DIR_NAME: &str = ".session-helper";

/// Name of the port descriptor directory (under the platform temp dir)
const PORT_DIR_NAME: &str = "uio-ports";

fn base_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(BASE_DIR_NAME)
}

fn default_port_dir() -> PathBuf {
    std::env::temp_dir().join(PORT_DIR_NAME)
}

fn default_port_file_suffix() -> String {
    ".port".to_string()
}

fn default_extension_port() -> u16 {
    DEFAULT_EXTENSION_PORT
}

fn default_callback_port_start() -> u16 {
    CALLBACK_PORT_START
}

fn default_callback_port_attempts() -> u16 {
    50
}

fn default_attempt_timeout_ms() -> u64 {
    5_000
}

fn default_requests_dir() -> PathBuf {
    base_dir().join("requests")
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_history_enabled() -> bool {
    true
}

fn default_history_db() -> PathBuf {
    base_dir().join("sessions.db")
}

/// Runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Directory scanned for peer port descriptor files
    #[serde(default = "default_port_dir")]
    pub port_dir: PathBuf,

    /// Filename suffix of port descriptor files
    #[serde(default = "default_port_file_suffix")]
    pub port_file_suffix: String,

    /// Port used when no descriptor is found
    #[serde(default = "default_extension_port")]
    pub default_extension_port: u16,

    /// First port tried by the callback listener (0 = let the OS choose)
    #[serde(default = "default_callback_port_start")]
    pub callback_port_start: u16,

    /// Number of consecutive ports tried by the callback listener
    #[serde(default = "default_callback_port_attempts")]
    pub callback_port_attempts: u16,

    /// Network timeout of a single candidate attempt, in milliseconds
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,

    /// Deadline for a dispatched request, in seconds (None = wait forever)
    #[serde(default)]
    pub dispatch_timeout_secs: Option<u64>,

    /// Root of the filesystem transport (`pending/` and `completed/` live here)
    #[serde(default = "default_requests_dir")]
    pub requests_dir: PathBuf,

    /// Poll interval of the filesystem transport, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Deadline of the filesystem transport, in seconds (0 = wait forever)
    #[serde(default)]
    pub collect_timeout_secs: u64,

    /// Whether request history and agent identities are persisted
    #[serde(default = "default_history_enabled")]
    pub history_enabled: bool,

    /// SQLite database path (or ":memory:")
    #[serde(default = "default_history_db")]
    pub history_db: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port_dir: default_port_dir(),
            port_file_suffix: default_port_file_suffix(),
            default_extension_port: default_extension_port(),
            callback_port_start: default_callback_port_start(),
            callback_port_attempts: default_callback_port_attempts(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
            dispatch_timeout_secs: None,
            requests_dir: default_requests_dir(),
            poll_interval_ms: default_poll_interval_ms(),
            collect_timeout_secs: 0,
            history_enabled: default_history_enabled(),
            history_db: default_history_db(),
        }
    }
}

impl Config {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    pub fn dispatch_timeout(&self) -> Option<Duration> {
        self.dispatch_timeout_secs.map(Duration::from_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn collect_timeout(&self) -> Option<Duration> {
        match self.collect_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn pending_dir(&self) -> PathBuf {
        self.requests_dir.join("pending")
    }

    pub fn completed_dir(&self) -> PathBuf {
        self.requests_dir.join("completed")
    }
}

/// Get the path to the config file
///
/// Returns: `$USER_HOME/.session-helper/config.json`
/// Respects `SESSION_HELPER_CONFIG_PATH` environment variable for testing.
pub fn get_config_path() -> PathBuf {
    if let Ok(path) = std::env::var("SESSION_HELPER_CONFIG_PATH") {
        return PathBuf::from(path);
    }
    base_dir().join("config.json")
}

/// Load configuration from `path`, falling back to defaults when the file is absent.
pub fn load_config_from(path: &Path) -> Result<Config, String> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;

    serde_json::from_str(&content)
        .map_err(|e| format!("Failed to parse config file {}: {}", path.display(), e))
}
