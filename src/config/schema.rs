//! Configuration schema for Skycache
//!
//! Configuration is stored at `~/.config/skycache/config.toml`

use crate::cache::shared::{DocumentLayout, RetryPolicy};
use crate::config::ConfigManager;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Shared cache backend settings
    pub shared: SharedConfig,

    /// Local store settings
    pub local: LocalConfig,

    /// Per-user store settings
    pub users: UsersConfig,

    /// Default TTLs
    pub ttl: TtlConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Which backend serves the shared namespaces
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Durable versioned file table
    #[default]
    File,
    /// In-process versioned table, lost on exit
    Memory,
    /// Local file store without concurrency control
    Local,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::File => "file",
            Self::Memory => "memory",
            Self::Local => "local",
        };
        write!(f, "{}", name)
    }
}

/// Shared cache backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SharedConfig {
    /// Backend: "file", "memory" or "local"
    pub backend: BackendKind,

    /// Record layout: "single" or "per_namespace"
    pub layout: DocumentLayout,

    /// Directory for the file table (defaults to the state directory)
    pub table_dir: Option<PathBuf>,

    /// Conditional write attempts before giving up
    pub max_attempts: u32,

    /// Backoff after the first conflict, in milliseconds
    pub backoff_ms: u64,

    /// Upper bound for a single backoff, in milliseconds
    pub max_backoff_ms: u64,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::File,
            layout: DocumentLayout::Single,
            table_dir: None,
            max_attempts: 5,
            backoff_ms: 50,
            max_backoff_ms: 1000,
        }
    }
}

impl SharedConfig {
    /// Resolved file table directory
    pub fn table_dir(&self) -> PathBuf {
        self.table_dir
            .clone()
            .unwrap_or_else(|| ConfigManager::state_dir().join("shared"))
    }

    /// Retry policy for conflicting writes
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.backoff_ms),
            max_delay: Duration::from_millis(self.max_backoff_ms.max(self.backoff_ms)),
        }
    }
}

/// Local store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Cache directory (defaults to the state directory)
    pub dir: Option<PathBuf>,
}

impl LocalConfig {
    pub fn dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| ConfigManager::state_dir().join("local"))
    }
}

/// Per-user store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UsersConfig {
    /// Attribute directory (defaults to the state directory)
    pub dir: Option<PathBuf>,
}

impl UsersConfig {
    pub fn dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| ConfigManager::state_dir().join("users"))
    }
}

/// Default TTLs in seconds (0 = never expire)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtlConfig {
    pub location_secs: i64,
    pub station_secs: i64,
    pub zone_secs: i64,
    pub user_secs: i64,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            location_secs: 30 * 24 * 3600,
            station_secs: 7 * 24 * 3600,
            zone_secs: 7 * 24 * 3600,
            user_secs: 24 * 3600,
        }
    }
}
