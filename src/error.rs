//! Error types for Skycache
//!
//! All modules use `SkycacheResult<T>` as their return type. A missing or
//! expired cache entry is never an error; lookups return `Ok(None)`.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Skycache operations
pub type SkycacheResult<T> = Result<T, SkycacheError>;

/// All errors that can occur in Skycache
#[derive(Error, Debug)]
pub enum SkycacheError {
    // Key and field errors
    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    #[error("Unknown namespace: {0}. Expected one of: location, station, zone")]
    UnknownNamespace(String),

    #[error("Unknown user field: {0}. Expected one of: location, rate, pitch, metrics")]
    UnknownField(String),

    #[error("Invalid value for user field {field}: {reason}")]
    InvalidField { field: String, reason: String },

    // Concurrency errors
    #[error("Conditional write rejected for {record}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        record: String,
        expected: u64,
        actual: u64,
    },

    #[error("Gave up writing {record} after {attempts} conflicting attempts")]
    ConcurrencyExhausted { record: String, attempts: u32 },

    // Storage errors
    #[error("Cache storage unavailable ({backend}): {reason}")]
    StorageUnavailable { backend: String, reason: String },

    #[error("Corrupt cache record at {location}: {reason}")]
    CorruptRecord { location: String, reason: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SkycacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a storage unavailable error for a backend
    pub fn storage(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StorageUnavailable {
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    /// Create a corrupt record error
    pub fn corrupt(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CorruptRecord {
            location: location.into(),
            reason: reason.into(),
        }
    }

    /// Check if error is retried internally by the optimistic write loop
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }

    /// Check if the caller may proceed without the cache
    ///
    /// These are the errors the cache facade absorbs: the request carries on
    /// with a freshly computed payload.
    pub fn is_fail_soft(&self) -> bool {
        matches!(
            self,
            Self::ConcurrencyConflict { .. }
                | Self::ConcurrencyExhausted { .. }
                | Self::StorageUnavailable { .. }
                | Self::CorruptRecord { .. }
                | Self::Io { .. }
                | Self::Json(_)
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::UnknownNamespace(_) => Some("Use one of: location, station, zone"),
            Self::UnknownField(_) => Some("Use one of: location, rate, pitch, metrics"),
            Self::ConcurrencyExhausted { .. } => {
                Some("Another writer is updating the shared cache; retry shortly")
            }
            Self::StorageUnavailable { .. } => {
                Some("Check shared.table_dir or set shared.backend = \"local\"")
            }
            Self::ConfigInvalid { .. } => Some("Run: skycache config init --force"),
            _ => None,
        }
    }
}
