//! Cache namespaces and storage key canonicalization
//!
//! Identifiers are caller-supplied natural keys such as a normalized place
//! name or a station code. They are canonicalized before they are used as a
//! file name or a document leaf so every backend sees the same key.
//!
//! Distinct raw identifiers can collapse to the same canonical form
//! (`"Boulder, CO"` and `"boulder; co"` both become `"boulder_ co"`). Such
//! collisions are accepted: both callers share one cache entry.

use crate::error::{SkycacheError, SkycacheResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of shared resource a cache entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheNamespace {
    /// Geocoded place names
    Location,
    /// Weather observation station metadata
    Station,
    /// Forecast zone metadata
    Zone,
}

impl CacheNamespace {
    /// All namespaces in a stable order
    pub fn all() -> &'static [Self] {
        &[Self::Location, Self::Station, Self::Zone]
    }

    /// Lower-case name used in storage keys and file paths
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Location => "location",
            Self::Station => "station",
            Self::Zone => "zone",
        }
    }
}

impl fmt::Display for CacheNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CacheNamespace {
    type Err = SkycacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "location" => Ok(Self::Location),
            "station" => Ok(Self::Station),
            "zone" => Ok(Self::Zone),
            _ => Err(SkycacheError::UnknownNamespace(s.to_string())),
        }
    }
}

/// Canonicalize a raw identifier into its storage-safe form
///
/// Lower-cases, trims, and replaces every character outside
/// `[A-Za-z0-9 _-]` with `_`.
pub fn canonicalize(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// A (namespace, canonical identifier) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    namespace: CacheNamespace,
    id: String,
}

impl CacheKey {
    /// Build a key from a raw identifier
    pub fn new(namespace: CacheNamespace, raw_id: &str) -> SkycacheResult<Self> {
        let id = canonicalize(raw_id);
        if id.is_empty() {
            return Err(SkycacheError::InvalidKey(format!(
                "empty identifier in namespace {}",
                namespace
            )));
        }
        Ok(Self { namespace, id })
    }

    pub fn namespace(&self) -> CacheNamespace {
        self.namespace
    }

    /// Canonical identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// `<namespace>/<id>`, used for logging and local file layout
    pub fn storage_path(&self) -> String {
        format!("{}/{}", self.namespace, self.id)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.storage_path())
    }
}
