//! Filesystem cache backend with TTL support
//!
//! One directory per namespace, one JSON file per entry:
//! `<root>/<namespace>/<id>.json` containing `{"cache_data": {...}, "ttl": 1700000000}`.
//! Writes overwrite unconditionally; this backend assumes a single process.
//! Each write lands in a private temp file that is renamed over the record,
//! so a concurrent reader sees either the old record or the new one.

use crate::cache::backend::CacheBackend;
use crate::cache::entry::{now_epoch, CacheEntry, Payload};
use crate::cache::key::{CacheKey, CacheNamespace};
use crate::error::{SkycacheError, SkycacheResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

/// On-disk record shape
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LocalRecord {
    cache_data: Payload,

    /// Absolute expiry in epoch seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ttl: Option<i64>,
}

impl From<CacheEntry> for LocalRecord {
    fn from(entry: CacheEntry) -> Self {
        Self {
            cache_data: entry.payload,
            ttl: entry.expiry,
        }
    }
}

impl From<LocalRecord> for CacheEntry {
    fn from(record: LocalRecord) -> Self {
        Self {
            payload: record.cache_data,
            expiry: record.ttl,
        }
    }
}

/// Local filesystem cache store
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Create a store rooted at `root`; directories are created on first write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of this store
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn namespace_dir(&self, namespace: CacheNamespace) -> PathBuf {
        self.root.join(namespace.as_str())
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.namespace_dir(key.namespace())
            .join(format!("{}.json", key.id()))
    }

    /// Read a record, treating unreadable or unparsable files as corrupt
    async fn read_entry(&self, path: &Path) -> SkycacheResult<Option<CacheEntry>> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SkycacheError::corrupt(path.display().to_string(), e.to_string())),
        };

        let record: LocalRecord = serde_json::from_str(&content)
            .map_err(|e| SkycacheError::corrupt(path.display().to_string(), e.to_string()))?;
        Ok(Some(record.into()))
    }

    async fn remove_file(&self, path: &Path) -> SkycacheResult<bool> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SkycacheError::io(
                format!("removing cache file {}", path.display()),
                e,
            )),
        }
    }
}

#[async_trait]
impl CacheBackend for LocalStore {
    async fn get(&self, key: &CacheKey) -> SkycacheResult<Option<Payload>> {
        let path = self.entry_path(key);

        let entry = match self.read_entry(&path).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                debug!("Local cache miss: {}", key);
                return Ok(None);
            }
            Err(e) => {
                warn!("Discarding unreadable cache record {}: {}", key, e);
                if let Err(e) = self.remove_file(&path).await {
                    warn!("Failed to delete corrupt cache record {}: {}", key, e);
                }
                return Ok(None);
            }
        };

        if entry.is_expired() {
            debug!("Local cache entry {} is expired", key);
            if let Err(e) = self.remove_file(&path).await {
                warn!("Failed to delete expired cache record {}: {}", key, e);
            }
            return Ok(None);
        }

        debug!("Local cache hit: {}", key);
        Ok(Some(entry.payload))
    }

    async fn put(&self, key: &CacheKey, payload: Payload, ttl_seconds: i64) -> SkycacheResult<()> {
        let dir = self.namespace_dir(key.namespace());
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| SkycacheError::io(format!("creating cache dir {}", dir.display()), e))?;

        let record = LocalRecord::from(CacheEntry::with_ttl(payload, ttl_seconds, now_epoch()));
        let content = serde_json::to_string_pretty(&record)?;

        let path = self.entry_path(key);
        let temp_path = dir.join(format!("{}.json.{}.tmp", key.id(), Uuid::new_v4().simple()));
        if let Err(e) = fs::write(&temp_path, content).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(SkycacheError::io(
                format!("writing cache file {}", temp_path.display()),
                e,
            ));
        }
        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(SkycacheError::io(
                format!("replacing cache file {}", path.display()),
                e,
            ));
        }

        debug!("Cached {} locally (expiry: {:?})", key, record.ttl);
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> SkycacheResult<()> {
        if self.remove_file(&self.entry_path(key)).await? {
            debug!("Removed local cache entry {}", key);
        }
        Ok(())
    }

    async fn purge_expired(&self) -> SkycacheResult<u64> {
        let now = now_epoch();
        let mut removed = 0;

        for namespace in CacheNamespace::all() {
            let dir = self.namespace_dir(*namespace);
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(SkycacheError::io(
                        format!("reading cache dir {}", dir.display()),
                        e,
                    ))
                }
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| SkycacheError::io("reading cache entry", e))?
            {
                let path = entry.path();
                if !path.extension().is_some_and(|ext| ext == "json") {
                    continue;
                }

                let stale = match self.read_entry(&path).await {
                    Ok(Some(entry)) => entry.is_expired_at(now),
                    Ok(None) => false,
                    Err(e) => {
                        warn!("Purging unreadable cache record: {}", e);
                        true
                    }
                };

                if stale && self.remove_file(&path).await? {
                    removed += 1;
                }
            }
        }

        debug!("Purged {} expired local cache entries", removed);
        Ok(removed)
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
