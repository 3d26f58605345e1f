//! Versioned document tables with conditional writes
//!
//! A table stores whole `SharedCacheDocument` records under a record key and
//! accepts a write only when the stored version still matches the version
//! the writer read. A record that does not exist yet has version 0.

use crate::cache::entry::CacheEntry;
use crate::cache::key::CacheNamespace;
use crate::error::{SkycacheError, SkycacheResult};
use async_trait::async_trait;
use fs4::tokio::AsyncFileExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// Leaves of one namespace, keyed by canonical identifier
pub type NamespaceEntries = BTreeMap<String, CacheEntry>;

/// Aggregate record backing the shared namespaces
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SharedCacheDocument {
    /// namespace -> id -> entry
    #[serde(default)]
    pub attributes: BTreeMap<CacheNamespace, NamespaceEntries>,

    /// Incremented by exactly one on every successful write
    #[serde(default)]
    pub version: u64,
}

impl SharedCacheDocument {
    /// Look up a single leaf
    pub fn leaf(&self, namespace: CacheNamespace, id: &str) -> Option<&CacheEntry> {
        self.attributes.get(&namespace).and_then(|m| m.get(id))
    }

    /// Set a single leaf, leaving every other leaf untouched
    pub fn set_leaf(&mut self, namespace: CacheNamespace, id: &str, entry: CacheEntry) {
        self.attributes
            .entry(namespace)
            .or_default()
            .insert(id.to_string(), entry);
    }

    /// Remove a single leaf, returning whether it existed
    pub fn remove_leaf(&mut self, namespace: CacheNamespace, id: &str) -> bool {
        let Some(entries) = self.attributes.get_mut(&namespace) else {
            return false;
        };
        let removed = entries.remove(id).is_some();
        if entries.is_empty() {
            self.attributes.remove(&namespace);
        }
        removed
    }

    /// Remove all leaves expired at `now`, returning how many were dropped
    pub fn remove_expired(&mut self, now: i64) -> u64 {
        let mut removed = 0;
        for entries in self.attributes.values_mut() {
            let before = entries.len();
            entries.retain(|_, entry| !entry.is_expired_at(now));
            removed += (before - entries.len()) as u64;
        }
        self.attributes.retain(|_, entries| !entries.is_empty());
        removed
    }

    /// Total number of leaves across namespaces
    pub fn entry_count(&self) -> usize {
        self.attributes.values().map(BTreeMap::len).sum()
    }
}

/// Storage with single-record conditional writes
#[async_trait]
pub trait DocumentTable: Send + Sync {
    /// Point read of one record
    async fn get_item(&self, record_key: &str) -> SkycacheResult<Option<SharedCacheDocument>>;

    /// Replace a record only if its stored version equals `expected_version`
    ///
    /// Fails with `ConcurrencyConflict` when another writer got there first.
    async fn put_item_if_version(
        &self,
        record_key: &str,
        document: &SharedCacheDocument,
        expected_version: u64,
    ) -> SkycacheResult<()>;

    /// Human-readable table name
    fn name(&self) -> &'static str;
}

/// In-process table for tests and offline use
#[derive(Default)]
pub struct MemoryTable {
    records: Mutex<HashMap<String, SharedCacheDocument>>,
    writes: AtomicU64,
}

impl MemoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of conditional writes that were accepted
    pub fn successful_writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentTable for MemoryTable {
    async fn get_item(&self, record_key: &str) -> SkycacheResult<Option<SharedCacheDocument>> {
        Ok(self.records.lock().await.get(record_key).cloned())
    }

    async fn put_item_if_version(
        &self,
        record_key: &str,
        document: &SharedCacheDocument,
        expected_version: u64,
    ) -> SkycacheResult<()> {
        let mut records = self.records.lock().await;
        let actual = records.get(record_key).map_or(0, |d| d.version);
        if actual != expected_version {
            return Err(SkycacheError::ConcurrencyConflict {
                record: record_key.to_string(),
                expected: expected_version,
                actual,
            });
        }

        records.insert(record_key.to_string(), document.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Durable single-host table: one JSON file per record
///
/// The version check and the replacement run under an exclusive lock on a
/// sidecar `<record>.lock` file, and the record itself is swapped in by
/// atomic rename, so readers never see a half-written document.
///
/// Writers in this process queue on an async mutex first; the file lock only
/// arbitrates between processes and is acquired on the blocking pool.
pub struct FileTable {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileTable {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Create the table directory, failing if it cannot be used
    pub async fn open(dir: impl Into<PathBuf>) -> SkycacheResult<Self> {
        let table = Self::new(dir);
        fs::create_dir_all(&table.dir)
            .await
            .map_err(|e| SkycacheError::storage("file", format!("{}: {}", table.dir.display(), e)))?;
        Ok(table)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, record_key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", record_key))
    }

    fn lock_path(&self, record_key: &str) -> PathBuf {
        self.dir.join(format!("{}.lock", record_key))
    }

    fn unavailable(path: &Path, e: std::io::Error) -> SkycacheError {
        SkycacheError::storage("file", format!("{}: {}", path.display(), e))
    }

    /// Open the record's lock file and take an exclusive lock on it
    ///
    /// The lock is released when the returned file is dropped.
    async fn lock_record(&self, record_key: &str) -> SkycacheResult<fs::File> {
        let lock_path = self.lock_path(record_key);
        let lock = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .await
            .map_err(|e| Self::unavailable(&lock_path, e))?;

        // flock blocks the calling thread
        let locked = tokio::task::spawn_blocking(move || lock.lock_exclusive().map(|()| lock))
            .await
            .map_err(|e| SkycacheError::Internal(format!("lock task failed: {}", e)))?;
        locked.map_err(|e| Self::unavailable(&lock_path, e))
    }
}

#[async_trait]
impl DocumentTable for FileTable {
    async fn get_item(&self, record_key: &str) -> SkycacheResult<Option<SharedCacheDocument>> {
        let path = self.record_path(record_key);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Self::unavailable(&path, e)),
        };

        let document = serde_json::from_str(&content)
            .map_err(|e| SkycacheError::corrupt(path.display().to_string(), e.to_string()))?;
        Ok(Some(document))
    }

    async fn put_item_if_version(
        &self,
        record_key: &str,
        document: &SharedCacheDocument,
        expected_version: u64,
    ) -> SkycacheResult<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Self::unavailable(&self.dir, e))?;

        let _writer = self.write_lock.lock().await;
        // Held until the rename below has completed
        let lock = self.lock_record(record_key).await?;

        let actual = self
            .get_item(record_key)
            .await?
            .map_or(0, |stored| stored.version);
        if actual != expected_version {
            return Err(SkycacheError::ConcurrencyConflict {
                record: record_key.to_string(),
                expected: expected_version,
                actual,
            });
        }

        let content = serde_json::to_string_pretty(document)?;
        let path = self.record_path(record_key);
        let temp_path = path.with_extension("tmp");

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| Self::unavailable(&temp_path, e))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| Self::unavailable(&temp_path, e))?;
        file.sync_all()
            .await
            .map_err(|e| Self::unavailable(&temp_path, e))?;
        drop(file);

        fs::rename(&temp_path, &path)
            .await
            .map_err(|e| Self::unavailable(&path, e))?;

        debug!(
            "Wrote {} at version {} to {}",
            record_key,
            document.version,
            path.display()
        );
        drop(lock);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "file"
    }
}
