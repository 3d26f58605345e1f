//! Shared cache backend with optimistic concurrency
//!
//! Every write is a read-modify-write of one versioned document:
//!
//! 1. Read the record and remember its version `v` (absent = 0).
//! 2. Apply the change to the single (namespace, id) leaf being written.
//! 3. Write the record as version `v + 1`, conditioned on the stored version
//!    still being `v`.
//! 4. On a version conflict, back off and start again from step 1 against the
//!    fresh document, so a concurrent writer's leaf is carried forward.
//!
//! No lock is held across attempts. Each attempt is one atomic conditional
//! write, so an abandoned writer never leaves a partial update behind.

use crate::cache::backend::CacheBackend;
use crate::cache::entry::{now_epoch, CacheEntry, Payload};
use crate::cache::key::{CacheKey, CacheNamespace};
use crate::cache::table::{DocumentTable, SharedCacheDocument};
use crate::error::{SkycacheError, SkycacheResult};
use async_trait::async_trait;
use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Record key used when all namespaces share one document
pub const SHARED_RECORD_KEY: &str = "shared-cache";

/// How shared namespaces map onto versioned records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentLayout {
    /// One record holds every namespace
    #[default]
    Single,
    /// One record per namespace, so unrelated namespaces never contend
    PerNamespace,
}

impl DocumentLayout {
    /// Record key holding `namespace`
    pub fn record_key(&self, namespace: CacheNamespace) -> String {
        match self {
            Self::Single => SHARED_RECORD_KEY.to_string(),
            Self::PerNamespace => format!("{}-{}", SHARED_RECORD_KEY, namespace),
        }
    }

    /// Every record key this layout can produce
    pub fn record_keys(&self) -> Vec<String> {
        match self {
            Self::Single => vec![SHARED_RECORD_KEY.to_string()],
            Self::PerNamespace => CacheNamespace::all()
                .iter()
                .map(|ns| self.record_key(*ns))
                .collect(),
        }
    }
}

/// Bounded retry with exponential backoff for conflicting writes
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total conditional write attempts before giving up
    pub max_attempts: u32,
    /// Delay after the first conflict
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after `attempt` (1-based) conflicted
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Cache backend over a versioned document table
pub struct SharedCache {
    table: Arc<dyn DocumentTable>,
    layout: DocumentLayout,
    retry: RetryPolicy,
    writer_id: Uuid,
}

impl SharedCache {
    /// Create a shared cache with the default layout and retry policy
    pub fn new(table: Arc<dyn DocumentTable>) -> Self {
        Self::with_policy(table, DocumentLayout::default(), RetryPolicy::default())
    }

    /// Create a shared cache; a policy of zero attempts still makes one
    pub fn with_policy(
        table: Arc<dyn DocumentTable>,
        layout: DocumentLayout,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            table,
            layout,
            retry: RetryPolicy {
                max_attempts: retry.max_attempts.max(1),
                ..retry
            },
            writer_id: Uuid::new_v4(),
        }
    }

    pub fn layout(&self) -> DocumentLayout {
        self.layout
    }

    /// Read every record of this cache, skipping records never written
    pub async fn documents(&self) -> SkycacheResult<Vec<(String, SharedCacheDocument)>> {
        let mut documents = Vec::new();
        for record_key in self.layout.record_keys() {
            if let Some(document) = self.table.get_item(&record_key).await? {
                documents.push((record_key, document));
            }
        }
        Ok(documents)
    }

    /// Apply `mutate` to a record under the optimistic write protocol
    ///
    /// `mutate` runs against a freshly read document on every attempt and
    /// returns `false` when there is nothing to write. Returns the committed
    /// version, or `None` when nothing was written.
    async fn update<F>(&self, record_key: &str, mut mutate: F) -> SkycacheResult<Option<u64>>
    where
        F: FnMut(&mut SharedCacheDocument) -> bool + Send,
    {
        for attempt in 1..=self.retry.max_attempts {
            let mut document = self.table.get_item(record_key).await?.unwrap_or_default();
            let base_version = document.version;

            if !mutate(&mut document) {
                return Ok(None);
            }
            document.version = base_version + 1;

            match self
                .table
                .put_item_if_version(record_key, &document, base_version)
                .await
            {
                Ok(()) => {
                    debug!(
                        writer = %self.writer_id,
                        "Committed {} at version {} (attempt {})",
                        record_key, document.version, attempt
                    );
                    return Ok(Some(document.version));
                }
                Err(e) if e.is_retryable() => {
                    if attempt == self.retry.max_attempts {
                        break;
                    }
                    let delay = self.retry.backoff(attempt);
                    debug!(
                        writer = %self.writer_id,
                        "Version conflict on {} (attempt {}/{}): {}. Retrying in {:?}",
                        record_key, attempt, self.retry.max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(SkycacheError::ConcurrencyExhausted {
            record: record_key.to_string(),
            attempts: self.retry.max_attempts,
        })
    }
}

#[async_trait]
impl CacheBackend for SharedCache {
    /// Read a leaf without writing; expired leaves read as absent and are
    /// reclaimed by `purge_expired`, `remove` or an overwrite
    async fn get(&self, key: &CacheKey) -> SkycacheResult<Option<Payload>> {
        let record_key = self.layout.record_key(key.namespace());
        let Some(document) = self.table.get_item(&record_key).await? else {
            debug!("Shared cache miss: {} (no document)", key);
            return Ok(None);
        };

        match document.leaf(key.namespace(), key.id()) {
            Some(entry) if !entry.is_expired() => {
                debug!("Shared cache hit: {} (version {})", key, document.version);
                Ok(Some(entry.payload.clone()))
            }
            Some(_) => {
                debug!("Shared cache entry {} is expired", key);
                Ok(None)
            }
            None => {
                debug!("Shared cache miss: {}", key);
                Ok(None)
            }
        }
    }

    async fn put(&self, key: &CacheKey, payload: Payload, ttl_seconds: i64) -> SkycacheResult<()> {
        let record_key = self.layout.record_key(key.namespace());
        self.update(&record_key, |document| {
            let entry = CacheEntry::with_ttl(payload.clone(), ttl_seconds, now_epoch());
            document.set_leaf(key.namespace(), key.id(), entry);
            true
        })
        .await?;
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> SkycacheResult<()> {
        let record_key = self.layout.record_key(key.namespace());
        self.update(&record_key, |document| {
            document.remove_leaf(key.namespace(), key.id())
        })
        .await?;
        Ok(())
    }

    async fn purge_expired(&self) -> SkycacheResult<u64> {
        let purges = self.layout.record_keys().into_iter().map(|record_key| async move {
            let mut removed = 0;
            self.update(&record_key, |document| {
                removed = document.remove_expired(now_epoch());
                removed > 0
            })
            .await?;
            Ok::<u64, SkycacheError>(removed)
        });

        let removed: u64 = try_join_all(purges).await?.into_iter().sum();
        info!("Purged {} expired shared cache entries", removed);
        Ok(removed)
    }

    fn name(&self) -> &'static str {
        self.table.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::table::{FileTable, MemoryTable};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    fn payload(value: serde_json::Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    fn location(id: &str) -> CacheKey {
        CacheKey::new(CacheNamespace::Location, id).unwrap()
    }

    /// Commits a competing leaf directly before each of the first
    /// `conflicts` conditional writes, so those writes arrive stale.
    struct InterleavingTable {
        inner: MemoryTable,
        conflicts: AtomicU32,
        attempts: AtomicU32,
    }

    impl InterleavingTable {
        fn new(conflicts: u32) -> Self {
            Self {
                inner: MemoryTable::new(),
                conflicts: AtomicU32::new(conflicts),
                attempts: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl DocumentTable for InterleavingTable {
        async fn get_item(&self, record_key: &str) -> SkycacheResult<Option<SharedCacheDocument>> {
            self.inner.get_item(record_key).await
        }

        async fn put_item_if_version(
            &self,
            record_key: &str,
            document: &SharedCacheDocument,
            expected_version: u64,
        ) -> SkycacheResult<()> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.conflicts.load(Ordering::SeqCst) > 0 {
                self.conflicts.fetch_sub(1, Ordering::SeqCst);
                let mut rival = self.inner.get_item(record_key).await?.unwrap_or_default();
                let base = rival.version;
                rival.set_leaf(
                    CacheNamespace::Location,
                    &format!("rival-{}", attempt),
                    CacheEntry::with_ttl(payload(json!({"rival": attempt})), 0, 0),
                );
                rival.version = base + 1;
                self.inner.put_item_if_version(record_key, &rival, base).await?;
            }
            self.inner
                .put_item_if_version(record_key, document, expected_version)
                .await
        }

        fn name(&self) -> &'static str {
            "interleaving"
        }
    }

    /// Rejects every conditional write
    struct ContendedTable {
        attempts: AtomicU32,
    }

    #[async_trait]
    impl DocumentTable for ContendedTable {
        async fn get_item(&self, _record_key: &str) -> SkycacheResult<Option<SharedCacheDocument>> {
            Ok(None)
        }

        async fn put_item_if_version(
            &self,
            record_key: &str,
            _document: &SharedCacheDocument,
            expected_version: u64,
        ) -> SkycacheResult<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(SkycacheError::ConcurrencyConflict {
                record: record_key.to_string(),
                expected: expected_version,
                actual: expected_version + 1,
            })
        }

        fn name(&self) -> &'static str {
            "contended"
        }
    }

    /// Fails every read with a storage error
    struct UnreachableTable {
        writes: AtomicU32,
    }

    #[async_trait]
    impl DocumentTable for UnreachableTable {
        async fn get_item(&self, _record_key: &str) -> SkycacheResult<Option<SharedCacheDocument>> {
            Err(SkycacheError::storage("unreachable", "access denied"))
        }

        async fn put_item_if_version(
            &self,
            _record_key: &str,
            _document: &SharedCacheDocument,
            _expected_version: u64,
        ) -> SkycacheResult<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn name(&self) -> &'static str {
            "unreachable"
        }
    }

    #[tokio::test]
    async fn put_then_get_round_trip() {
        let cache = SharedCache::new(Arc::new(MemoryTable::new()));
        let key = location("Boulder, Colorado");
        let data = payload(json!({"lat": 40.01, "lon": -105.27}));

        cache.put(&key, data.clone(), 3600).await.unwrap();

        assert_eq!(cache.get(&key).await.unwrap(), Some(data));
    }

    #[tokio::test]
    async fn first_write_creates_version_one() {
        let table = Arc::new(MemoryTable::new());
        let cache = SharedCache::new(table.clone());

        cache.put(&location("boulder"), payload(json!({})), 0).await.unwrap();

        let doc = table.get_item(SHARED_RECORD_KEY).await.unwrap().unwrap();
        assert_eq!(doc.version, 1);
    }

    #[tokio::test]
    async fn expired_leaf_reads_as_absent() {
        let table = Arc::new(MemoryTable::new());
        let mut doc = SharedCacheDocument {
            version: 1,
            ..Default::default()
        };
        doc.set_leaf(
            CacheNamespace::Zone,
            "coz040",
            CacheEntry {
                payload: payload(json!({"name": "Boulder"})),
                expiry: Some(now_epoch() - 1),
            },
        );
        table.put_item_if_version(SHARED_RECORD_KEY, &doc, 0).await.unwrap();
        let cache = SharedCache::new(table.clone());

        let key = CacheKey::new(CacheNamespace::Zone, "COZ040").unwrap();
        assert!(cache.get(&key).await.unwrap().is_none());

        cache.put(&key, payload(json!({"name": "Boulder"})), 60).await.unwrap();
        assert!(cache.get(&key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn conflicting_writer_merges_onto_newer_base() {
        // Writer A commits version 1 underneath us; our write is retried on top.
        let table = Arc::new(InterleavingTable::new(1));
        let cache = SharedCache::with_policy(table.clone(), DocumentLayout::Single, fast_retry(5));
        let key = location("seattle, washington");

        cache.put(&key, payload(json!({"lat": 47.6})), 0).await.unwrap();

        let doc = table.get_item(SHARED_RECORD_KEY).await.unwrap().unwrap();
        assert_eq!(doc.version, 2);
        assert_eq!(table.attempts.load(Ordering::SeqCst), 2);
        assert!(doc.leaf(CacheNamespace::Location, "seattle_ washington").is_some());
        assert!(doc.leaf(CacheNamespace::Location, "rival-0").is_some());
    }

    #[tokio::test]
    async fn two_writers_from_same_base_both_survive() {
        let table = Arc::new(MemoryTable::new());
        let cache = SharedCache::with_policy(table.clone(), DocumentLayout::Single, fast_retry(5));

        // Both writers observed version 1 with no location entries.
        cache.put(&CacheKey::new(CacheNamespace::Zone, "seed").unwrap(), payload(json!({})), 0)
            .await
            .unwrap();
        let stale = table.get_item(SHARED_RECORD_KEY).await.unwrap().unwrap();
        assert_eq!(stale.version, 1);

        // Writer A commits boulder at version 2.
        cache
            .put(&location("boulder, colorado"), payload(json!({"lat": 40.0})), 0)
            .await
            .unwrap();

        // Writer B's write based on version 1 is rejected.
        let mut b_attempt = stale.clone();
        b_attempt.set_leaf(
            CacheNamespace::Location,
            "seattle_ washington",
            CacheEntry::with_ttl(payload(json!({"lat": 47.6})), 0, 0),
        );
        b_attempt.version = 2;
        let err = table
            .put_item_if_version(SHARED_RECORD_KEY, &b_attempt, 1)
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        // Writer B re-reads version 2 and merges its leaf.
        cache
            .put(&location("seattle, washington"), payload(json!({"lat": 47.6})), 0)
            .await
            .unwrap();

        let doc = table.get_item(SHARED_RECORD_KEY).await.unwrap().unwrap();
        assert_eq!(doc.version, 3);
        assert!(doc.leaf(CacheNamespace::Location, "boulder_ colorado").is_some());
        assert!(doc.leaf(CacheNamespace::Location, "seattle_ washington").is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_lose_no_updates() {
        const WRITERS: u32 = 16;
        let table = Arc::new(MemoryTable::new());
        // Every rejected attempt implies another writer committed, so no
        // writer can conflict more than WRITERS - 1 times.
        let cache = Arc::new(SharedCache::with_policy(
            table.clone(),
            DocumentLayout::Single,
            fast_retry(WRITERS),
        ));

        let handles: Vec<_> = (0..WRITERS)
            .map(|i| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    let namespace = CacheNamespace::all()[(i % 3) as usize];
                    let key = CacheKey::new(namespace, &format!("id-{}", i)).unwrap();
                    cache.put(&key, payload(json!({"writer": i})), 0).await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        for i in 0..WRITERS {
            let namespace = CacheNamespace::all()[(i % 3) as usize];
            let key = CacheKey::new(namespace, &format!("id-{}", i)).unwrap();
            assert_eq!(cache.get(&key).await.unwrap().unwrap()["writer"], i);
        }
        let doc = table.get_item(SHARED_RECORD_KEY).await.unwrap().unwrap();
        assert_eq!(doc.version, table.successful_writes());
        assert_eq!(doc.version, WRITERS as u64);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_writers_over_file_table() {
        const WRITERS: u32 = 16;
        let temp = TempDir::new().unwrap();
        let table = Arc::new(FileTable::open(temp.path()).await.unwrap());
        let cache = Arc::new(SharedCache::with_policy(
            table.clone(),
            DocumentLayout::Single,
            fast_retry(WRITERS),
        ));

        let handles: Vec<_> = (0..WRITERS)
            .map(|i| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    let key = location(&format!("id-{}", i));
                    cache.put(&key, payload(json!({"writer": i})), 0).await
                })
            })
            .collect();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(30), handle)
                .await
                .expect("writer stalled")
                .unwrap()
                .unwrap();
        }

        for i in 0..WRITERS {
            let key = location(&format!("id-{}", i));
            assert_eq!(cache.get(&key).await.unwrap().unwrap()["writer"], i);
        }
        let doc = table.get_item(SHARED_RECORD_KEY).await.unwrap().unwrap();
        assert_eq!(doc.version, WRITERS as u64);
        assert_eq!(doc.entry_count(), WRITERS as usize);
    }

    #[tokio::test]
    async fn zero_attempt_policy_still_writes() {
        let table = Arc::new(MemoryTable::new());
        let cache = SharedCache::with_policy(table.clone(), DocumentLayout::Single, fast_retry(0));

        cache.put(&location("boulder"), payload(json!({})), 0).await.unwrap();

        assert_eq!(table.successful_writes(), 1);
    }

    #[tokio::test]
    async fn permanent_contention_exhausts_retries() {
        let table = Arc::new(ContendedTable {
            attempts: AtomicU32::new(0),
        });
        let cache = SharedCache::with_policy(table.clone(), DocumentLayout::Single, fast_retry(5));

        let err = cache
            .put(&location("boulder"), payload(json!({})), 0)
            .await
            .unwrap_err();

        assert!(matches!(err, SkycacheError::ConcurrencyExhausted { attempts: 5, .. }));
        assert_eq!(table.attempts.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn storage_failure_is_not_retried() {
        let table = Arc::new(UnreachableTable {
            writes: AtomicU32::new(0),
        });
        let cache = SharedCache::with_policy(table.clone(), DocumentLayout::Single, fast_retry(5));

        let err = cache
            .put(&location("boulder"), payload(json!({})), 0)
            .await
            .unwrap_err();

        assert!(matches!(err, SkycacheError::StorageUnavailable { .. }));
        assert_eq!(table.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn remove_missing_leaf_writes_nothing() {
        let table = Arc::new(MemoryTable::new());
        let cache = SharedCache::new(table.clone());

        cache.remove(&location("boulder")).await.unwrap();
        assert_eq!(table.successful_writes(), 0);

        cache.put(&location("boulder"), payload(json!({})), 0).await.unwrap();
        cache.remove(&location("boulder")).await.unwrap();
        assert!(cache.get(&location("boulder")).await.unwrap().is_none());
        assert_eq!(table.successful_writes(), 2);
    }

    #[tokio::test]
    async fn per_namespace_layout_uses_separate_records() {
        let table = Arc::new(MemoryTable::new());
        let cache =
            SharedCache::with_policy(table.clone(), DocumentLayout::PerNamespace, fast_retry(5));

        cache.put(&location("boulder"), payload(json!({})), 0).await.unwrap();
        let station = CacheKey::new(CacheNamespace::Station, "KBOU").unwrap();
        cache.put(&station, payload(json!({})), 0).await.unwrap();

        let docs = cache.documents().await.unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs.iter().all(|(_, doc)| doc.version == 1));
        assert!(table.get_item("shared-cache-station").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn purge_drops_only_expired_leaves() {
        let table = Arc::new(MemoryTable::new());
        let mut doc = SharedCacheDocument {
            version: 4,
            ..Default::default()
        };
        doc.set_leaf(
            CacheNamespace::Station,
            "old",
            CacheEntry {
                payload: payload(json!({})),
                expiry: Some(now_epoch() - 100),
            },
        );
        doc.set_leaf(
            CacheNamespace::Station,
            "kept",
            CacheEntry::with_ttl(payload(json!({})), 0, 0),
        );
        table.put_item_if_version(SHARED_RECORD_KEY, &doc, 0).await.unwrap();
        let cache = SharedCache::new(table.clone());

        assert_eq!(cache.purge_expired().await.unwrap(), 1);
        assert_eq!(cache.purge_expired().await.unwrap(), 0);

        let doc = table.get_item(SHARED_RECORD_KEY).await.unwrap().unwrap();
        assert_eq!(doc.version, 5);
        assert!(doc.leaf(CacheNamespace::Station, "kept").is_some());
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(50));
        assert_eq!(policy.backoff(2), Duration::from_millis(100));
        assert_eq!(policy.backoff(3), Duration::from_millis(200));
        assert_eq!(policy.backoff(30), Duration::from_secs(1));
    }
}
