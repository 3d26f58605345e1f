//! Cache facade used by request handlers
//!
//! The cache is an optimization, never a dependency: storage failures are
//! logged and the caller always gets a payload, either from the cache or
//! freshly computed. The only error a caller sees is its own compute error.

use crate::cache::backend::CacheBackend;
use crate::cache::entry::Payload;
use crate::cache::key::{CacheKey, CacheNamespace};
use crate::config::schema::TtlConfig;
use crate::error::{SkycacheError, SkycacheResult};
use crate::user::{AttributeStore, PerUserStore};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Default TTL, in seconds, applied per namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    pub location: i64,
    pub station: i64,
    pub zone: i64,
    /// Default for user-scoped entries
    pub user: i64,
}

impl TtlPolicy {
    pub fn for_namespace(&self, namespace: CacheNamespace) -> i64 {
        match namespace {
            CacheNamespace::Location => self.location,
            CacheNamespace::Station => self.station,
            CacheNamespace::Zone => self.zone,
        }
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        TtlConfig::default().into()
    }
}

impl From<TtlConfig> for TtlPolicy {
    fn from(config: TtlConfig) -> Self {
        Self {
            location: config.location_secs,
            station: config.station_secs,
            zone: config.zone_secs,
            user: config.user_secs,
        }
    }
}

/// Log a cache failure the caller is shielded from
fn log_cache_failure(operation: &str, key: &str, e: &SkycacheError) {
    if e.is_fail_soft() {
        warn!("Cache {} skipped for {}: {}", operation, key, e);
    } else {
        error!("Cache {} failed for {}: {}", operation, key, e);
    }
}

/// Routes cache requests to the shared backend or the per-user store
pub struct CacheFacade {
    shared: Arc<dyn CacheBackend>,
    users: Option<PerUserStore>,
    ttl: TtlPolicy,
}

impl CacheFacade {
    /// Create a facade over an injected shared backend
    pub fn new(shared: Arc<dyn CacheBackend>) -> Self {
        Self {
            shared,
            users: None,
            ttl: TtlPolicy::default(),
        }
    }

    /// Attach a per-user store for user-scoped entries
    pub fn with_user_store(mut self, store: Arc<dyn AttributeStore>) -> Self {
        self.users = Some(PerUserStore::new(store));
        self
    }

    pub fn with_ttl_policy(mut self, ttl: TtlPolicy) -> Self {
        self.ttl = ttl;
        self
    }

    /// Backend serving shared namespaces
    pub fn backend(&self) -> &dyn CacheBackend {
        self.shared.as_ref()
    }

    /// Per-user store, if one is attached
    pub fn user_store(&self) -> Option<&PerUserStore> {
        self.users.as_ref()
    }

    /// Return a cached payload, or compute, store and return a fresh one
    ///
    /// `ttl_seconds = None` applies the namespace default. A failure to read
    /// or write the cache never fails the call.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        namespace: CacheNamespace,
        id: &str,
        ttl_seconds: Option<i64>,
        compute_fn: F,
    ) -> Result<Payload, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Payload, E>>,
    {
        let key = match CacheKey::new(namespace, id) {
            Ok(key) => key,
            Err(e) => {
                warn!("Bypassing cache: {}", e);
                return compute_fn().await;
            }
        };

        match self.shared.get(&key).await {
            Ok(Some(payload)) => return Ok(payload),
            Ok(None) => {}
            Err(e) => log_cache_failure("read", &key.to_string(), &e),
        }

        let payload = compute_fn().await?;
        let ttl = ttl_seconds.unwrap_or_else(|| self.ttl.for_namespace(namespace));

        if let Err(e) = self.shared.put(&key, payload.clone(), ttl).await {
            log_cache_failure("write", &key.to_string(), &e);
        } else {
            debug!("Stored fresh {} in {} cache", key, self.shared.name());
        }

        Ok(payload)
    }

    /// User-scoped variant of `get_or_compute`
    ///
    /// Without an attached user store this always computes.
    pub async fn get_or_compute_for_user<F, Fut, E>(
        &self,
        user_id: &str,
        id: &str,
        ttl_seconds: Option<i64>,
        compute_fn: F,
    ) -> Result<Payload, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Payload, E>>,
    {
        let Some(users) = &self.users else {
            return compute_fn().await;
        };

        match users.get_entry(user_id, id).await {
            Ok(Some(payload)) => return Ok(payload),
            Ok(None) => {}
            Err(e) => log_cache_failure("user read", id, &e),
        }

        let payload = compute_fn().await?;
        let ttl = ttl_seconds.unwrap_or(self.ttl.user);

        if let Err(e) = users.put_entry(user_id, id, payload.clone(), ttl).await {
            log_cache_failure("user write", id, &e);
        }

        Ok(payload)
    }

    /// Read a shared entry without computing
    pub async fn get(&self, namespace: CacheNamespace, id: &str) -> SkycacheResult<Option<Payload>> {
        self.shared.get(&CacheKey::new(namespace, id)?).await
    }

    /// Store a shared entry; `None` applies the namespace default TTL
    pub async fn put(
        &self,
        namespace: CacheNamespace,
        id: &str,
        payload: Payload,
        ttl_seconds: Option<i64>,
    ) -> SkycacheResult<()> {
        let ttl = ttl_seconds.unwrap_or_else(|| self.ttl.for_namespace(namespace));
        self.shared
            .put(&CacheKey::new(namespace, id)?, payload, ttl)
            .await
    }

    /// Drop a shared entry so the next lookup recomputes it
    pub async fn invalidate(&self, namespace: CacheNamespace, id: &str) -> SkycacheResult<()> {
        self.shared.remove(&CacheKey::new(namespace, id)?).await
    }

    /// Reclaim expired entries in the shared backend
    pub async fn purge_expired(&self) -> SkycacheResult<u64> {
        self.shared.purge_expired().await
    }
}
