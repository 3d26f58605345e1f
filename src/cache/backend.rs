//! Cache backend abstraction
//!
//! Provides a trait for keyed cache storage that can be implemented
//! by different backends:
//! - Local: one JSON file per entry, no concurrency control
//! - Shared: one versioned document per record, optimistic concurrency

use crate::cache::entry::Payload;
use crate::cache::key::CacheKey;
use crate::error::SkycacheResult;
use async_trait::async_trait;

/// Abstract cache storage interface
///
/// Both backends must be indistinguishable to callers: a `put` followed by a
/// `get` of the same key returns the payload unchanged until it expires.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get an unexpired payload, or `None` when missing or expired
    async fn get(&self, key: &CacheKey) -> SkycacheResult<Option<Payload>>;

    /// Store a payload, expiring `ttl_seconds` from now (`<= 0` never expires)
    async fn put(&self, key: &CacheKey, payload: Payload, ttl_seconds: i64) -> SkycacheResult<()>;

    /// Remove an entry; removing a missing entry is not an error
    async fn remove(&self, key: &CacheKey) -> SkycacheResult<()>;

    /// Delete every expired entry, returning how many were removed
    async fn purge_expired(&self) -> SkycacheResult<u64>;

    /// Human-readable backend name for logs and CLI output
    fn name(&self) -> &'static str;
}
