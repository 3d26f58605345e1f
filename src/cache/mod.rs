//! Versioned shared cache for location, station and zone lookups
//!
//! Lookups that are expensive to recompute are cached under a namespace and
//! shared by many independent, possibly concurrent, invocations.
//!
//! # Backends
//!
//! | Backend | Storage | Concurrency |
//! |---------|---------|-------------|
//! | `SharedCache` over `FileTable` | one versioned JSON document per record | optimistic, version CAS + retry |
//! | `SharedCache` over `MemoryTable` | in-process document | optimistic, version CAS + retry |
//! | `LocalStore` | one JSON file per entry | none, single process |
//!
//! Callers go through `CacheFacade`, which never fails a request because of
//! the cache: on any storage problem it computes the value fresh.

pub mod backend;
pub mod entry;
pub mod facade;
pub mod factory;
pub mod key;
pub mod local;
pub mod shared;
pub mod table;

pub use backend::CacheBackend;
pub use entry::{CacheEntry, Payload};
pub use facade::{CacheFacade, TtlPolicy};
pub use factory::{create_facade, create_shared_backend, BackendKind};
pub use key::{canonicalize, CacheKey, CacheNamespace};
pub use local::LocalStore;
pub use shared::{DocumentLayout, RetryPolicy, SharedCache, SHARED_RECORD_KEY};
pub use table::{DocumentTable, FileTable, MemoryTable, SharedCacheDocument};
