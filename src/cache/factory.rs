//! Backend factory for creating the configured cache backends
//!
//! The facade receives its backends from here; nothing swaps a process-wide
//! store behind its back.

use crate::cache::backend::CacheBackend;
use crate::cache::facade::{CacheFacade, TtlPolicy};
use crate::cache::local::LocalStore;
use crate::cache::shared::SharedCache;
use crate::cache::table::{FileTable, MemoryTable};
use crate::config::Config;
use crate::user::FileAttributeStore;
use std::sync::Arc;
use tracing::{debug, warn};

pub use crate::config::schema::BackendKind;

/// Create the backend serving shared namespaces
///
/// When the durable table cannot be prepared, falls back to the local store
/// so callers degrade to single-process caching instead of failing.
pub async fn create_shared_backend(config: &Config) -> Arc<dyn CacheBackend> {
    let shared = &config.shared;

    match shared.backend {
        BackendKind::File => match FileTable::open(shared.table_dir()).await {
            Ok(table) => {
                debug!("Using file table at {}", table.dir().display());
                Arc::new(SharedCache::with_policy(
                    Arc::new(table),
                    shared.layout,
                    shared.retry_policy(),
                ))
            }
            Err(e) => {
                warn!("Shared cache table unavailable, falling back to local store: {}", e);
                Arc::new(LocalStore::new(config.local.dir()))
            }
        },
        BackendKind::Memory => Arc::new(SharedCache::with_policy(
            Arc::new(MemoryTable::new()),
            shared.layout,
            shared.retry_policy(),
        )),
        BackendKind::Local => {
            debug!("Using local store at {}", config.local.dir().display());
            Arc::new(LocalStore::new(config.local.dir()))
        }
    }
}

/// Create a facade wired to the configured backends
pub async fn create_facade(config: &Config) -> CacheFacade {
    CacheFacade::new(create_shared_backend(config).await)
        .with_user_store(Arc::new(FileAttributeStore::new(config.users.dir())))
        .with_ttl_policy(TtlPolicy::from(config.ttl))
}
