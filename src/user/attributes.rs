//! Persisted per-user attribute storage
//!
//! Each user owns one JSON object of attributes. There is a single writer per
//! user, so saves overwrite without any version check.

use crate::error::{SkycacheError, SkycacheResult};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;

/// A user's persisted attributes
pub type Attributes = Map<String, Value>;

/// Session attribute store interface
#[async_trait]
pub trait AttributeStore: Send + Sync {
    /// Load a user's attributes, `None` if the user has none yet
    async fn load(&self, user_id: &str) -> SkycacheResult<Option<Attributes>>;

    /// Replace a user's attributes
    async fn save(&self, user_id: &str, attributes: &Attributes) -> SkycacheResult<()>;
}

/// In-process attribute store
#[derive(Default)]
pub struct MemoryAttributeStore {
    users: RwLock<HashMap<String, Attributes>>,
}

impl MemoryAttributeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AttributeStore for MemoryAttributeStore {
    async fn load(&self, user_id: &str) -> SkycacheResult<Option<Attributes>> {
        Ok(self.users.read().await.get(user_id).cloned())
    }

    async fn save(&self, user_id: &str, attributes: &Attributes) -> SkycacheResult<()> {
        self.users
            .write()
            .await
            .insert(user_id.to_string(), attributes.clone());
        Ok(())
    }
}

/// File-backed attribute store: `<dir>/<sha256(user_id)>.json`
///
/// User ids are account identifiers, so they are hashed rather than used as
/// file names.
pub struct FileAttributeStore {
    dir: PathBuf,
}

impl FileAttributeStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn user_path(&self, user_id: &str) -> PathBuf {
        let digest = Sha256::digest(user_id.as_bytes());
        self.dir.join(format!("{}.json", hex::encode(digest)))
    }
}

#[async_trait]
impl AttributeStore for FileAttributeStore {
    async fn load(&self, user_id: &str) -> SkycacheResult<Option<Attributes>> {
        let path = self.user_path(user_id);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(SkycacheError::io(
                    format!("reading user attributes {}", path.display()),
                    e,
                ))
            }
        };

        let attributes = serde_json::from_str(&content)
            .map_err(|e| SkycacheError::corrupt(path.display().to_string(), e.to_string()))?;
        Ok(Some(attributes))
    }

    async fn save(&self, user_id: &str, attributes: &Attributes) -> SkycacheResult<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| SkycacheError::io("creating user attributes directory", e))?;

        let path = self.user_path(user_id);
        let content = serde_json::to_string_pretty(attributes)?;
        fs::write(&path, content)
            .await
            .map_err(|e| SkycacheError::io(format!("writing user attributes {}", path.display()), e))?;

        // Restrict access to the owning account
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&path, perms)
                .map_err(|e| SkycacheError::io("setting user attributes permissions", e))?;
        }

        debug!("Saved attributes to {}", path.display());
        Ok(())
    }
}
