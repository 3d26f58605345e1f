//! Per-user preferences and user-scoped cache entries

use crate::cache::entry::{now_epoch, CacheEntry, Payload};
use crate::cache::key::canonicalize;
use crate::error::{SkycacheError, SkycacheResult};
use crate::user::attributes::{AttributeStore, Attributes};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Preference field a user can set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserField {
    /// Default place name for forecasts
    Location,
    /// Speech rate, percent of normal
    Rate,
    /// Speech pitch offset
    Pitch,
    /// Weather metrics to include in reports
    Metrics,
}

impl UserField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Location => "location",
            Self::Rate => "rate",
            Self::Pitch => "pitch",
            Self::Metrics => "metrics",
        }
    }
}

impl fmt::Display for UserField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for UserField {
    type Err = SkycacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "location" => Ok(Self::Location),
            "rate" => Ok(Self::Rate),
            "pitch" => Ok(Self::Pitch),
            "metrics" => Ok(Self::Metrics),
            _ => Err(SkycacheError::UnknownField(s.to_string())),
        }
    }
}

/// Everything persisted for one user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerUserDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Vec<String>>,

    /// User-scoped cache entries keyed by canonical id
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub entries: BTreeMap<String, CacheEntry>,

    /// Attributes owned by other handlers, carried through untouched
    #[serde(flatten)]
    pub extra: Attributes,
}

impl PerUserDocument {
    fn from_attributes(attributes: Attributes) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(attributes))
    }

    fn into_attributes(self) -> SkycacheResult<Attributes> {
        match serde_json::to_value(self)? {
            Value::Object(attributes) => Ok(attributes),
            _ => Err(SkycacheError::Internal(
                "user document did not serialize to an object".to_string(),
            )),
        }
    }
}

/// Isolated storage per user identity
///
/// No versioning or retry: one invocation owns a user's session at a time,
/// so every write is a plain overwrite that persists immediately.
pub struct PerUserStore {
    store: Arc<dyn AttributeStore>,
}

impl PerUserStore {
    pub fn new(store: Arc<dyn AttributeStore>) -> Self {
        Self { store }
    }

    /// Load a user's document, creating an empty one on first access
    pub async fn document(&self, user_id: &str) -> SkycacheResult<PerUserDocument> {
        let Some(attributes) = self.store.load(user_id).await? else {
            return Ok(PerUserDocument::default());
        };
        PerUserDocument::from_attributes(attributes)
            .map_err(|e| SkycacheError::corrupt(format!("user attributes for {}", user_id), e.to_string()))
    }

    async fn save(&self, user_id: &str, document: PerUserDocument) -> SkycacheResult<()> {
        self.store.save(user_id, &document.into_attributes()?).await
    }

    /// Read a preference field, `None` when unset
    pub async fn get_field(&self, user_id: &str, field: UserField) -> SkycacheResult<Option<Value>> {
        let document = self.document(user_id).await?;
        let value = match field {
            UserField::Location => document.location.map(Value::from),
            UserField::Rate => document.rate.map(Value::from),
            UserField::Pitch => document.pitch.map(Value::from),
            UserField::Metrics => document.metrics.map(Value::from),
        };
        Ok(value)
    }

    /// Overwrite a preference field; `null` clears it
    pub async fn set_field(&self, user_id: &str, field: UserField, value: Value) -> SkycacheResult<()> {
        let mut document = self.document(user_id).await?;
        let invalid = |e: serde_json::Error| SkycacheError::InvalidField {
            field: field.to_string(),
            reason: e.to_string(),
        };

        match field {
            UserField::Location => document.location = serde_json::from_value(value).map_err(invalid)?,
            UserField::Rate => document.rate = serde_json::from_value(value).map_err(invalid)?,
            UserField::Pitch => document.pitch = serde_json::from_value(value).map_err(invalid)?,
            UserField::Metrics => document.metrics = serde_json::from_value(value).map_err(invalid)?,
        }

        self.save(user_id, document).await?;
        debug!("Set user field {}", field);
        Ok(())
    }

    /// Read a user-scoped cache entry; expired entries are removed
    pub async fn get_entry(&self, user_id: &str, id: &str) -> SkycacheResult<Option<Payload>> {
        let id = canonicalize(id);
        let mut document = self.document(user_id).await?;

        let Some(entry) = document.entries.get(&id) else {
            return Ok(None);
        };
        if !entry.is_expired() {
            return Ok(Some(entry.payload.clone()));
        }

        debug!("User cache entry {} is expired", id);
        document.entries.remove(&id);
        self.save(user_id, document).await?;
        Ok(None)
    }

    /// Store a user-scoped cache entry
    pub async fn put_entry(
        &self,
        user_id: &str,
        id: &str,
        payload: Payload,
        ttl_seconds: i64,
    ) -> SkycacheResult<()> {
        let id = canonicalize(id);
        if id.is_empty() {
            return Err(SkycacheError::InvalidKey("empty user cache identifier".to_string()));
        }

        let mut document = self.document(user_id).await?;
        document
            .entries
            .insert(id, CacheEntry::with_ttl(payload, ttl_seconds, now_epoch()));
        self.save(user_id, document).await
    }
}
