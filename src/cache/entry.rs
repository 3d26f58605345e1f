//! Cache entries with absolute expiry

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Opaque cached value: a mapping of field names to JSON values
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Current time as epoch seconds
pub fn now_epoch() -> i64 {
    Utc::now().timestamp()
}

/// Cached payload plus an optional absolute expiry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The cached value
    pub payload: Payload,

    /// Expiry as epoch seconds; `None` never expires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<i64>,
}

impl CacheEntry {
    /// Create an entry that expires `ttl_seconds` after `now`
    ///
    /// A TTL of zero or less means the entry never expires.
    pub fn with_ttl(payload: Payload, ttl_seconds: i64, now: i64) -> Self {
        let expiry = (ttl_seconds > 0).then(|| now.saturating_add(ttl_seconds));
        Self { payload, expiry }
    }

    /// Check expiry against an explicit clock reading
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expiry.is_some_and(|expiry| expiry <= now)
    }

    /// Check expiry against the wall clock
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_epoch())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> Payload {
        json!({"lat": 40.01, "lon": -105.27}).as_object().cloned().unwrap()
    }

    #[test]
    fn positive_ttl_sets_expiry() {
        let entry = CacheEntry::with_ttl(payload(), 60, 1_000);
        assert_eq!(entry.expiry, Some(1_060));
        assert!(!entry.is_expired_at(1_059));
        assert!(entry.is_expired_at(1_060));
    }

    #[test]
    fn non_positive_ttl_never_expires() {
        assert_eq!(CacheEntry::with_ttl(payload(), 0, 1_000).expiry, None);
        let entry = CacheEntry::with_ttl(payload(), -5, 1_000);
        assert!(!entry.is_expired_at(i64::MAX));
    }

    #[test]
    fn serialized_without_expiry_field_when_absent() {
        let entry = CacheEntry::with_ttl(payload(), 0, 0);
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("expiry").is_none());
        assert_eq!(json["payload"]["lat"], 40.01);
    }
}
