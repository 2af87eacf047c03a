use crate::operation::OperationKind;
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A stored result from a completed external call.
#[derive(Debug, Clone)]
struct CachedCall {
    result: serde_json::Value,
    expires_at: DateTime<Utc>,
}

/// `(idempotency_key, operation_kind) -> result` table with TTL.
///
/// First writer wins: a completed call's result is stored once and a retry
/// with the same pair short-circuits to it instead of re-executing the
/// side effect.
pub struct IdempotencyCache {
    entries: RwLock<HashMap<(String, OperationKind), CachedCall>>,
    ttl: Duration,
}

impl IdempotencyCache {
    /// Creates a cache whose entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// The stored result for this pair, if present and not expired.
    pub async fn lookup(&self, key: &str, kind: OperationKind) -> Option<serde_json::Value> {
        let entries = self.entries.read().await;
        entries
            .get(&(key.to_string(), kind))
            .filter(|c| c.expires_at > Utc::now())
            .map(|c| c.result.clone())
    }

    /// Stores a result unless a live entry already exists.
    ///
    /// Returns `false` when an earlier writer won; the stored value is the
    /// one later lookups will see.
    pub async fn store(&self, key: &str, kind: OperationKind, result: serde_json::Value) -> bool {
        let mut entries = self.entries.write().await;
        let slot = (key.to_string(), kind);
        let now = Utc::now();

        if entries.get(&slot).is_some_and(|c| c.expires_at > now) {
            return false;
        }
        entries.insert(
            slot,
            CachedCall {
                result,
                expires_at: now + self.ttl,
            },
        );
        true
    }

    /// Drops expired entries. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, c| c.expires_at > now);
        before - entries.len()
    }
}

impl Default for IdempotencyCache {
    fn default() -> Self {
        Self::new(Duration::hours(24))
    }
}

/// Derives a stable idempotency key from the entity, operation kind, and a
/// monotonic attempt counter.
///
/// Never from wall-clock time: a crashed-and-restarted run reproduces the
/// same inputs, gets the same key, and short-circuits to the cached result.
pub fn derive_key(entity_id: Uuid, kind: OperationKind, attempt: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(entity_id.as_bytes());
    hasher.update(kind.to_string().as_bytes());
    hasher.update(attempt.to_be_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_miss_then_hit() {
        let cache = IdempotencyCache::default();
        assert!(cache.lookup("k1", OperationKind::SendMessage).await.is_none());

        cache
            .store("k1", OperationKind::SendMessage, serde_json::json!({"sent": true}))
            .await;
        assert_eq!(
            cache.lookup("k1", OperationKind::SendMessage).await,
            Some(serde_json::json!({"sent": true}))
        );
    }

    #[tokio::test]
    async fn test_kind_partitions_the_key() {
        let cache = IdempotencyCache::default();
        cache
            .store("k1", OperationKind::SendMessage, serde_json::json!(1))
            .await;
        assert!(cache.lookup("k1", OperationKind::BookSlot).await.is_none());
    }

    #[tokio::test]
    async fn test_first_writer_wins() {
        let cache = IdempotencyCache::default();
        assert!(cache.store("k1", OperationKind::BookSlot, serde_json::json!("a")).await);
        assert!(!cache.store("k1", OperationKind::BookSlot, serde_json::json!("b")).await);
        assert_eq!(
            cache.lookup("k1", OperationKind::BookSlot).await,
            Some(serde_json::json!("a"))
        );
    }

    #[tokio::test]
    async fn test_expired_entry_is_replaceable() {
        let cache = IdempotencyCache::new(Duration::milliseconds(-1));
        cache
            .store("k1", OperationKind::SendReminder, serde_json::json!("old"))
            .await;
        assert!(cache.lookup("k1", OperationKind::SendReminder).await.is_none());
        assert!(cache.store("k1", OperationKind::SendReminder, serde_json::json!("new")).await);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let cache = IdempotencyCache::new(Duration::milliseconds(-1));
        cache
            .store("k1", OperationKind::SendMessage, serde_json::json!(1))
            .await;
        assert_eq!(cache.purge_expired().await, 1);
    }

    #[test]
    fn test_derive_key_is_stable() {
        let entity = Uuid::new_v4();
        let a = derive_key(entity, OperationKind::SendReminder, 2);
        let b = derive_key(entity, OperationKind::SendReminder, 2);
        assert_eq!(a, b);
    }

    #[test]
    fn test_derive_key_varies_with_inputs() {
        let entity = Uuid::new_v4();
        let base = derive_key(entity, OperationKind::SendReminder, 2);
        assert_ne!(base, derive_key(entity, OperationKind::SendReminder, 3));
        assert_ne!(base, derive_key(entity, OperationKind::SendMessage, 2));
        assert_ne!(base, derive_key(Uuid::new_v4(), OperationKind::SendReminder, 2));
    }
}
