use crate::layer::{MemoryLayer, MemoryRecord};
use crate::semantic::FactIndex;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use relevo_core::{RelevoError, RelevoResult};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Trait for layered memory storage backends.
///
/// All four layers share this interface; they differ only in TTL policy and
/// write pattern. Writes to a `(layer, org_id, key)` are last-writer-wins
/// and there are no cross-layer transactions. Every read takes an `org_id`
/// — the tenant isolation boundary lives here, not in callers.
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// Reads a record by exact key. Expired records read as absent.
    async fn get(
        &self,
        layer: MemoryLayer,
        org_id: &str,
        key: &str,
    ) -> RelevoResult<Option<MemoryRecord>>;

    /// Writes a record, overwriting any previous value under the same key.
    ///
    /// `ttl = None` applies the layer's default policy. Rejected for the
    /// append-only Journal layer — use [`MemoryBackend::append`].
    async fn put(
        &self,
        layer: MemoryLayer,
        org_id: &str,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> RelevoResult<MemoryRecord>;

    /// Appends an entry to the org's Journal.
    async fn append(&self, org_id: &str, value: serde_json::Value) -> RelevoResult<MemoryRecord>;

    /// Lists all live records in a layer for one org.
    async fn list(&self, layer: MemoryLayer, org_id: &str) -> RelevoResult<Vec<MemoryRecord>>;

    /// Relevance-ranked lookup over the org's Semantic layer.
    async fn search(
        &self,
        org_id: &str,
        query: &str,
        top_k: usize,
    ) -> RelevoResult<Vec<MemoryRecord>>;

    /// Drops expired records. Returns how many were removed.
    async fn purge_expired(&self) -> RelevoResult<usize>;
}

type RecordKey = (MemoryLayer, String, String);

/// In-memory backend over `tokio::sync::RwLock` maps, with a per-org
/// BM25 fact index for the semantic layer.
///
/// Brute-force and unsharded; suitable for a single-process worker pool
/// and for tests. Durable backends implement the same trait.
pub struct InMemoryBackend {
    records: RwLock<HashMap<RecordKey, MemoryRecord>>,
    journal: RwLock<HashMap<String, Vec<MemoryRecord>>>,
    facts: RwLock<HashMap<String, FactIndex>>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            journal: RwLock::new(HashMap::new()),
            facts: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryBackend for InMemoryBackend {
    async fn get(
        &self,
        layer: MemoryLayer,
        org_id: &str,
        key: &str,
    ) -> RelevoResult<Option<MemoryRecord>> {
        let records = self.records.read().await;
        let found = records.get(&(layer, org_id.to_string(), key.to_string()));
        Ok(found.filter(|r| !r.is_expired(Utc::now())).cloned())
    }

    async fn put(
        &self,
        layer: MemoryLayer,
        org_id: &str,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> RelevoResult<MemoryRecord> {
        if layer.is_append_only() {
            return Err(RelevoError::Memory(format!(
                "layer {layer} is append-only, use append"
            )));
        }

        let record = MemoryRecord::new(org_id, layer, key, value, ttl.or(layer.default_ttl()));
        let map_key = (layer, org_id.to_string(), key.to_string());

        let mut records = self.records.write().await;
        let previous = records.insert(map_key, record.clone());

        if layer == MemoryLayer::Semantic {
            let mut facts = self.facts.write().await;
            let index = facts.entry(org_id.to_string()).or_default();
            if let Some(old) = previous {
                index.remove(old.id);
            }
            index.add(record.id, &record.text());
        }

        debug!(org_id, %layer, key, "memory put");
        Ok(record)
    }

    async fn append(&self, org_id: &str, value: serde_json::Value) -> RelevoResult<MemoryRecord> {
        let record = MemoryRecord::new(org_id, MemoryLayer::Journal, "", value, None);
        let mut journal = self.journal.write().await;
        journal
            .entry(org_id.to_string())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn list(&self, layer: MemoryLayer, org_id: &str) -> RelevoResult<Vec<MemoryRecord>> {
        if layer == MemoryLayer::Journal {
            let journal = self.journal.read().await;
            return Ok(journal.get(org_id).cloned().unwrap_or_default());
        }

        let now = Utc::now();
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| r.layer == layer && r.org_id == org_id && !r.is_expired(now))
            .cloned()
            .collect())
    }

    async fn search(
        &self,
        org_id: &str,
        query: &str,
        top_k: usize,
    ) -> RelevoResult<Vec<MemoryRecord>> {
        let ranked = {
            let facts = self.facts.read().await;
            match facts.get(org_id) {
                Some(index) => index.search(query, top_k),
                None => return Ok(Vec::new()),
            }
        };

        let now = Utc::now();
        let records = self.records.read().await;
        let by_id: HashMap<_, _> = records
            .values()
            .filter(|r| r.layer == MemoryLayer::Semantic && r.org_id == org_id)
            .map(|r| (r.id, r))
            .collect();

        Ok(ranked
            .into_iter()
            .filter_map(|(id, _)| by_id.get(&id).copied())
            .filter(|r| !r.is_expired(now))
            .cloned()
            .collect())
    }

    async fn purge_expired(&self) -> RelevoResult<usize> {
        let now = Utc::now();
        let mut records = self.records.write().await;
        let mut facts = self.facts.write().await;

        let expired: Vec<RecordKey> = records
            .iter()
            .filter(|(_, r)| r.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();

        for key in &expired {
            if let Some(record) = records.remove(key) {
                if record.layer == MemoryLayer::Semantic {
                    if let Some(index) = facts.get_mut(&record.org_id) {
                        index.remove(record.id);
                    }
                }
            }
        }

        Ok(expired.len())
    }
}
