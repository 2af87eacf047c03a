use crate::layer::{MemoryLayer, MemoryRecord};
use crate::store::MemoryBackend;
use relevo_core::RelevoResult;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

const READ_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_MS: u64 = 25;

/// Read facade over all four memory layers, scoped to one run.
///
/// Workers see memory only through this view, so every read is already
/// bound to the run's `org_id` and `session_id`. Read failures are retried
/// with bounded backoff and then degraded to "not found": a worker proceeds
/// with less context rather than aborting the run.
#[derive(Clone)]
pub struct MemoryView {
    backend: Arc<dyn MemoryBackend>,
    org_id: String,
    session_id: Uuid,
}

impl MemoryView {
    /// Creates a view scoped to one org and session.
    pub fn new(backend: Arc<dyn MemoryBackend>, org_id: impl Into<String>, session_id: Uuid) -> Self {
        Self {
            backend,
            org_id: org_id.into(),
            session_id,
        }
    }

    /// The tenant this view is scoped to.
    pub fn org_id(&self) -> &str {
        &self.org_id
    }

    /// The session this view is scoped to.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// An operator-configured preference value.
    pub async fn preference(&self, key: &str) -> Option<serde_json::Value> {
        self.degraded("preference", || {
            self.backend.get(MemoryLayer::Preference, &self.org_id, key)
        })
        .await
        .flatten()
        .map(|r| r.value)
    }

    /// Relevance-ranked facts from the semantic layer.
    pub async fn recall(&self, query: &str, top_k: usize) -> Vec<MemoryRecord> {
        self.degraded("recall", || self.backend.search(&self.org_id, query, top_k))
            .await
            .unwrap_or_default()
    }

    /// The running summary of this session, if one has been written.
    pub async fn session_summary(&self) -> Option<serde_json::Value> {
        let key = self.session_id.to_string();
        self.degraded("session", || {
            self.backend.get(MemoryLayer::Session, &self.org_id, &key)
        })
        .await
        .flatten()
        .map(|r| r.value)
    }

    /// The org's issue journal, oldest first.
    ///
    /// Consulted before repeating a decision that previously went wrong.
    pub async fn journal(&self) -> Vec<MemoryRecord> {
        self.degraded("journal", || {
            self.backend.list(MemoryLayer::Journal, &self.org_id)
        })
        .await
        .unwrap_or_default()
    }

    /// Runs a read with bounded retry; a persistent failure degrades to
    /// `None` instead of propagating.
    async fn degraded<T, F, Fut>(&self, what: &str, op: F) -> Option<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = RelevoResult<T>>,
    {
        let mut backoff = Duration::from_millis(BACKOFF_BASE_MS);
        for attempt in 1..=READ_ATTEMPTS {
            match op().await {
                Ok(v) => return Some(v),
                Err(e) if attempt < READ_ATTEMPTS => {
                    warn!(org_id = %self.org_id, what, attempt, error = %e, "memory read retry");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => {
                    warn!(org_id = %self.org_id, what, error = %e, "memory read degraded to miss");
                }
            }
        }
        None
    }
}
