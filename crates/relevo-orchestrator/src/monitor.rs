use relevo_core::WorkerKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Metrics tracked per worker kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerMetrics {
    /// Turns executed.
    pub turns: u32,
    /// Handoffs emitted.
    pub handoffs: u32,
    /// Fatal errors produced.
    pub errors: u32,
    /// Total execution time.
    pub duration_ms: u64,
}

/// Tracks per-worker metrics across runs.
pub struct RunMonitor {
    metrics: RwLock<HashMap<WorkerKind, WorkerMetrics>>,
}

impl RunMonitor {
    /// Creates a monitor with zeroed metrics.
    pub fn new() -> Self {
        Self {
            metrics: RwLock::new(HashMap::new()),
        }
    }

    /// Records one completed turn.
    pub async fn record_turn(&self, kind: WorkerKind) {
        let mut metrics = self.metrics.write().await;
        metrics.entry(kind).or_default().turns += 1;
    }

    /// Records a handoff emitted by a worker.
    pub async fn record_handoff(&self, kind: WorkerKind) {
        let mut metrics = self.metrics.write().await;
        metrics.entry(kind).or_default().handoffs += 1;
    }

    /// Records a fatal error attributed to a worker.
    pub async fn record_error(&self, kind: WorkerKind) {
        let mut metrics = self.metrics.write().await;
        metrics.entry(kind).or_default().errors += 1;
    }

    /// Adds execution time for a worker.
    pub async fn record_duration(&self, kind: WorkerKind, duration_ms: u64) {
        let mut metrics = self.metrics.write().await;
        metrics.entry(kind).or_default().duration_ms += duration_ms;
    }

    /// The metrics for one worker kind.
    pub async fn get(&self, kind: WorkerKind) -> WorkerMetrics {
        let metrics = self.metrics.read().await;
        metrics.get(&kind).cloned().unwrap_or_default()
    }

    /// Aggregate metrics across all workers.
    pub async fn aggregate(&self) -> WorkerMetrics {
        let metrics = self.metrics.read().await;
        let mut total = WorkerMetrics::default();
        for m in metrics.values() {
            total.turns += m.turns;
            total.handoffs += m.handoffs;
            total.errors += m.errors;
            total.duration_ms += m.duration_ms;
        }
        total
    }

    /// JSON snapshot for an operator dashboard.
    pub async fn to_json(&self) -> serde_json::Value {
        let metrics = self.metrics.read().await;
        let per_worker: HashMap<String, &WorkerMetrics> = metrics
            .iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        serde_json::json!({ "workers": per_worker })
    }
}

impl Default for RunMonitor {
    fn default() -> Self {
        Self::new()
    }
}
