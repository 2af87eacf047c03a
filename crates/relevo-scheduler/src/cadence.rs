use relevo_core::{RelevoError, RelevoResult};
use relevo_memory::{MemoryBackend, MemoryLayer};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Ordered day offsets driving proactive nudges.
///
/// Read from the org's Preference layer under the `cadence` key: "first
/// nudge at +7 days, second at +14, escalate review at +30". Offsets are
/// relative to entity creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cadence(Vec<i64>);

impl Cadence {
    /// Builds a cadence, requiring at least one strictly increasing offset.
    pub fn new(offsets: Vec<i64>) -> RelevoResult<Self> {
        if offsets.is_empty() {
            return Err(RelevoError::Config("cadence must not be empty".into()));
        }
        if offsets.windows(2).any(|w| w[0] >= w[1]) {
            return Err(RelevoError::Config(
                "cadence offsets must be strictly increasing".into(),
            ));
        }
        Ok(Self(offsets))
    }

    /// Parses a cadence from a Preference-layer value (a JSON array of
    /// day offsets). Returns `None` when absent or malformed — the caller
    /// falls back to the default.
    pub fn from_preference(value: &serde_json::Value) -> Option<Self> {
        let offsets: Vec<i64> = value
            .as_array()?
            .iter()
            .map(serde_json::Value::as_i64)
            .collect::<Option<_>>()?;
        Cadence::new(offsets).ok()
    }

    /// The offset (in days) for the next nudge, given how many reminders
    /// have already been sent. `None` once the cadence is exhausted.
    pub fn offset_for(&self, reminders_sent: u32) -> Option<i64> {
        self.0.get(reminders_sent as usize).copied()
    }

    /// Number of steps in the cadence.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the cadence has no steps. Always false for a constructed
    /// cadence; present for API completeness.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for Cadence {
    fn default() -> Self {
        Self(vec![7, 14, 21, 30])
    }
}

/// Loads an org's cadence from its Preference layer (`cadence` key),
/// falling back to the default when unset, malformed, or unreadable.
pub async fn cadence_for_org(backend: &Arc<dyn MemoryBackend>, org_id: &str) -> Cadence {
    match backend.get(MemoryLayer::Preference, org_id, "cadence").await {
        Ok(Some(record)) => Cadence::from_preference(&record.value).unwrap_or_default(),
        Ok(None) => Cadence::default(),
        Err(e) => {
            warn!(org_id, error = %e, "cadence preference unreadable, using default");
            Cadence::default()
        }
    }
}
