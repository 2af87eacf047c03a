use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The four memory namespaces, each with a distinct TTL policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryLayer {
    /// Operator-configured behavior. Durable, written rarely.
    Preference,
    /// Distilled facts from past interactions. Expires after a retention
    /// horizon.
    Semantic,
    /// Running summary of the current interaction. Overwritten each run.
    Session,
    /// Append-only log of anomalies and resolutions.
    Journal,
}

impl MemoryLayer {
    /// The default time-to-live for writes into this layer.
    ///
    /// `None` means the layer is durable. Callers may override per write.
    pub fn default_ttl(&self) -> Option<Duration> {
        match self {
            MemoryLayer::Preference => None,
            MemoryLayer::Semantic => Some(Duration::days(90)),
            MemoryLayer::Session => Some(Duration::hours(1)),
            MemoryLayer::Journal => None,
        }
    }

    /// Whether writes to this layer append instead of overwrite.
    pub fn is_append_only(&self) -> bool {
        matches!(self, MemoryLayer::Journal)
    }
}

impl std::fmt::Display for MemoryLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryLayer::Preference => write!(f, "preference"),
            MemoryLayer::Semantic => write!(f, "semantic"),
            MemoryLayer::Session => write!(f, "session"),
            MemoryLayer::Journal => write!(f, "journal"),
        }
    }
}

/// A single fact stored in one of the memory layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique identifier for this record.
    pub id: Uuid,
    /// Tenant partition. Never absent.
    pub org_id: String,
    /// The layer this record lives in.
    pub layer: MemoryLayer,
    /// Namespace-local key.
    pub key: String,
    /// The stored value.
    pub value: serde_json::Value,
    /// When the record was written.
    pub created_at: DateTime<Utc>,
    /// When the record stops being readable. `None` means durable.
    pub expires_at: Option<DateTime<Utc>>,
}

impl MemoryRecord {
    /// Creates a record stamped `now`, with expiry derived from `ttl`.
    pub fn new(
        org_id: impl Into<String>,
        layer: MemoryLayer,
        key: impl Into<String>,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            org_id: org_id.into(),
            layer,
            key: key.into(),
            value,
            created_at: now,
            expires_at: ttl.map(|d| now + d),
        }
    }

    /// Whether the record has passed its expiry.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// The record's value rendered as searchable text.
    pub fn text(&self) -> String {
        match &self.value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}
