use crate::layer::MemoryLayer;
use crate::store::MemoryBackend;
use relevo_core::RelevoResult;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Distills a finished session into durable memory.
///
/// Reads the session's summary record and promotes its `facts` entries into
/// the Semantic layer (keyed per topic, so later runs overwrite the same
/// fact rather than accumulating duplicates) and its `anomalies` entries
/// into the Journal. Returns the number of records written.
///
/// This runs after the session commit, off the critical path; the caller
/// spawns it and a failure here never fails the run.
pub async fn consolidate_session(
    backend: Arc<dyn MemoryBackend>,
    org_id: &str,
    session_id: Uuid,
) -> RelevoResult<usize> {
    let summary = backend
        .get(MemoryLayer::Session, org_id, &session_id.to_string())
        .await?;

    let Some(summary) = summary else {
        debug!(org_id, %session_id, "no session summary to consolidate");
        return Ok(0);
    };

    let mut written = 0;

    if let Some(facts) = summary.value.get("facts").and_then(serde_json::Value::as_array) {
        for fact in facts {
            let (key, value) = match fact {
                serde_json::Value::Object(map) => {
                    let Some(key) = map.get("key").and_then(serde_json::Value::as_str) else {
                        warn!(org_id, "fact without key skipped");
                        continue;
                    };
                    let value = map.get("value").cloned().unwrap_or_default();
                    (key.to_string(), value)
                }
                serde_json::Value::String(text) => (topic_key(text), fact.clone()),
                _ => continue,
            };
            backend
                .put(MemoryLayer::Semantic, org_id, &key, value, None)
                .await?;
            written += 1;
        }
    }

    if let Some(anomalies) = summary.value.get("anomalies").and_then(serde_json::Value::as_array) {
        for anomaly in anomalies {
            backend.append(org_id, anomaly.clone()).await?;
            written += 1;
        }
    }

    debug!(org_id, %session_id, written, "session consolidated");
    Ok(written)
}

/// Stable topic key for a bare-string fact: its first few tokens.
fn topic_key(text: &str) -> String {
    let tokens: Vec<&str> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .take(4)
        .collect();
    tokens.join("_").to_lowercase()
}
