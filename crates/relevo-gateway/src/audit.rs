use crate::operation::OperationKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

/// One gateway invocation attempt, for reconciliation and dispute handling.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    /// When the attempt happened.
    pub timestamp: DateTime<Utc>,
    /// The entity on whose behalf the call was made.
    pub entity_id: Uuid,
    /// Tenant partition.
    pub org_id: String,
    /// Which operation family.
    pub operation: OperationKind,
    /// The dedup key used.
    pub idempotency_key: String,
    /// How the attempt ended.
    pub outcome: AuditOutcome,
    /// Failure detail, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// How a single invocation attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// The external call executed and succeeded.
    Success,
    /// A cached result was returned; no external call happened.
    Replayed,
    /// A transient failure; another attempt follows.
    Retried,
    /// The call failed and will not be retried.
    Failed,
}

/// Append-only audit log of every gateway invocation.
///
/// Entries flow through a channel to a background task that appends JSONL
/// to `audit.jsonl` in the log directory, so callers never block on disk.
pub struct AuditLog {
    tx: mpsc::UnboundedSender<AuditRecord>,
}

impl AuditLog {
    /// Creates the log and spawns its background writer.
    pub fn new(log_dir: PathBuf) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<AuditRecord>();

        tokio::spawn(async move {
            let _ = tokio::fs::create_dir_all(&log_dir).await;
            let path = log_dir.join("audit.jsonl");

            while let Some(record) = rx.recv().await {
                let Ok(mut line) = serde_json::to_string(&record) else {
                    continue;
                };
                line.push('\n');
                if let Ok(mut file) = tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .await
                {
                    let _ = file.write_all(line.as_bytes()).await;
                }
            }
        });

        Self { tx }
    }

    /// Records one attempt.
    pub fn log(&self, record: AuditRecord) {
        info!(
            entity_id = %record.entity_id,
            operation = %record.operation,
            outcome = ?record.outcome,
            "gateway audit"
        );
        let _ = self.tx.send(record);
    }

    /// Convenience constructor + send.
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &self,
        entity_id: Uuid,
        org_id: &str,
        operation: OperationKind,
        idempotency_key: &str,
        outcome: AuditOutcome,
        detail: Option<String>,
    ) {
        self.log(AuditRecord {
            timestamp: Utc::now(),
            entity_id,
            org_id: org_id.to_string(),
            operation,
            idempotency_key: idempotency_key.to_string(),
            outcome,
            detail,
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_records_append_as_jsonl() {
        let tmp = tempfile::tempdir().unwrap();
        let log = AuditLog::new(tmp.path().to_path_buf());

        let entity = Uuid::new_v4();
        log.record(
            entity,
            "org-a",
            OperationKind::SendMessage,
            "key-1",
            AuditOutcome::Success,
            None,
        );
        log.record(
            entity,
            "org-a",
            OperationKind::SendMessage,
            "key-1",
            AuditOutcome::Replayed,
            None,
        );

        // Writer runs in the background; give it a moment to flush.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let data = tokio::fs::read_to_string(tmp.path().join("audit.jsonl"))
            .await
            .unwrap();
        let lines: Vec<&str> = data.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"success\""));
        assert!(lines[1].contains("\"replayed\""));
        assert!(lines[0].contains("key-1"));
    }

    #[tokio::test]
    async fn test_failure_detail_serialized() {
        let tmp = tempfile::tempdir().unwrap();
        let log = AuditLog::new(tmp.path().to_path_buf());

        log.record(
            Uuid::new_v4(),
            "org-a",
            OperationKind::CapturePayment,
            "key-2",
            AuditOutcome::Failed,
            Some("card declined".to_string()),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;

        let data = tokio::fs::read_to_string(tmp.path().join("audit.jsonl"))
            .await
            .unwrap();
        assert!(data.contains("card declined"));
    }
}
