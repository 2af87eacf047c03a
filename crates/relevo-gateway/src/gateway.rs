use crate::audit::{AuditLog, AuditOutcome};
use crate::idempotency::IdempotencyCache;
use crate::operation::{ExternalOperation, OperationKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Backoff schedule for transient failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles each attempt.
    pub base_delay: Duration,
    /// Ceiling on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// The delay to sleep after the given 1-based attempt.
    fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(2u32.saturating_pow(exp));
        delay.min(self.max_delay)
    }
}

/// The normalized result a worker sees for every gateway call.
///
/// Raw transport errors never cross this boundary: the worker reads `ok`
/// and `retryable` and decides whether to try a different approach or
/// terminate the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallResult {
    /// Whether the operation succeeded (possibly via replay).
    pub ok: bool,
    /// On failure: whether the failure class was transient.
    pub retryable: bool,
    /// Failure detail or replay note.
    pub detail: Option<String>,
    /// The operation's output on success.
    pub output: Option<serde_json::Value>,
}

impl CallResult {
    fn success(output: serde_json::Value, detail: Option<String>) -> Self {
        Self {
            ok: true,
            retryable: false,
            detail,
            output: Some(output),
        }
    }

    fn failure(retryable: bool, detail: impl Into<String>) -> Self {
        Self {
            ok: false,
            retryable,
            detail: Some(detail.into()),
            output: None,
        }
    }

    /// Whether this result was served from the idempotency cache.
    pub fn replayed(&self) -> bool {
        self.ok && self.detail.as_deref() == Some("replayed")
    }
}

/// The idempotent call gateway.
///
/// Checks the idempotency record before executing, retries transient
/// failures with exponential backoff, stores successful results under
/// `(idempotency_key, operation_kind)`, and audits every attempt.
pub struct CallGateway {
    operations: HashMap<OperationKind, Arc<dyn ExternalOperation>>,
    cache: IdempotencyCache,
    audit: AuditLog,
    retry: RetryPolicy,
}

impl CallGateway {
    /// Creates a gateway with the default retry policy and cache TTL.
    pub fn new(audit: AuditLog) -> Self {
        Self {
            operations: HashMap::new(),
            cache: IdempotencyCache::default(),
            audit,
            retry: RetryPolicy::default(),
        }
    }

    /// Overrides the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Overrides the idempotency cache.
    pub fn with_cache(mut self, cache: IdempotencyCache) -> Self {
        self.cache = cache;
        self
    }

    /// Registers the handler for an operation kind.
    pub fn register(&mut self, operation: Arc<dyn ExternalOperation>) {
        self.operations.insert(operation.kind(), operation);
    }

    /// Invokes an external operation on behalf of an entity.
    ///
    /// A fresh cached result under `(idempotency_key, kind)` short-circuits
    /// without touching the external system.
    pub async fn invoke(
        &self,
        entity_id: Uuid,
        org_id: &str,
        kind: OperationKind,
        idempotency_key: &str,
        payload: &serde_json::Value,
    ) -> CallResult {
        if let Some(cached) = self.cache.lookup(idempotency_key, kind).await {
            debug!(entity_id = %entity_id, operation = %kind, "idempotent replay");
            self.audit.record(
                entity_id,
                org_id,
                kind,
                idempotency_key,
                AuditOutcome::Replayed,
                None,
            );
            return CallResult::success(cached, Some("replayed".to_string()));
        }

        let Some(operation) = self.operations.get(&kind) else {
            let detail = format!("no operation registered for {kind}");
            self.audit.record(
                entity_id,
                org_id,
                kind,
                idempotency_key,
                AuditOutcome::Failed,
                Some(detail.clone()),
            );
            return CallResult::failure(false, detail);
        };

        let mut attempt = 1;
        loop {
            match operation.execute(payload).await {
                Ok(output) => {
                    self.cache.store(idempotency_key, kind, output.clone()).await;
                    self.audit.record(
                        entity_id,
                        org_id,
                        kind,
                        idempotency_key,
                        AuditOutcome::Success,
                        None,
                    );
                    return CallResult::success(output, None);
                }
                Err(e) if e.retryable && attempt < self.retry.max_attempts => {
                    warn!(
                        entity_id = %entity_id,
                        operation = %kind,
                        attempt,
                        error = %e,
                        "transient failure, retrying"
                    );
                    self.audit.record(
                        entity_id,
                        org_id,
                        kind,
                        idempotency_key,
                        AuditOutcome::Retried,
                        Some(e.detail),
                    );
                    tokio::time::sleep(self.retry.delay_after(attempt)).await;
                    attempt += 1;
                }
                Err(e) => {
                    self.audit.record(
                        entity_id,
                        org_id,
                        kind,
                        idempotency_key,
                        AuditOutcome::Failed,
                        Some(e.detail.clone()),
                    );
                    return CallResult::failure(e.retryable, e.detail);
                }
            }
        }
    }
}
