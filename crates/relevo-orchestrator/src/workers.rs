//! Deterministic reference workers for the built-in squad.
//!
//! These implement the [`Worker`] seam with rule-based decisions so the
//! engine can be exercised end to end without any reasoning layer: a
//! lead-response worker that qualifies on a score, a scheduling worker
//! that books a slot, and a billing worker that captures payment or sends
//! reminders. A production deployment registers its own workers; the
//! engine is indifferent to how `act` decides.

use crate::worker::{Decision, Worker};
use async_trait::async_trait;
use relevo_core::{HandoffContext, RelevoResult, RunOutcome, WorkerKind};
use relevo_gateway::{derive_key, CallGateway, OperationKind};
use relevo_lifecycle::{Entity, REMINDER_ACTION};
use relevo_memory::MemoryView;
use std::sync::Arc;
use tracing::debug;

/// Leads scoring at or above this qualify.
const QUALIFY_THRESHOLD: u64 = 7;

fn error_outcome(detail: Option<String>) -> Decision {
    Decision::Terminate(RunOutcome::Error {
        reason: detail.unwrap_or_else(|| "external call failed".to_string()),
    })
}

/// Responds to inbound inquiries and qualifies the counterpart.
///
/// Expects a `score` field in the context (seeded from the trigger
/// payload); qualified leads hand off to scheduling with the counterpart
/// bundle, unqualified ones are declined.
pub struct LeadResponseWorker {
    gateway: Arc<CallGateway>,
}

impl LeadResponseWorker {
    /// Creates the worker over the given gateway.
    pub fn new(gateway: Arc<CallGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Worker for LeadResponseWorker {
    fn kind(&self) -> WorkerKind {
        WorkerKind::LeadResponse
    }

    async fn act(
        &self,
        entity: &Entity,
        view: &MemoryView,
        context: &HandoffContext,
    ) -> RelevoResult<Decision> {
        let tone = view
            .preference("tone")
            .await
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_else(|| "professional".to_string());

        // Acknowledge the inquiry. The key is derived from stable inputs,
        // so a restarted run replays instead of double-sending.
        let ack_key = derive_key(entity.entity_id, OperationKind::SendMessage, 0);
        let ack = self
            .gateway
            .invoke(
                entity.entity_id,
                &entity.org_id,
                OperationKind::SendMessage,
                &ack_key,
                &serde_json::json!({
                    "to": context.extra.get("contact"),
                    "template": "acknowledgement",
                    "tone": tone,
                }),
            )
            .await;
        if !ack.ok {
            return Ok(error_outcome(ack.detail));
        }

        let Some(score) = context.extra.get("score").and_then(serde_json::Value::as_u64) else {
            // Nothing to qualify on yet; wait for the next inbound message.
            debug!(entity_id = %entity.entity_id, "no score yet, awaiting details");
            return Ok(Decision::Terminate(RunOutcome::Completed));
        };

        if score < QUALIFY_THRESHOLD {
            return Ok(Decision::Terminate(RunOutcome::Abandoned));
        }

        let Some(contact) = context.extra.get("contact").and_then(serde_json::Value::as_str) else {
            // Qualified but unreachable; collect contact details first.
            return Ok(Decision::Terminate(RunOutcome::Completed));
        };

        let counterpart_id = context
            .extra
            .get("counterpart_id")
            .and_then(serde_json::Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| entity.entity_id.to_string());
        let name = context
            .extra
            .get("name")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown");

        let next = context
            .clone()
            .with_counterpart(counterpart_id, name)
            .with_contact(contact)
            .with_decision("qualified");

        Ok(Decision::Handoff {
            next: WorkerKind::Scheduling,
            context: next,
        })
    }
}

/// Books fulfillment slots for qualified counterparts.
pub struct SchedulingWorker {
    gateway: Arc<CallGateway>,
}

impl SchedulingWorker {
    /// Creates the worker over the given gateway.
    pub fn new(gateway: Arc<CallGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Worker for SchedulingWorker {
    fn kind(&self) -> WorkerKind {
        WorkerKind::Scheduling
    }

    async fn act(
        &self,
        entity: &Entity,
        view: &MemoryView,
        context: &HandoffContext,
    ) -> RelevoResult<Decision> {
        // Past interactions may already tell us when this counterparty
        // likes to be scheduled; degraded recall just means no hint.
        let slot_hint = view
            .recall("preferred slot time", 1)
            .await
            .first()
            .map(|r| r.text());

        let booking_key = derive_key(entity.entity_id, OperationKind::BookSlot, 0);
        let booked = self
            .gateway
            .invoke(
                entity.entity_id,
                &entity.org_id,
                OperationKind::BookSlot,
                &booking_key,
                &serde_json::json!({
                    "counterpart_id": context.counterpart_id,
                    "requested": context.extra.get("slot"),
                    "hint": slot_hint,
                }),
            )
            .await;

        if !booked.ok {
            return Ok(error_outcome(booked.detail));
        }

        let next = context
            .clone()
            .with_decision("booked")
            .with_extra(
                "booking_ref",
                booked.output.unwrap_or(serde_json::Value::Null),
            );

        Ok(Decision::Handoff {
            next: WorkerKind::Billing,
            context: next,
        })
    }
}

/// Captures payment after booking, or nudges on scheduled wakes.
pub struct BillingWorker {
    gateway: Arc<CallGateway>,
}

impl BillingWorker {
    /// Creates the worker over the given gateway.
    pub fn new(gateway: Arc<CallGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Worker for BillingWorker {
    fn kind(&self) -> WorkerKind {
        WorkerKind::Billing
    }

    async fn act(
        &self,
        entity: &Entity,
        _view: &MemoryView,
        context: &HandoffContext,
    ) -> RelevoResult<Decision> {
        if context.decision.as_deref() == Some("booked") {
            let capture_key = derive_key(entity.entity_id, OperationKind::CapturePayment, 0);
            let captured = self
                .gateway
                .invoke(
                    entity.entity_id,
                    &entity.org_id,
                    OperationKind::CapturePayment,
                    &capture_key,
                    &serde_json::json!({
                        "counterpart_id": context.counterpart_id,
                        "booking_ref": context.extra.get("booking_ref"),
                    }),
                )
                .await;

            return if captured.ok {
                Ok(Decision::Terminate(RunOutcome::Completed))
            } else {
                Ok(error_outcome(captured.detail))
            };
        }

        // Reminder path: fired by a scheduled wake. The attempt counter
        // makes the key advance with each nudge, while a crashed-and-
        // restarted run for the same nudge replays.
        let attempt = entity.counter(REMINDER_ACTION);
        let reminder_key = derive_key(entity.entity_id, OperationKind::SendReminder, attempt);
        let sent = self
            .gateway
            .invoke(
                entity.entity_id,
                &entity.org_id,
                OperationKind::SendReminder,
                &reminder_key,
                &serde_json::json!({
                    "counterpart_id": context.counterpart_id,
                    "reminder_number": attempt + 1,
                }),
            )
            .await;

        if sent.ok {
            Ok(Decision::Terminate(RunOutcome::Completed))
        } else {
            Ok(error_outcome(sent.detail))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use relevo_gateway::{AuditLog, ExternalOperation, OperationError};
    use relevo_lifecycle::WorkflowKind;
    use relevo_memory::{InMemoryBackend, MemoryView};
    use uuid::Uuid;

    struct OkOperation(OperationKind);

    #[async_trait]
    impl ExternalOperation for OkOperation {
        fn kind(&self) -> OperationKind {
            self.0
        }

        async fn execute(
            &self,
            _payload: &serde_json::Value,
        ) -> Result<serde_json::Value, OperationError> {
            Ok(serde_json::json!({"ok": true}))
        }
    }

    fn full_gateway(dir: &std::path::Path) -> Arc<CallGateway> {
        let mut gateway = CallGateway::new(AuditLog::new(dir.to_path_buf()));
        for kind in [
            OperationKind::SendMessage,
            OperationKind::BookSlot,
            OperationKind::CapturePayment,
            OperationKind::SendReminder,
        ] {
            gateway.register(Arc::new(OkOperation(kind)));
        }
        Arc::new(gateway)
    }

    fn view() -> MemoryView {
        MemoryView::new(Arc::new(InMemoryBackend::new()), "org-a", Uuid::new_v4())
    }

    fn lead_context(score: u64) -> HandoffContext {
        HandoffContext::empty()
            .with_extra("score", serde_json::json!(score))
            .with_extra("contact", serde_json::json!("john@example.com"))
            .with_extra("name", serde_json::json!("John"))
    }

    #[tokio::test]
    async fn test_qualified_lead_hands_off_to_scheduling() {
        let tmp = tempfile::tempdir().unwrap();
        let worker = LeadResponseWorker::new(full_gateway(tmp.path()));
        let entity = Entity::new("org-a", WorkflowKind::Lead);

        let decision = worker.act(&entity, &view(), &lead_context(8)).await.unwrap();
        match decision {
            Decision::Handoff { next, context } => {
                assert_eq!(next, WorkerKind::Scheduling);
                assert!(context.validate_for(WorkerKind::Scheduling).is_ok());
                assert_eq!(context.decision.as_deref(), Some("qualified"));
            }
            other => panic!("expected handoff, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unqualified_lead_declined() {
        let tmp = tempfile::tempdir().unwrap();
        let worker = LeadResponseWorker::new(full_gateway(tmp.path()));
        let entity = Entity::new("org-a", WorkflowKind::Lead);

        let decision = worker.act(&entity, &view(), &lead_context(3)).await.unwrap();
        assert!(matches!(
            decision,
            Decision::Terminate(RunOutcome::Abandoned)
        ));
    }

    #[tokio::test]
    async fn test_lead_without_score_waits() {
        let tmp = tempfile::tempdir().unwrap();
        let worker = LeadResponseWorker::new(full_gateway(tmp.path()));
        let entity = Entity::new("org-a", WorkflowKind::Lead);

        let decision = worker
            .act(&entity, &view(), &HandoffContext::empty())
            .await
            .unwrap();
        assert!(matches!(
            decision,
            Decision::Terminate(RunOutcome::Completed)
        ));
    }

    #[tokio::test]
    async fn test_scheduling_books_and_hands_to_billing() {
        let tmp = tempfile::tempdir().unwrap();
        let worker = SchedulingWorker::new(full_gateway(tmp.path()));
        let entity = Entity::new("org-a", WorkflowKind::Lead);
        let context = HandoffContext::empty()
            .with_counterpart("cust_81", "John")
            .with_contact("john@example.com")
            .with_decision("qualified");

        let decision = worker.act(&entity, &view(), &context).await.unwrap();
        match decision {
            Decision::Handoff { next, context } => {
                assert_eq!(next, WorkerKind::Billing);
                assert_eq!(context.decision.as_deref(), Some("booked"));
                assert!(context.extra.contains_key("booking_ref"));
            }
            other => panic!("expected handoff, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_billing_captures_after_booking() {
        let tmp = tempfile::tempdir().unwrap();
        let worker = BillingWorker::new(full_gateway(tmp.path()));
        let entity = Entity::new("org-a", WorkflowKind::Lead);
        let context = HandoffContext::empty()
            .with_counterpart("cust_81", "John")
            .with_decision("booked")
            .with_extra("booking_ref", serde_json::json!("appt_1182"));

        let decision = worker.act(&entity, &view(), &context).await.unwrap();
        assert!(matches!(
            decision,
            Decision::Terminate(RunOutcome::Completed)
        ));
    }

    #[tokio::test]
    async fn test_billing_sends_reminder_without_booking_context() {
        let tmp = tempfile::tempdir().unwrap();
        let worker = BillingWorker::new(full_gateway(tmp.path()));
        let mut entity = Entity::new("org-a", WorkflowKind::Engagement);
        entity
            .attempt_counters
            .insert(REMINDER_ACTION.to_string(), 2);

        let decision = worker
            .act(&entity, &view(), &HandoffContext::empty())
            .await
            .unwrap();
        assert!(matches!(
            decision,
            Decision::Terminate(RunOutcome::Completed)
        ));
    }
}
