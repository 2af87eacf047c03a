use crate::{RelevoError, RelevoResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// The specialized workers control can be handed to.
///
/// Each kind covers one stage of the workflow: responding to and qualifying
/// a new counterpart, booking the fulfillment slot, and collecting payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerKind {
    /// Responds to inbound inquiries and qualifies the counterpart.
    LeadResponse,
    /// Books fulfillment slots and sends confirmations.
    Scheduling,
    /// Generates invoices, collects payment, sends reminders.
    Billing,
}

impl WorkerKind {
    /// The handoff-context fields a worker of this kind cannot run without.
    ///
    /// A handoff targeting this kind is rejected by the engine when any of
    /// these is missing — retrying would only repeat the same invalid query.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            WorkerKind::LeadResponse => &[],
            WorkerKind::Scheduling => &["counterpart_id", "contact"],
            WorkerKind::Billing => &["counterpart_id", "decision"],
        }
    }
}

impl std::fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerKind::LeadResponse => write!(f, "lead_response"),
            WorkerKind::Scheduling => write!(f, "scheduling"),
            WorkerKind::Billing => write!(f, "billing"),
        }
    }
}

/// The typed payload passed between workers on a handoff.
///
/// Carries everything the next worker needs so it never has to re-ask the
/// counterpart: who they are, how to reach them, the decision just made,
/// and pointers into the memory store for deeper context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HandoffContext {
    /// Identity of the counterpart being driven through the workflow.
    pub counterpart_id: Option<String>,
    /// Display name, when known.
    pub counterpart_name: Option<String>,
    /// How to reach the counterpart (email, phone).
    pub contact: Option<String>,
    /// The decision the previous worker just made ("qualified", "booked").
    pub decision: Option<String>,
    /// Memory records relevant to the next worker.
    #[serde(default)]
    pub memory_refs: Vec<Uuid>,
    /// Workflow-specific fields that have no dedicated slot.
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl HandoffContext {
    /// An empty context, valid only for entry-point workers.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Sets the counterpart identity.
    pub fn with_counterpart(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.counterpart_id = Some(id.into());
        self.counterpart_name = Some(name.into());
        self
    }

    /// Sets the contact field.
    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = Some(contact.into());
        self
    }

    /// Sets the decision field.
    pub fn with_decision(mut self, decision: impl Into<String>) -> Self {
        self.decision = Some(decision.into());
        self
    }

    /// Adds a workflow-specific extra field.
    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Whether the named field is present and non-empty.
    fn has_field(&self, name: &str) -> bool {
        let slot = match name {
            "counterpart_id" => &self.counterpart_id,
            "counterpart_name" => &self.counterpart_name,
            "contact" => &self.contact,
            "decision" => &self.decision,
            _ => return self.extra.contains_key(name),
        };
        slot.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// Validates this context against the schema required by the target
    /// worker kind.
    ///
    /// A handoff is never partial: if any required field is missing the
    /// whole handoff is rejected with a fatal [`RelevoError::Validation`].
    pub fn validate_for(&self, target: WorkerKind) -> RelevoResult<()> {
        let missing: Vec<&str> = target
            .required_fields()
            .iter()
            .copied()
            .filter(|f| !self.has_field(f))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(RelevoError::Validation(format!(
                "handoff to {target} missing required fields: {}",
                missing.join(", ")
            )))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_context_valid_for_entry_point() {
        let ctx = HandoffContext::empty();
        assert!(ctx.validate_for(WorkerKind::LeadResponse).is_ok());
    }

    #[test]
    fn test_empty_context_rejected_for_scheduling() {
        // A worker emitting Handoff(Scheduling, {}) must be stopped before
        // the scheduling worker ever runs.
        let ctx = HandoffContext::empty();
        let err = ctx.validate_for(WorkerKind::Scheduling).unwrap_err();
        assert!(matches!(err, RelevoError::Validation(_)));
        assert!(err.to_string().contains("counterpart_id"));
    }

    #[test]
    fn test_complete_context_accepted() {
        let ctx = HandoffContext::empty()
            .with_counterpart("cust_81", "John Meyer")
            .with_contact("john@example.com")
            .with_decision("qualified");
        assert!(ctx.validate_for(WorkerKind::Scheduling).is_ok());
        assert!(ctx.validate_for(WorkerKind::Billing).is_ok());
    }

    #[test]
    fn test_blank_string_counts_as_missing() {
        let mut ctx = HandoffContext::empty().with_contact("j@example.com");
        ctx.counterpart_id = Some(String::new());
        assert!(ctx.validate_for(WorkerKind::Scheduling).is_err());
    }

    #[test]
    fn test_extra_fields_satisfy_requirements() {
        // Unknown required names resolve through the extra map.
        let ctx = HandoffContext::empty()
            .with_counterpart("cust_81", "John")
            .with_contact("j@example.com")
            .with_extra("booking_ref", serde_json::json!("appt_1182"));
        assert!(ctx.has_field("booking_ref"));
    }

    #[test]
    fn test_context_roundtrip() {
        let ctx = HandoffContext::empty()
            .with_counterpart("cust_81", "John")
            .with_decision("qualified");
        let json = serde_json::to_string(&ctx).unwrap();
        let parsed: HandoffContext = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.counterpart_id.as_deref(), Some("cust_81"));
        assert_eq!(parsed.decision.as_deref(), Some("qualified"));
    }

    #[test]
    fn test_worker_kind_display() {
        assert_eq!(WorkerKind::LeadResponse.to_string(), "lead_response");
        assert_eq!(WorkerKind::Scheduling.to_string(), "scheduling");
        assert_eq!(WorkerKind::Billing.to_string(), "billing");
    }
}
