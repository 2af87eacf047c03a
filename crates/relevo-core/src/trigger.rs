use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What caused an orchestration run to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// An inbound message from the counterpart (reply, question).
    InboundMessage,
    /// A form submission (new lead, document upload).
    FormSubmission,
    /// A timer fired by the reminder/escalation scheduler.
    Scheduled,
    /// An operator started the run by hand.
    Manual,
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerKind::InboundMessage => write!(f, "inbound_message"),
            TriggerKind::FormSubmission => write!(f, "form_submission"),
            TriggerKind::Scheduled => write!(f, "scheduled"),
            TriggerKind::Manual => write!(f, "manual"),
        }
    }
}

/// The event that starts an orchestration run.
///
/// Inbound events and scheduler wakes present the same shape, so the engine
/// has a single entry point for both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    /// The entity this run acts on.
    pub entity_id: Uuid,
    /// Tenant partition. Every downstream read is scoped to this.
    pub org_id: String,
    /// The interaction session the run belongs to.
    pub session_id: Uuid,
    /// What caused the run.
    pub kind: TriggerKind,
    /// Kind-specific payload (message text, counter snapshot, ...).
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Trigger {
    /// Creates a trigger with an empty payload.
    pub fn new(
        entity_id: Uuid,
        org_id: impl Into<String>,
        session_id: Uuid,
        kind: TriggerKind,
    ) -> Self {
        Self {
            entity_id,
            org_id: org_id.into(),
            session_id,
            kind,
            payload: serde_json::Value::Null,
        }
    }

    /// Attaches a payload to the trigger.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// The reminder-counter snapshot carried by a scheduled wake, if any.
    ///
    /// Scheduled triggers embed the `attempt_counters["reminder"]` value the
    /// scheduler observed when the wake was enqueued; the engine compares it
    /// against the live counter before doing any work.
    pub fn expected_reminders(&self) -> Option<u32> {
        self.payload
            .get("expected_reminders")
            .and_then(serde_json::Value::as_u64)
            .map(|n| n as u32)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_roundtrip() {
        let trigger = Trigger::new(
            Uuid::new_v4(),
            "org-a",
            Uuid::new_v4(),
            TriggerKind::InboundMessage,
        )
        .with_payload(serde_json::json!({"text": "my AC stopped working"}));

        let json = serde_json::to_string(&trigger).unwrap();
        let parsed: Trigger = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.kind, TriggerKind::InboundMessage);
        assert_eq!(parsed.org_id, "org-a");
        assert_eq!(parsed.payload["text"], "my AC stopped working");
    }

    #[test]
    fn test_expected_reminders_from_scheduled_payload() {
        let trigger = Trigger::new(
            Uuid::new_v4(),
            "org-a",
            Uuid::new_v4(),
            TriggerKind::Scheduled,
        )
        .with_payload(serde_json::json!({"expected_reminders": 2}));

        assert_eq!(trigger.expected_reminders(), Some(2));
    }

    #[test]
    fn test_expected_reminders_absent() {
        let trigger = Trigger::new(Uuid::new_v4(), "org-a", Uuid::new_v4(), TriggerKind::Manual);
        assert_eq!(trigger.expected_reminders(), None);
    }
}
