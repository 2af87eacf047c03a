use crate::state::EntityState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Counter name for reminder attempts, used by the scheduler's cadence
/// arithmetic and the escalation threshold.
pub const REMINDER_ACTION: &str = "reminder";

/// Which workflow shape applies to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    /// A prospective customer being qualified and scheduled.
    Lead,
    /// A document-collection case with a completion deadline.
    DocumentCase,
    /// A billable engagement moving toward payment.
    Engagement,
}

impl std::fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowKind::Lead => write!(f, "lead"),
            WorkflowKind::DocumentCase => write!(f, "document_case"),
            WorkflowKind::Engagement => write!(f, "engagement"),
        }
    }
}

/// The business object driven through a workflow.
///
/// Created on first trigger, mutated only through the entity store in
/// response to committed run outcomes, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Opaque unique identifier.
    pub entity_id: Uuid,
    /// Tenant partition. Every query is scoped to this.
    pub org_id: String,
    /// Which workflow applies.
    pub kind: WorkflowKind,
    /// Current lifecycle state.
    pub state: EntityState,
    /// When the entity was created.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
    /// Count per action type (reminders sent, booking attempts).
    #[serde(default)]
    pub attempt_counters: HashMap<String, u32>,
    /// Optional deadline driving at-risk detection and escalation.
    pub deadline: Option<DateTime<Utc>>,
    /// Set when a guard trip or fatal error left this entity needing an
    /// operator's attention.
    #[serde(default)]
    pub manual_review: bool,
}

impl Entity {
    /// Creates a fresh entity in [`EntityState::New`].
    pub fn new(org_id: impl Into<String>, kind: WorkflowKind) -> Self {
        let now = Utc::now();
        Self {
            entity_id: Uuid::new_v4(),
            org_id: org_id.into(),
            kind,
            state: EntityState::New,
            created_at: now,
            updated_at: now,
            attempt_counters: HashMap::new(),
            deadline: None,
            manual_review: false,
        }
    }

    /// Sets the deadline.
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// The current count for an action type, zero if never attempted.
    pub fn counter(&self, action: &str) -> u32 {
        self.attempt_counters.get(action).copied().unwrap_or(0)
    }
}
