use async_trait::async_trait;
use relevo_core::{HandoffContext, RelevoResult, RunOutcome, WorkerKind};
use relevo_lifecycle::{Entity, EntityState};
use relevo_memory::MemoryView;
use std::collections::HashMap;
use std::sync::Arc;

/// What a worker wants to happen next.
#[derive(Debug, Clone)]
pub enum Decision {
    /// The same worker wants another turn (e.g. to ask a follow-up).
    Continue,
    /// Transfer control to another worker, carrying context.
    Handoff {
        /// The worker to transfer to.
        next: WorkerKind,
        /// The context bundle the next worker runs with.
        context: HandoffContext,
    },
    /// End the run with the given outcome.
    Terminate(RunOutcome),
}

/// A specialized unit of execution.
///
/// The reasoning inside `act` — how the worker decides — is out of the
/// engine's scope; anything implementing this trait can be registered.
/// Workers read memory only through the org-scoped view and reach external
/// systems only through the gateway.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Which kind this worker implements.
    fn kind(&self) -> WorkerKind;

    /// One turn: observe and decide.
    async fn act(
        &self,
        entity: &Entity,
        view: &MemoryView,
        context: &HandoffContext,
    ) -> RelevoResult<Decision>;
}

/// The fixed mapping from entity state to the worker that acts on it.
///
/// Terminal states have no worker; a trigger for a terminal entity is a
/// no-op.
pub fn worker_for_state(state: EntityState) -> Option<WorkerKind> {
    match state {
        EntityState::New | EntityState::Qualifying => Some(WorkerKind::LeadResponse),
        EntityState::Active => Some(WorkerKind::Scheduling),
        EntityState::AwaitingFulfillment | EntityState::AtRisk | EntityState::Escalated => {
            Some(WorkerKind::Billing)
        }
        EntityState::Fulfilled | EntityState::Rejected | EntityState::ClosedLost => None,
    }
}

/// Registry of the workers available to the engine.
#[derive(Default)]
pub struct WorkerRegistry {
    workers: HashMap<WorkerKind, Arc<dyn Worker>>,
}

impl WorkerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a worker under its kind, replacing any previous one.
    pub fn register(&mut self, worker: Arc<dyn Worker>) {
        self.workers.insert(worker.kind(), worker);
    }

    /// The worker for a kind, if registered.
    pub fn get(&self, kind: WorkerKind) -> Option<Arc<dyn Worker>> {
        self.workers.get(&kind).cloned()
    }

    /// Number of registered workers.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Whether no workers are registered.
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}
