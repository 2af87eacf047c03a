use crate::lease::LeaseTable;
use crate::monitor::RunMonitor;
use crate::worker::{worker_for_state, Decision, WorkerRegistry};
use relevo_core::{
    HandoffContext, RelevoError, RelevoResult, RunOutcome, Trigger, TriggerKind, WorkerKind,
};
use relevo_lifecycle::{Entity, EntityState, EntityStore, REMINDER_ACTION};
use relevo_memory::{consolidate_session, MemoryBackend, MemoryLayer, MemoryView};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

/// Guard bounds and lease policy for a run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Hard cap on handoffs per run; exceeding it aborts the run.
    pub max_handoffs: u32,
    /// Wall-clock budget per run, suspended time included.
    pub run_timeout: Duration,
    /// How many consecutive turns one worker may take before the run is
    /// considered stuck.
    pub max_turns_per_worker: u32,
    /// TTL on the per-entity lease, so a crashed run cannot wedge its
    /// entity forever.
    pub lease_ttl: Duration,
    /// How long a run waits for the lease before deferring.
    pub lease_wait: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_handoffs: 16,
            run_timeout: Duration::from_secs(60),
            max_turns_per_worker: 8,
            lease_ttl: Duration::from_secs(30),
            lease_wait: Duration::from_millis(250),
        }
    }
}

/// Engine-level run state, distinct from the entity lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// Never started working (lease contention).
    Idle,
    /// A worker is taking turns.
    Running,
    /// Control is moving between workers.
    HandingOff,
    /// The run ended through a worker's decision.
    Terminated,
    /// A guard trip or fatal error forced the run to stop.
    Aborted,
}

/// Cooperative cancellation handle.
///
/// Checked between handoff steps and before gateway calls, never mid-call:
/// an in-flight external operation always completes and is recorded before
/// the run honors cancellation.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a token in the not-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What one run did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique id of this run.
    pub run_id: Uuid,
    /// The entity the run acted on.
    pub entity_id: Uuid,
    /// How the run ended.
    pub outcome: RunOutcome,
    /// Handoffs executed.
    pub handoffs: u32,
    /// Worker turns executed.
    pub turns: u32,
    /// Final engine state.
    pub engine_state: EngineState,
    /// Wall-clock duration.
    pub elapsed_ms: u64,
}

/// The handoff engine.
///
/// `run_step` drives one run: load entity and memory, invoke the active
/// worker, interpret its decision, loop until a terminal outcome or a
/// guard trips, then commit exactly one lifecycle transition, one session
/// overwrite, and a best-effort semantic consolidation.
pub struct Engine {
    registry: WorkerRegistry,
    entities: Arc<dyn EntityStore>,
    memory: Arc<dyn MemoryBackend>,
    leases: LeaseTable,
    monitor: Arc<RunMonitor>,
    config: RunConfig,
}

impl Engine {
    /// Creates an engine with the default [`RunConfig`].
    pub fn new(
        registry: WorkerRegistry,
        entities: Arc<dyn EntityStore>,
        memory: Arc<dyn MemoryBackend>,
    ) -> Self {
        let config = RunConfig::default();
        Self {
            registry,
            entities,
            memory,
            leases: LeaseTable::new(config.lease_ttl),
            monitor: Arc::new(RunMonitor::new()),
            config,
        }
    }

    /// Replaces the run configuration (and rebuilds the lease table to
    /// match its TTL).
    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.leases = LeaseTable::new(config.lease_ttl);
        self.config = config;
        self
    }

    /// The engine's metrics.
    pub fn monitor(&self) -> &Arc<RunMonitor> {
        &self.monitor
    }

    /// Runs one step without external cancellation.
    pub async fn run_step(&self, trigger: &Trigger) -> RelevoResult<RunReport> {
        self.run_step_cancellable(trigger, &CancelToken::new())
            .await
    }

    /// Runs one step, honoring the cancellation token between steps.
    pub async fn run_step_cancellable(
        &self,
        trigger: &Trigger,
        cancel: &CancelToken,
    ) -> RelevoResult<RunReport> {
        let started = Instant::now();
        let run_id = Uuid::new_v4();

        let Some(holder) = self
            .leases
            .acquire(trigger.entity_id, self.config.lease_wait)
            .await
        else {
            info!(run_id = %run_id, entity_id = %trigger.entity_id, "lease contended, deferring run");
            return Ok(RunReport {
                run_id,
                entity_id: trigger.entity_id,
                outcome: RunOutcome::Deferred,
                handoffs: 0,
                turns: 0,
                engine_state: EngineState::Idle,
                elapsed_ms: started.elapsed().as_millis() as u64,
            });
        };

        let result = self.drive(run_id, trigger, cancel, started).await;
        self.leases.release(trigger.entity_id, holder);
        result
    }

    async fn drive(
        &self,
        run_id: Uuid,
        trigger: &Trigger,
        cancel: &CancelToken,
        started: Instant,
    ) -> RelevoResult<RunReport> {
        let entity = self
            .entities
            .get(trigger.entity_id, &trigger.org_id)
            .await?
            .ok_or_else(|| {
                RelevoError::Orchestrator(format!("entity {} not found", trigger.entity_id))
            })?;

        let report = |outcome, handoffs, turns, engine_state| RunReport {
            run_id,
            entity_id: entity.entity_id,
            outcome,
            handoffs,
            turns,
            engine_state,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        if entity.state.is_terminal() {
            info!(run_id = %run_id, entity_id = %entity.entity_id, state = %entity.state,
                "trigger for terminal entity ignored");
            return Ok(report(RunOutcome::StaleWake, 0, 0, EngineState::Terminated));
        }

        // Stale-wake check: before any worker or tool call. A wake whose
        // counter snapshot the entity has already passed is a no-op.
        if trigger.kind == TriggerKind::Scheduled {
            if let Some(expected) = trigger.expected_reminders() {
                let live = entity.counter(REMINDER_ACTION);
                if live > expected {
                    info!(run_id = %run_id, entity_id = %entity.entity_id, expected, live,
                        "stale wake, skipping");
                    return Ok(report(RunOutcome::StaleWake, 0, 0, EngineState::Terminated));
                }
            }
        }

        let view = MemoryView::new(self.memory.clone(), &trigger.org_id, trigger.session_id);
        let mut context = initial_context(trigger);
        // Non-terminal states always map to a worker.
        let Some(mut active) = worker_for_state(entity.state) else {
            return Ok(report(RunOutcome::StaleWake, 0, 0, EngineState::Terminated));
        };

        info!(run_id = %run_id, entity_id = %entity.entity_id, worker = %active,
            trigger = %trigger.kind, "run started");

        let mut handoffs: u32 = 0;
        let mut turns: u32 = 0;
        let mut turns_with_active: u32 = 0;

        loop {
            if started.elapsed() > self.config.run_timeout {
                warn!(run_id = %run_id, entity_id = %entity.entity_id, "run timeout guard tripped");
                self.abort(run_id, trigger, &entity, active, "run timeout").await;
                return Ok(report(RunOutcome::Timeout, handoffs, turns, EngineState::Aborted));
            }

            if cancel.is_cancelled() {
                info!(run_id = %run_id, entity_id = %entity.entity_id, "run cancelled");
                let outcome = RunOutcome::Error {
                    reason: "cancelled by operator".to_string(),
                };
                self.commit(run_id, trigger, &entity, active, &context, &outcome)
                    .await;
                return Ok(report(outcome, handoffs, turns, EngineState::Terminated));
            }

            let Some(worker) = self.registry.get(active) else {
                self.abort(run_id, trigger, &entity, active, "no worker registered")
                    .await;
                let outcome = RunOutcome::Error {
                    reason: format!("no worker registered for {active}"),
                };
                return Ok(report(outcome, handoffs, turns, EngineState::Aborted));
            };

            if turns_with_active >= self.config.max_turns_per_worker {
                warn!(run_id = %run_id, worker = %active, "worker turn limit reached");
                self.abort(run_id, trigger, &entity, active, "worker turn limit reached")
                    .await;
                let outcome = RunOutcome::Error {
                    reason: format!("worker {active} exceeded its turn limit"),
                };
                return Ok(report(outcome, handoffs, turns, EngineState::Aborted));
            }

            let turn_started = Instant::now();
            let decision = worker.act(&entity, &view, &context).await;
            turns += 1;
            turns_with_active += 1;
            self.monitor.record_turn(active).await;
            self.monitor
                .record_duration(active, turn_started.elapsed().as_millis() as u64)
                .await;

            match decision {
                Err(e) => {
                    warn!(run_id = %run_id, worker = %active, error = %e, "worker turn failed");
                    self.monitor.record_error(active).await;
                    self.abort(run_id, trigger, &entity, active, &e.to_string()).await;
                    let outcome = RunOutcome::Error {
                        reason: e.to_string(),
                    };
                    return Ok(report(outcome, handoffs, turns, EngineState::Aborted));
                }
                Ok(Decision::Continue) => {
                    // Same worker, another turn.
                }
                Ok(Decision::Handoff { next, context: ctx }) => {
                    self.monitor.record_handoff(active).await;
                    handoffs += 1;

                    if handoffs > self.config.max_handoffs {
                        warn!(run_id = %run_id, handoffs, "handoff limit guard tripped");
                        self.abort(run_id, trigger, &entity, active, "handoff limit exceeded")
                            .await;
                        return Ok(report(
                            RunOutcome::HandoffLimitExceeded,
                            handoffs,
                            turns,
                            EngineState::Aborted,
                        ));
                    }

                    // Schema check before the target worker ever runs. An
                    // invalid context is fatal and not retried: a retry
                    // would only repeat the same query to an unprepared
                    // worker.
                    if let Err(e) = ctx.validate_for(next) {
                        warn!(run_id = %run_id, from = %active, to = %next, error = %e,
                            "handoff context rejected");
                        self.monitor.record_error(active).await;
                        self.abort(run_id, trigger, &entity, active, &e.to_string()).await;
                        let outcome = RunOutcome::Error {
                            reason: e.to_string(),
                        };
                        return Ok(report(outcome, handoffs, turns, EngineState::Aborted));
                    }

                    info!(run_id = %run_id, from = %active, to = %next, handoffs, "handoff");
                    active = next;
                    context = ctx;
                    turns_with_active = 0;
                }
                Ok(Decision::Terminate(outcome)) => {
                    self.commit(run_id, trigger, &entity, active, &context, &outcome)
                        .await;
                    return Ok(report(outcome, handoffs, turns, EngineState::Terminated));
                }
            }
        }
    }

    /// The commit phase of a terminating run: one lifecycle transition,
    /// one session overwrite, and a spawned best-effort consolidation.
    async fn commit(
        &self,
        run_id: Uuid,
        trigger: &Trigger,
        entity: &Entity,
        worker: WorkerKind,
        context: &HandoffContext,
        outcome: &RunOutcome,
    ) {
        if let Some(next) = advance(entity.state, trigger.kind, outcome) {
            match self
                .entities
                .transition(
                    entity.entity_id,
                    &entity.org_id,
                    entity.state,
                    next,
                    &outcome.to_string(),
                )
                .await
            {
                Ok(_) => {}
                Err(e) if e.is_conflict() => {
                    // Another run won the race (lease must have expired);
                    // the entity keeps the state that run committed.
                    warn!(run_id = %run_id, entity_id = %entity.entity_id, error = %e,
                        "commit transition lost a concurrent race");
                }
                Err(e) => {
                    warn!(run_id = %run_id, entity_id = %entity.entity_id, error = %e,
                        "commit transition failed");
                }
            }
        }

        // A completed scheduled run is a delivered nudge.
        if trigger.kind == TriggerKind::Scheduled && *outcome == RunOutcome::Completed {
            if let Err(e) = self
                .entities
                .increment_counter(entity.entity_id, &entity.org_id, REMINDER_ACTION)
                .await
            {
                warn!(run_id = %run_id, error = %e, "reminder counter increment failed");
            }
        }

        self.write_session_summary(trigger, worker, context, outcome, false)
            .await;

        // Consolidation is best-effort and off the critical path.
        let memory = self.memory.clone();
        let org_id = trigger.org_id.clone();
        let session_id = trigger.session_id;
        tokio::spawn(async move {
            if let Err(e) = consolidate_session(memory, &org_id, session_id).await {
                warn!(org_id, %session_id, error = %e, "semantic consolidation failed");
            }
        });

        info!(run_id = %run_id, entity_id = %entity.entity_id, outcome = %outcome, "run committed");
    }

    /// Forced termination: the entity keeps its last committed state and
    /// is flagged for an operator, with a journal entry explaining why.
    async fn abort(
        &self,
        run_id: Uuid,
        trigger: &Trigger,
        entity: &Entity,
        worker: WorkerKind,
        reason: &str,
    ) {
        if let Err(e) = self
            .entities
            .flag_for_review(entity.entity_id, &entity.org_id)
            .await
        {
            warn!(run_id = %run_id, error = %e, "manual-review flag failed");
        }

        if let Err(e) = self
            .memory
            .append(
                &entity.org_id,
                serde_json::json!({
                    "issue": reason,
                    "run_id": run_id,
                    "entity_id": entity.entity_id,
                    "worker": worker.to_string(),
                }),
            )
            .await
        {
            warn!(run_id = %run_id, error = %e, "journal append failed");
        }

        let outcome = RunOutcome::Error {
            reason: reason.to_string(),
        };
        self.write_session_summary(trigger, worker, &HandoffContext::empty(), &outcome, true)
            .await;
    }

    async fn write_session_summary(
        &self,
        trigger: &Trigger,
        worker: WorkerKind,
        context: &HandoffContext,
        outcome: &RunOutcome,
        aborted: bool,
    ) {
        let summary = serde_json::json!({
            "outcome": outcome.to_string(),
            "worker": worker.to_string(),
            "aborted": aborted,
            "facts": context.extra.get("facts"),
            "anomalies": context.extra.get("anomalies"),
        });
        if let Err(e) = self
            .memory
            .put(
                MemoryLayer::Session,
                &trigger.org_id,
                &trigger.session_id.to_string(),
                summary,
                None,
            )
            .await
        {
            warn!(org_id = %trigger.org_id, error = %e, "session summary write failed");
        }
    }
}

/// Seeds the first worker's context from the trigger payload.
fn initial_context(trigger: &Trigger) -> HandoffContext {
    let mut context = HandoffContext::empty();
    if let serde_json::Value::Object(map) = &trigger.payload {
        for (k, v) in map {
            context.extra.insert(k.clone(), v.clone());
        }
    }
    context
}

/// The single lifecycle transition a terminating run commits.
///
/// Scheduled runs are nudges: they increment the reminder counter but
/// never advance the lifecycle. Guard trips and errors commit nothing —
/// the entity stays in its last committed state.
fn advance(state: EntityState, trigger: TriggerKind, outcome: &RunOutcome) -> Option<EntityState> {
    if trigger == TriggerKind::Scheduled {
        return None;
    }
    match outcome {
        RunOutcome::Completed => match state {
            EntityState::New => Some(EntityState::Qualifying),
            EntityState::Qualifying => Some(EntityState::Active),
            EntityState::Active => Some(EntityState::AwaitingFulfillment),
            EntityState::AwaitingFulfillment => Some(EntityState::Fulfilled),
            _ => None,
        },
        RunOutcome::Abandoned => match state {
            EntityState::Qualifying => Some(EntityState::Rejected),
            s if !s.is_terminal() => Some(EntityState::ClosedLost),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = RunConfig::default();
        assert_eq!(config.max_handoffs, 16);
        assert_eq!(config.run_timeout, Duration::from_secs(60));
        assert!(config.lease_ttl > config.lease_wait);
    }

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_advance_happy_path() {
        use TriggerKind::InboundMessage;
        assert_eq!(
            advance(EntityState::New, InboundMessage, &RunOutcome::Completed),
            Some(EntityState::Qualifying)
        );
        assert_eq!(
            advance(EntityState::Qualifying, InboundMessage, &RunOutcome::Completed),
            Some(EntityState::Active)
        );
        assert_eq!(
            advance(EntityState::Active, InboundMessage, &RunOutcome::Completed),
            Some(EntityState::AwaitingFulfillment)
        );
        assert_eq!(
            advance(
                EntityState::AwaitingFulfillment,
                InboundMessage,
                &RunOutcome::Completed
            ),
            Some(EntityState::Fulfilled)
        );
    }

    #[test]
    fn test_advance_abandonment() {
        use TriggerKind::InboundMessage;
        assert_eq!(
            advance(EntityState::Qualifying, InboundMessage, &RunOutcome::Abandoned),
            Some(EntityState::Rejected)
        );
        assert_eq!(
            advance(EntityState::Active, InboundMessage, &RunOutcome::Abandoned),
            Some(EntityState::ClosedLost)
        );
        assert_eq!(
            advance(EntityState::New, InboundMessage, &RunOutcome::Abandoned),
            Some(EntityState::ClosedLost)
        );
    }

    #[test]
    fn test_scheduled_runs_never_advance() {
        assert_eq!(
            advance(
                EntityState::AwaitingFulfillment,
                TriggerKind::Scheduled,
                &RunOutcome::Completed
            ),
            None
        );
    }

    #[test]
    fn test_errors_commit_no_transition() {
        use TriggerKind::InboundMessage;
        let err = RunOutcome::Error {
            reason: "x".into(),
        };
        assert_eq!(advance(EntityState::Active, InboundMessage, &err), None);
        assert_eq!(
            advance(EntityState::Active, InboundMessage, &RunOutcome::Timeout),
            None
        );
    }

    #[test]
    fn test_initial_context_seeded_from_payload() {
        let trigger = Trigger::new(
            Uuid::new_v4(),
            "org-a",
            Uuid::new_v4(),
            TriggerKind::InboundMessage,
        )
        .with_payload(serde_json::json!({"score": 8, "contact": "j@example.com"}));

        let context = initial_context(&trigger);
        assert_eq!(context.extra["score"], 8);
        assert_eq!(context.extra["contact"], "j@example.com");
    }
}
