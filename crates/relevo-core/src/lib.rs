//! Core types and error definitions for the Relevo workflow engine.
//!
//! This crate provides the foundational types shared across all Relevo
//! crates: error handling, run triggers, handoff contexts, and the
//! terminal outcomes a run can reach.
//!
//! # Main types
//!
//! - [`RelevoError`] — Unified error enum for all Relevo subsystems.
//! - [`RelevoResult`] — Convenience alias for `Result<T, RelevoError>`.
//! - [`Trigger`] — The event that starts an orchestration run.
//! - [`WorkerKind`] — The fixed set of specialized workers.
//! - [`HandoffContext`] — The typed payload carried across a handoff.
//! - [`RunOutcome`] — The terminal outcome of a run.

/// Handoff context and per-worker schema validation.
pub mod context;
/// Run triggers and trigger kinds.
pub mod trigger;

pub use context::{HandoffContext, WorkerKind};
pub use trigger::{Trigger, TriggerKind};

use serde::{Deserialize, Serialize};

// --- Error types ---

/// Top-level error type for the Relevo engine.
///
/// Each variant corresponds to a subsystem that can produce errors.
/// Handoff-schema violations surface as [`RelevoError::Validation`] and are
/// fatal for the run; state-machine races surface as [`RelevoError::Conflict`]
/// and are resolved by reloading and recomputing.
#[derive(Debug, thiserror::Error)]
pub enum RelevoError {
    /// An error from the handoff engine's run loop.
    #[error("Orchestrator error: {0}")]
    Orchestrator(String),

    /// An error from the shared memory store.
    #[error("Memory error: {0}")]
    Memory(String),

    /// An error from the entity lifecycle manager.
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    /// An error from the idempotent call gateway.
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// An error from the reminder/escalation scheduler.
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// A handoff context failed schema validation for its target worker.
    /// Fatal and non-retryable for the run that produced it.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An optimistic-concurrency conflict: the stored state differed from
    /// the state the caller expected. Reload and recompute.
    #[error("State conflict: {0}")]
    Conflict(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelevoError {
    /// Whether this error is an optimistic-concurrency conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, RelevoError::Conflict(_))
    }
}

/// A convenience `Result` alias using [`RelevoError`].
pub type RelevoResult<T> = Result<T, RelevoError>;

// --- Run outcomes ---

/// The terminal outcome of an orchestration run.
///
/// Workers may emit `Completed`, `Abandoned`, or `Error` through a
/// `Terminate` decision. The engine itself produces the guard-trip and
/// no-op variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// The workflow step finished its goal for this run.
    Completed,
    /// The counterpart explicitly abandoned the workflow.
    Abandoned,
    /// A worker gave up after a non-retryable failure.
    Error {
        /// Human-readable reason, surfaced to the operator.
        reason: String,
    },
    /// The wall-clock guard tripped; the run was forcibly terminated.
    Timeout,
    /// The handoff-count guard tripped; two workers were bouncing control.
    HandoffLimitExceeded,
    /// A scheduled wake found the entity already progressed past its
    /// counter snapshot; the run performed no work.
    StaleWake,
    /// The per-entity lease could not be acquired in time; the trigger
    /// should be re-enqueued, not failed.
    Deferred,
}

impl RunOutcome {
    /// Whether this outcome was forced by a guard rather than decided by a worker.
    pub fn is_guard_trip(&self) -> bool {
        matches!(self, RunOutcome::Timeout | RunOutcome::HandoffLimitExceeded)
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Completed => write!(f, "completed"),
            RunOutcome::Abandoned => write!(f, "abandoned"),
            RunOutcome::Error { reason } => write!(f, "error: {reason}"),
            RunOutcome::Timeout => write!(f, "timeout"),
            RunOutcome::HandoffLimitExceeded => write!(f, "handoff_limit_exceeded"),
            RunOutcome::StaleWake => write!(f, "stale_wake"),
            RunOutcome::Deferred => write!(f, "deferred"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_detection() {
        let err = RelevoError::Conflict("expected qualifying, found active".into());
        assert!(err.is_conflict());
        let err = RelevoError::Memory("miss".into());
        assert!(!err.is_conflict());
    }

    #[test]
    fn test_outcome_guard_trips() {
        assert!(RunOutcome::Timeout.is_guard_trip());
        assert!(RunOutcome::HandoffLimitExceeded.is_guard_trip());
        assert!(!RunOutcome::Completed.is_guard_trip());
        assert!(!RunOutcome::StaleWake.is_guard_trip());
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = RunOutcome::Error {
            reason: "payment declined".to_string(),
        };
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("payment declined"));
        let parsed: RunOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, outcome);
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(RunOutcome::Completed.to_string(), "completed");
        assert_eq!(
            RunOutcome::HandoffLimitExceeded.to_string(),
            "handoff_limit_exceeded"
        );
    }
}
