//! The Relevo handoff engine.
//!
//! Drives one orchestration run: picks the active worker from entity
//! state, executes it, interprets its decision (`Continue`, `Handoff`,
//! `Terminate`), and repeats until a terminal outcome or a guard trips.
//! Handoffs form a bounded loop with an explicit counter — never mutual
//! recursion between workers — so two workers bouncing control livelock
//! into a forced abort instead of looping forever.
//!
//! Concurrency model: at most one active run per entity, enforced with a
//! TTL'd advisory lease; a run that cannot acquire the lease is deferred,
//! not failed. Cancellation is cooperative and checked between steps,
//! never mid-call.
//!
//! # Main types
//!
//! - [`Worker`] / [`Decision`] — The seam the reasoning layer implements.
//! - [`Engine`] — `run_step(trigger) -> RunReport`, guards included.
//! - [`LeaseTable`] — Per-entity advisory leases with TTL.
//! - [`RunMonitor`] — Per-worker metrics.
//! - [`workers`] — Deterministic reference workers for the built-in squad.

/// The run engine: guards, commit phase, state machine.
pub mod engine;
/// Per-entity advisory leases.
pub mod lease;
/// Per-worker metrics.
pub mod monitor;
/// The worker seam: trait, decisions, registry.
pub mod worker;
/// Reference workers for the lead/scheduling/billing squad.
pub mod workers;

pub use engine::{CancelToken, Engine, EngineState, RunConfig, RunReport};
pub use lease::LeaseTable;
pub use monitor::RunMonitor;
pub use worker::{worker_for_state, Decision, Worker, WorkerRegistry};
