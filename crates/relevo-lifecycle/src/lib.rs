//! Entity lifecycle management for the Relevo workflow engine.
//!
//! Owns the state machine each tracked entity moves through and persists
//! its transitions with optimistic concurrency: a transition names the
//! state the caller believes is current, and loses with a `Conflict` if
//! the store disagrees. Entities are never deleted — terminal states are
//! retained for audit.
//!
//! Side effects of a transition are declarative: entering `AtRisk` or
//! `Escalated` is data the scheduler reads, not an action this crate takes.
//!
//! # Main types
//!
//! - [`Entity`] — The business object driven through a workflow.
//! - [`EntityState`] — The lifecycle state machine.
//! - [`EntityStore`] — Trait for entity persistence with CAS transitions.
//! - [`InMemoryEntityStore`] — RwLock-based store implementation.
//! - [`RiskPolicy`] / [`assess`] — Deadline- and counter-driven risk moves.

/// The entity record and workflow kinds.
pub mod entity;
/// Deadline/counter risk assessment.
pub mod risk;
/// The lifecycle state machine.
pub mod state;
/// Entity persistence with optimistic concurrency.
pub mod store;

pub use entity::{Entity, WorkflowKind, REMINDER_ACTION};
pub use risk::{assess, RiskPolicy};
pub use state::EntityState;
pub use store::{EntityStore, InMemoryEntityStore, TransitionRecord};
