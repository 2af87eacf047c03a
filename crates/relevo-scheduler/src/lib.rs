//! Reminder/escalation scheduling for the Relevo workflow engine.
//!
//! Computes, from entity state and the org's cadence configuration, when
//! the next proactive action is due, and enqueues a trigger for that time.
//! Each scheduled wake carries the reminder-counter snapshot it was
//! computed from; the engine no-ops a wake whose snapshot is stale, so a
//! human acting first never causes a duplicate nudge.
//!
//! # Main types
//!
//! - [`Cadence`] — Ordered day offsets from the Preference layer.
//! - [`ScheduledWake`] / [`WakeQueue`] — Pending wakes ordered by due time.
//! - [`Scheduler`] — Background loop draining due wakes into a trigger
//!   channel.

/// Cadence offsets and preference parsing.
pub mod cadence;
/// The background drain loop and wake planning.
pub mod scheduler;
/// Scheduled wakes and the due-time queue.
pub mod wake;

pub use cadence::{cadence_for_org, Cadence};
pub use scheduler::{plan_wake, Scheduler};
pub use wake::{ScheduledWake, WakeQueue};
