//! Layered shared memory for the Relevo workflow engine.
//!
//! Four namespaced layers behind one interface, each with its own
//! durability and TTL policy:
//!
//! - **Preference** — durable operator configuration (working hours,
//!   pricing, cadences). Read-mostly.
//! - **Semantic** — distilled facts from past interactions, expiring after
//!   a retention horizon, retrieved by relevance-ranked search.
//! - **Session** — the running summary of the current interaction,
//!   overwritten each run, short-lived.
//! - **Journal** — append-only log of anomalies and their resolutions.
//!
//! Every record carries its `org_id` and every read path requires one:
//! tenant isolation is enforced by the store API, not trusted from callers.
//!
//! # Main types
//!
//! - [`MemoryBackend`] — Trait for layered storage backends.
//! - [`InMemoryBackend`] — RwLock-based backend with a per-org fact index.
//! - [`MemoryView`] — Per-run read facade that degrades instead of failing.
//! - [`consolidate_session`] — Post-run distillation into the semantic layer.

/// Post-run consolidation of session summaries into durable facts.
pub mod consolidate;
/// Layer definitions and the memory record type.
pub mod layer;
/// Relevance-ranked retrieval over semantic facts.
pub mod semantic;
/// The backend trait and the in-memory implementation.
pub mod store;
/// The per-run read facade.
pub mod view;

pub use consolidate::consolidate_session;
pub use layer::{MemoryLayer, MemoryRecord};
pub use semantic::FactIndex;
pub use store::{InMemoryBackend, MemoryBackend};
pub use view::MemoryView;
