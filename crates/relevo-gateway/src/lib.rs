//! Idempotent external-call gateway for the Relevo workflow engine.
//!
//! Every side-effecting operation (send a message, book a slot, charge a
//! card) goes through [`CallGateway::invoke`], which wraps it with an
//! idempotency cache, a retry policy for transient failures, and an audit
//! record per attempt. A retried call with the same key returns the stored
//! result instead of re-executing the side effect — at-least-once delivery
//! with deduplication, not exactly-once.
//!
//! Workers never see raw transport errors: every invocation resolves to a
//! normalized [`CallResult`] and the worker decides whether to try another
//! approach or terminate.
//!
//! # Main types
//!
//! - [`ExternalOperation`] — Trait each side-effecting action implements.
//! - [`IdempotencyCache`] — `(key, kind) -> result` table with TTL.
//! - [`CallGateway`] — The retry + dedup + audit wrapper.
//! - [`AuditLog`] — Append-only JSONL record of every attempt.

/// Append-only audit log of gateway invocations.
pub mod audit;
/// The gateway itself: dedup, retry, normalization.
pub mod gateway;
/// The idempotency-record table.
pub mod idempotency;
/// External operation trait and error classification.
pub mod operation;

pub use audit::{AuditLog, AuditOutcome, AuditRecord};
pub use gateway::{CallGateway, CallResult, RetryPolicy};
pub use idempotency::{derive_key, IdempotencyCache};
pub use operation::{ExternalOperation, OperationError, OperationKind};
