//! Domain primitives, services and ports.
//!
//! Purpose: keep request deduplication, realtime relaying and the ledger
//! free of transport and storage concerns. Adapters live under
//! `crate::inbound` and `crate::outbound`.
//!
//! Public surface:
//! - Error / ErrorCode: transport agnostic error payload.
//! - IdempotencyGuard: decides whether a keyed request runs or replays.
//! - IdempotencySweeper: periodic removal of expired records.
//! - RealtimeRelay: client-side realtime connection manager.
//! - TransactionService: records ledger transactions and announces them.
//! - TraceId: request correlation identifier.

pub mod error;
pub mod idempotency;
pub mod idempotency_guard;
pub mod idempotency_sweeper;
pub mod ports;
pub mod realtime;
pub mod trace_id;
pub mod transactions;

pub use self::error::{Error, ErrorCode};
pub use self::idempotency_guard::{GuardDecision, GuardTicket, IdempotencyGuard};
pub use self::idempotency_sweeper::IdempotencySweeper;
pub use self::realtime::RealtimeRelay;
pub use self::trace_id::{TRACE_ID_HEADER, TraceId};
pub use self::transactions::{
    Transaction, TransactionDraft, TransactionId, TransactionKind, TransactionService,
};

/// Convenient API result alias.
///
/// # Examples
/// ```
/// use mfi_backend::domain::{ApiResult, Error};
///
/// fn handler() -> ApiResult<()> {
///     Err(Error::not_found("no such transaction"))
/// }
/// assert!(handler().is_err());
/// ```
pub type ApiResult<T> = Result<T, Error>;
