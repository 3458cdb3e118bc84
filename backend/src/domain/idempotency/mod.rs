//! Idempotency primitives for safe request retries.
//!
//! - [`IdempotencyKey`]: opaque token sent by clients in the configured
//!   header (`Idempotency-Key` by default).
//! - [`IdempotencyRecord`] and [`StoredResponse`]: the first successful
//!   response for a key, replayed to later requests until the record expires.
//! - [`IdempotencyLookupResult`] and [`ReservationOutcome`]: what the store
//!   reports for a key.
//! - [`IdempotencyConfig`]: header name, retention period, store-failure
//!   policy and guard mode.
//!
//! Per key the life cycle is `unseen -> stored -> expired`. In
//! [`GuardMode::Reserve`] a key additionally passes through `reserved`
//! while its first request runs.

mod config;
mod key;
mod record;

pub use config::{
    DEFAULT_IDEMPOTENCY_HEADER, DefaultIdempotencyEnv, FailurePolicy, GuardMode,
    IDEMPOTENCY_TTL_HOURS_ENV, IdempotencyConfig, IdempotencyEnv, UnknownSettingError,
};
pub use key::{IdempotencyKey, IdempotencyKeyValidationError};
pub use record::{
    IdempotencyLookupResult, IdempotencyRecord, ReservationOutcome, StoredResponse, expiry_cutoff,
    expiry_of,
};
