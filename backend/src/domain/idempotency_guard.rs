//! Idempotency guard deciding whether a request runs, replays or is rejected.
//!
//! The guard is transport agnostic: the HTTP middleware calls [`begin`]
//! before the handler and [`complete`] (or [`abandon`]) once the response is
//! known. In [`GuardMode::Replay`] two concurrent first requests with the
//! same key can both run the handler; the second insert loses with
//! [`IdempotencyStoreError::DuplicateKey`] and is ignored.
//!
//! [`begin`]: IdempotencyGuard::begin
//! [`complete`]: IdempotencyGuard::complete
//! [`abandon`]: IdempotencyGuard::abandon

use std::sync::Arc;

use mockable::Clock;
use tracing::{debug, warn};

use crate::domain::Error;
use crate::domain::idempotency::{
    FailurePolicy, GuardMode, IdempotencyConfig, IdempotencyKey, IdempotencyLookupResult,
    IdempotencyRecord, ReservationOutcome, StoredResponse,
};
use crate::domain::ports::{IdempotencyMetrics, IdempotencyStore, IdempotencyStoreError};

/// Message returned with `409` when a key is reserved by a running request.
pub const KEY_IN_PROGRESS_MESSAGE: &str = "request with this idempotency key is already in progress";

/// What to do with an incoming request.
#[derive(Debug)]
pub enum GuardDecision {
    /// No usable key, or the store failed open: run the handler unguarded.
    PassThrough,
    /// Replay this record without running the handler.
    Replay(IdempotencyRecord),
    /// Run the handler, then report back with the ticket.
    Proceed(GuardTicket),
    /// Refuse the request.
    Reject(Error),
}

/// Proof that a request is running under a key.
#[derive(Debug)]
#[must_use = "complete or abandon the ticket once the handler has finished"]
pub struct GuardTicket {
    key: IdempotencyKey,
    reserved: bool,
}

impl GuardTicket {
    /// Key the request runs under.
    pub fn key(&self) -> &IdempotencyKey {
        &self.key
    }

    /// Whether the key is reserved in the store.
    pub fn is_reserved(&self) -> bool {
        self.reserved
    }
}

/// Coordinates the store, metrics and clock for idempotent requests.
#[derive(Clone)]
pub struct IdempotencyGuard {
    store: Arc<dyn IdempotencyStore>,
    metrics: Arc<dyn IdempotencyMetrics>,
    clock: Arc<dyn Clock>,
    config: IdempotencyConfig,
}

impl IdempotencyGuard {
    /// Build a guard.
    pub fn new(
        store: Arc<dyn IdempotencyStore>,
        metrics: Arc<dyn IdempotencyMetrics>,
        clock: Arc<dyn Clock>,
        config: IdempotencyConfig,
    ) -> Self {
        Self {
            store,
            metrics,
            clock,
            config,
        }
    }

    /// Guard configuration.
    pub fn config(&self) -> &IdempotencyConfig {
        &self.config
    }

    /// Decide how to handle a request carrying `key`.
    pub async fn begin(&self, key: Option<IdempotencyKey>) -> GuardDecision {
        let Some(key) = key else {
            return GuardDecision::PassThrough;
        };
        match self.config.mode() {
            GuardMode::Replay => self.begin_replay(key).await,
            GuardMode::Reserve => self.begin_reserve(key).await,
        }
    }

    async fn begin_replay(&self, key: IdempotencyKey) -> GuardDecision {
        match self.store.lookup(&key).await {
            Ok(IdempotencyLookupResult::Stored(record)) => self.replay(record).await,
            Ok(IdempotencyLookupResult::NotFound | IdempotencyLookupResult::Reserved) => {
                let _ = self.metrics.record_miss().await;
                GuardDecision::Proceed(GuardTicket {
                    key,
                    reserved: false,
                })
            }
            Err(error) => self.store_unavailable(&key, &error),
        }
    }

    async fn begin_reserve(&self, key: IdempotencyKey) -> GuardDecision {
        match self.store.reserve(&key).await {
            Ok(ReservationOutcome::Acquired) => {
                let _ = self.metrics.record_miss().await;
                GuardDecision::Proceed(GuardTicket {
                    key,
                    reserved: true,
                })
            }
            Ok(ReservationOutcome::AlreadyStored(record)) => self.replay(record).await,
            Ok(ReservationOutcome::AlreadyReserved) => {
                debug!(key = %key.fingerprint(), "idempotency key already reserved");
                let _ = self.metrics.record_conflict().await;
                GuardDecision::Reject(Error::conflict(KEY_IN_PROGRESS_MESSAGE))
            }
            Err(error) => self.store_unavailable(&key, &error),
        }
    }

    async fn replay(&self, record: IdempotencyRecord) -> GuardDecision {
        debug!(key = %record.key.fingerprint(), "replaying stored response");
        let _ = self.metrics.record_hit().await;
        GuardDecision::Replay(record)
    }

    fn store_unavailable(&self, key: &IdempotencyKey, error: &IdempotencyStoreError) -> GuardDecision {
        match self.config.failure_policy() {
            FailurePolicy::FailOpen => {
                warn!(key = %key.fingerprint(), error = %error, "idempotency store unavailable; running request unguarded");
                GuardDecision::PassThrough
            }
            FailurePolicy::FailClosed => {
                warn!(key = %key.fingerprint(), error = %error, "idempotency store unavailable; rejecting request");
                GuardDecision::Reject(Error::service_unavailable(
                    "idempotency store is unavailable",
                ))
            }
        }
    }

    /// Record the handler's outcome.
    ///
    /// Storable responses (2xx, non-empty body) are persisted; anything else
    /// releases a reservation. Store failures are logged, never returned.
    pub async fn complete(&self, ticket: GuardTicket, status: u16, response: StoredResponse) {
        if !StoredResponse::is_storable(status, &response.body) {
            debug!(key = %ticket.key.fingerprint(), status, "response not stored for replay");
            self.abandon(ticket).await;
            return;
        }

        let record = IdempotencyRecord::new(ticket.key, response, self.clock.utc());
        match self.store.store(&record).await {
            Ok(()) => {
                let _ = self.metrics.record_stored().await;
            }
            Err(IdempotencyStoreError::DuplicateKey { .. }) => {
                debug!(key = %record.key.fingerprint(), "idempotency record already stored by a concurrent request");
            }
            Err(error) => {
                warn!(key = %record.key.fingerprint(), error = %error, "failed to store idempotency record");
                let _ = self.metrics.record_store_failure().await;
                if ticket.reserved {
                    self.release(&record.key).await;
                }
            }
        }
    }

    /// Give up on a ticket without storing anything.
    pub async fn abandon(&self, ticket: GuardTicket) {
        if ticket.reserved {
            self.release(&ticket.key).await;
        }
    }

    async fn release(&self, key: &IdempotencyKey) {
        if let Err(error) = self.store.release(key).await {
            warn!(key = %key.fingerprint(), error = %error, "failed to release idempotency reservation");
        }
    }
}

#[cfg(test)]
mod tests;
