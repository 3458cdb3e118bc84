//! Port abstraction for idempotency record persistence.
//!
//! Adapters are constructed with the retention period and must never report
//! a record or reservation older than it. Expired entries are removed by
//! [`IdempotencyStore::cleanup_expired`], which the sweeper calls on a fixed
//! interval; adapters with native key expiry may treat it as a no-op.

use async_trait::async_trait;

use crate::domain::idempotency::{
    IdempotencyKey, IdempotencyLookupResult, IdempotencyRecord, ReservationOutcome,
};

use super::define_port_error;

define_port_error! {
    /// Errors raised by idempotency store adapters.
    pub enum IdempotencyStoreError {
        /// The backing store could not be reached.
        Connection { message: String } => "idempotency store connection failed: {message}",
        /// A query or mutation failed.
        Query { message: String } => "idempotency store query failed: {message}",
        /// A stored response could not be encoded or decoded.
        Serialization { message: String } => "idempotency store serialization failed: {message}",
        /// A record already exists for the key (lost a concurrent insert).
        DuplicateKey { key: String } => "idempotency key already stored: {key}",
    }
}

/// Port for storing and replaying idempotency records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Look up the live record or reservation for `key`.
    async fn lookup(
        &self,
        key: &IdempotencyKey,
    ) -> Result<IdempotencyLookupResult, IdempotencyStoreError>;

    /// Insert a record.
    ///
    /// Replaces a reservation for the same key. Fails with
    /// [`IdempotencyStoreError::DuplicateKey`] when a live record already
    /// exists; records are never updated.
    async fn store(&self, record: &IdempotencyRecord) -> Result<(), IdempotencyStoreError>;

    /// Atomically claim `key` for a request that is about to run.
    async fn reserve(
        &self,
        key: &IdempotencyKey,
    ) -> Result<ReservationOutcome, IdempotencyStoreError>;

    /// Drop a reservation so the key can be retried. Stored records are
    /// left untouched.
    async fn release(&self, key: &IdempotencyKey) -> Result<(), IdempotencyStoreError>;

    /// Delete expired records and reservations, returning how many went.
    async fn cleanup_expired(&self) -> Result<u64, IdempotencyStoreError>;
}
