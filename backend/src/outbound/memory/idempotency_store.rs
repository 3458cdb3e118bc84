//! Process-local `IdempotencyStore` for single-instance deployments and
//! tests.
//!
//! Entries older than the ttl are invisible to every operation and removed
//! by [`IdempotencyStore::cleanup_expired`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockable::Clock;

use crate::domain::idempotency::{
    IdempotencyKey, IdempotencyLookupResult, IdempotencyRecord, ReservationOutcome,
    expiry_cutoff,
};
use crate::domain::ports::{IdempotencyStore, IdempotencyStoreError};

#[derive(Debug, Clone)]
enum Entry {
    Reserved { created_at: DateTime<Utc> },
    Stored(IdempotencyRecord),
}

impl Entry {
    fn created_at(&self) -> DateTime<Utc> {
        match self {
            Self::Reserved { created_at } => *created_at,
            Self::Stored(record) => record.created_at,
        }
    }
}

/// In-memory [`IdempotencyStore`].
#[derive(Clone)]
pub struct InMemoryIdempotencyStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl InMemoryIdempotencyStore {
    /// Build an empty store keeping records for `ttl`.
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::default(),
            ttl,
            clock,
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cutoff(&self) -> DateTime<Utc> {
        expiry_cutoff(self.clock.utc(), self.ttl)
    }

    /// Number of entries held, expired ones included.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Whether the store holds nothing.
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Live entry for `key`, dropping it first if it has expired.
    fn live_entry<'a>(
        entries: &'a mut HashMap<String, Entry>,
        key: &IdempotencyKey,
        cutoff: DateTime<Utc>,
    ) -> Option<&'a Entry> {
        if entries
            .get(key.as_ref())
            .is_some_and(|entry| entry.created_at() <= cutoff)
        {
            entries.remove(key.as_ref());
        }
        entries.get(key.as_ref())
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn lookup(
        &self,
        key: &IdempotencyKey,
    ) -> Result<IdempotencyLookupResult, IdempotencyStoreError> {
        let cutoff = self.cutoff();
        let mut entries = self.entries();
        Ok(match Self::live_entry(&mut entries, key, cutoff) {
            None => IdempotencyLookupResult::NotFound,
            Some(Entry::Reserved { .. }) => IdempotencyLookupResult::Reserved,
            Some(Entry::Stored(record)) => IdempotencyLookupResult::Stored(record.clone()),
        })
    }

    async fn store(&self, record: &IdempotencyRecord) -> Result<(), IdempotencyStoreError> {
        let cutoff = self.cutoff();
        let mut entries = self.entries();
        if let Some(Entry::Stored(_)) = Self::live_entry(&mut entries, &record.key, cutoff) {
            return Err(IdempotencyStoreError::duplicate_key(record.key.as_ref()));
        }
        entries.insert(record.key.as_ref().to_owned(), Entry::Stored(record.clone()));
        Ok(())
    }

    async fn reserve(
        &self,
        key: &IdempotencyKey,
    ) -> Result<ReservationOutcome, IdempotencyStoreError> {
        let now = self.clock.utc();
        let cutoff = expiry_cutoff(now, self.ttl);
        let mut entries = self.entries();
        match Self::live_entry(&mut entries, key, cutoff) {
            Some(Entry::Reserved { .. }) => Ok(ReservationOutcome::AlreadyReserved),
            Some(Entry::Stored(record)) => Ok(ReservationOutcome::AlreadyStored(record.clone())),
            None => {
                entries.insert(key.as_ref().to_owned(), Entry::Reserved { created_at: now });
                Ok(ReservationOutcome::Acquired)
            }
        }
    }

    async fn release(&self, key: &IdempotencyKey) -> Result<(), IdempotencyStoreError> {
        let mut entries = self.entries();
        if let Some(Entry::Reserved { .. }) = entries.get(key.as_ref()) {
            entries.remove(key.as_ref());
        }
        Ok(())
    }

    async fn cleanup_expired(&self) -> Result<u64, IdempotencyStoreError> {
        let cutoff = self.cutoff();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| entry.created_at() > cutoff);
        Ok(u64::try_from(before - entries.len()).unwrap_or(u64::MAX))
    }
}
