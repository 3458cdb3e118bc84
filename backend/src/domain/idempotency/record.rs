//! Stored idempotency records and lookup outcomes.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::IdempotencyKey;

/// Response captured from the first successful request for a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
    /// Exact body bytes returned to the first caller.
    pub body: Vec<u8>,
    /// `Content-Type` of the first response, when it had one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl StoredResponse {
    /// Capture a response body and its content type.
    pub fn new(body: impl Into<Vec<u8>>, content_type: Option<String>) -> Self {
        Self {
            body: body.into(),
            content_type,
        }
    }

    /// Whether a handler outcome qualifies for storage: a 2xx status and a
    /// non-empty body.
    ///
    /// ```
    /// # use mfi_backend::domain::idempotency::StoredResponse;
    /// assert!(StoredResponse::is_storable(201, b"{\"id\":1}"));
    /// assert!(!StoredResponse::is_storable(204, b""));
    /// assert!(!StoredResponse::is_storable(500, b"{}"));
    /// ```
    pub fn is_storable(status: u16, body: &[u8]) -> bool {
        (200..300).contains(&status) && !body.is_empty()
    }
}

/// A key together with the response it replays.
///
/// Records are created once and never updated; they disappear when
/// `created_at + ttl` has elapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyRecord {
    /// Key supplied by the client.
    pub key: IdempotencyKey,
    /// Response to replay.
    pub response: StoredResponse,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    /// Build a record.
    pub fn new(key: IdempotencyKey, response: StoredResponse, created_at: DateTime<Utc>) -> Self {
        Self {
            key,
            response,
            created_at,
        }
    }

    /// Instant after which the record must no longer be replayed.
    pub fn expires_at(&self, ttl: Duration) -> DateTime<Utc> {
        expiry_of(self.created_at, ttl)
    }

    /// Whether the record has expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now >= self.expires_at(ttl)
    }
}

/// Expiry instant for something created at `created_at` with `ttl`.
///
/// Durations too large for `chrono` saturate to the maximum representable
/// instant, meaning "never expires".
pub fn expiry_of(created_at: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|delta| created_at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Oldest creation instant still live at `now`: anything created at or
/// before the cutoff has expired. Saturates to the minimum instant.
pub fn expiry_cutoff(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|delta| now.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Result of looking a key up in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdempotencyLookupResult {
    /// No live record or reservation exists.
    NotFound,
    /// A live record exists and should be replayed.
    Stored(IdempotencyRecord),
    /// A request holding a reservation for this key is still running.
    Reserved,
}

/// Result of attempting to reserve a key before running the handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReservationOutcome {
    /// The caller now owns the reservation.
    Acquired,
    /// Another request already holds the reservation.
    AlreadyReserved,
    /// A record was stored in the meantime and should be replayed.
    AlreadyStored(IdempotencyRecord),
}
