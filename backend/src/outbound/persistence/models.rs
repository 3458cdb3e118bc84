//! Diesel row structs. Internal to the persistence adapters.

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use super::schema::idempotency_records;

/// Value of `status` for a reservation.
pub(crate) const STATUS_RESERVED: &str = "reserved";
/// Value of `status` for a stored response.
pub(crate) const STATUS_STORED: &str = "stored";

/// Row struct for reading from the idempotency_records table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = idempotency_records)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct IdempotencyRecordRow {
    pub key: String,
    pub status: String,
    pub response_body: Option<Vec<u8>>,
    pub content_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Insertable struct for new reservations and records.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = idempotency_records)]
pub(crate) struct NewIdempotencyRecordRow<'a> {
    pub key: &'a str,
    pub status: &'a str,
    pub response_body: Option<&'a [u8]>,
    pub content_type: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}
