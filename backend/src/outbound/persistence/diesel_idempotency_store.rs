//! PostgreSQL-backed `IdempotencyStore` using Diesel.
//!
//! Uniqueness comes from the primary key on `key`. Rows older than the ttl
//! are ignored by every read, replaced on the next write for the same key,
//! and deleted in bulk by `cleanup_expired`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use mockable::Clock;
use tracing::debug;

use crate::domain::idempotency::{
    IdempotencyKey, IdempotencyLookupResult, IdempotencyRecord, ReservationOutcome,
    StoredResponse, expiry_cutoff,
};
use crate::domain::ports::{IdempotencyStore, IdempotencyStoreError};

use super::models::{
    IdempotencyRecordRow, NewIdempotencyRecordRow, STATUS_RESERVED, STATUS_STORED,
};
use super::pool::{DbPool, PoolError};
use super::schema::idempotency_records;

/// Diesel implementation of [`IdempotencyStore`].
#[derive(Clone)]
pub struct DieselIdempotencyStore {
    pool: DbPool,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl DieselIdempotencyStore {
    /// Build a store keeping records for `ttl`.
    pub fn new(pool: DbPool, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { pool, ttl, clock }
    }

    fn cutoff(&self) -> DateTime<Utc> {
        expiry_cutoff(self.clock.utc(), self.ttl)
    }

    async fn live_row(
        &self,
        conn: &mut AsyncPgConnection,
        key: &IdempotencyKey,
    ) -> Result<Option<IdempotencyRecordRow>, IdempotencyStoreError> {
        idempotency_records::table
            .filter(idempotency_records::key.eq(key.as_ref()))
            .filter(idempotency_records::created_at.gt(self.cutoff()))
            .select(IdempotencyRecordRow::as_select())
            .first(conn)
            .await
            .optional()
            .map_err(map_diesel_error)
    }

    async fn purge_expired_key(
        &self,
        conn: &mut AsyncPgConnection,
        key: &IdempotencyKey,
    ) -> Result<(), IdempotencyStoreError> {
        diesel::delete(idempotency_records::table)
            .filter(idempotency_records::key.eq(key.as_ref()))
            .filter(idempotency_records::created_at.le(self.cutoff()))
            .execute(conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }
}

fn map_pool_error(error: PoolError) -> IdempotencyStoreError {
    match error {
        PoolError::Checkout { message }
        | PoolError::Build { message }
        | PoolError::Migration { message } => IdempotencyStoreError::connection(message),
    }
}

fn map_diesel_error(error: diesel::result::Error) -> IdempotencyStoreError {
    use diesel::result::{DatabaseErrorKind, Error as DieselError};

    match &error {
        DieselError::DatabaseError(kind, info) => {
            debug!(?kind, message = info.message(), "diesel operation failed");
        }
        _ => debug!(error = %error, "diesel operation failed"),
    }

    match error {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            IdempotencyStoreError::duplicate_key("unique violation")
        }
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, _) => {
            IdempotencyStoreError::connection("database connection error")
        }
        DieselError::DeserializationError(err) => {
            IdempotencyStoreError::serialization(err.to_string())
        }
        DieselError::QueryBuilderError(_) => IdempotencyStoreError::query("database query error"),
        _ => IdempotencyStoreError::query("database error"),
    }
}

fn row_to_lookup(row: IdempotencyRecordRow) -> Result<IdempotencyLookupResult, IdempotencyStoreError> {
    if row.status == STATUS_RESERVED {
        return Ok(IdempotencyLookupResult::Reserved);
    }
    let key = IdempotencyKey::new(row.key)
        .map_err(|err| IdempotencyStoreError::serialization(format!("stored key invalid: {err}")))?;
    let body = row.response_body.ok_or_else(|| {
        IdempotencyStoreError::serialization("stored record is missing its response body")
    })?;
    Ok(IdempotencyLookupResult::Stored(IdempotencyRecord::new(
        key,
        StoredResponse::new(body, row.content_type),
        row.created_at,
    )))
}

#[async_trait]
impl IdempotencyStore for DieselIdempotencyStore {
    async fn lookup(
        &self,
        key: &IdempotencyKey,
    ) -> Result<IdempotencyLookupResult, IdempotencyStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        match self.live_row(&mut conn, key).await? {
            Some(row) => row_to_lookup(row),
            None => Ok(IdempotencyLookupResult::NotFound),
        }
    }

    async fn store(&self, record: &IdempotencyRecord) -> Result<(), IdempotencyStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        self.purge_expired_key(&mut conn, &record.key).await?;

        let committed = diesel::update(idempotency_records::table)
            .filter(idempotency_records::key.eq(record.key.as_ref()))
            .filter(idempotency_records::status.eq(STATUS_RESERVED))
            .set((
                idempotency_records::status.eq(STATUS_STORED),
                idempotency_records::response_body.eq(Some(record.response.body.as_slice())),
                idempotency_records::content_type.eq(record.response.content_type.as_deref()),
                idempotency_records::created_at.eq(record.created_at),
            ))
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        if committed > 0 {
            return Ok(());
        }

        let inserted = diesel::insert_into(idempotency_records::table)
            .values(&NewIdempotencyRecordRow {
                key: record.key.as_ref(),
                status: STATUS_STORED,
                response_body: Some(record.response.body.as_slice()),
                content_type: record.response.content_type.as_deref(),
                created_at: record.created_at,
            })
            .on_conflict_do_nothing()
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        if inserted == 0 {
            return Err(IdempotencyStoreError::duplicate_key(record.key.as_ref()));
        }
        Ok(())
    }

    async fn reserve(
        &self,
        key: &IdempotencyKey,
    ) -> Result<ReservationOutcome, IdempotencyStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        self.purge_expired_key(&mut conn, key).await?;

        // A competing release between the insert and the read frees the key
        // again, so retry once before reporting contention.
        for _ in 0..2 {
            let inserted = diesel::insert_into(idempotency_records::table)
                .values(&NewIdempotencyRecordRow {
                    key: key.as_ref(),
                    status: STATUS_RESERVED,
                    response_body: None,
                    content_type: None,
                    created_at: self.clock.utc(),
                })
                .on_conflict_do_nothing()
                .execute(&mut conn)
                .await
                .map_err(map_diesel_error)?;
            if inserted > 0 {
                return Ok(ReservationOutcome::Acquired);
            }
            match self.live_row(&mut conn, key).await? {
                Some(row) => {
                    return match row_to_lookup(row)? {
                        IdempotencyLookupResult::Stored(record) => {
                            Ok(ReservationOutcome::AlreadyStored(record))
                        }
                        IdempotencyLookupResult::Reserved | IdempotencyLookupResult::NotFound => {
                            Ok(ReservationOutcome::AlreadyReserved)
                        }
                    };
                }
                None => continue,
            }
        }
        Ok(ReservationOutcome::AlreadyReserved)
    }

    async fn release(&self, key: &IdempotencyKey) -> Result<(), IdempotencyStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::delete(idempotency_records::table)
            .filter(idempotency_records::key.eq(key.as_ref()))
            .filter(idempotency_records::status.eq(STATUS_RESERVED))
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn cleanup_expired(&self) -> Result<u64, IdempotencyStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let cutoff = self.cutoff();
        let deleted = diesel::delete(idempotency_records::table)
            .filter(idempotency_records::created_at.le(cutoff))
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        debug!(deleted, cutoff = %cutoff, "deleted expired idempotency rows");
        Ok(u64::try_from(deleted).unwrap_or(u64::MAX))
    }
}
