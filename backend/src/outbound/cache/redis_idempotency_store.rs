//! Redis-backed `IdempotencyStore` using `bb8-redis`.
//!
//! Every entry is written with a native `EX` expiry equal to the ttl, so
//! Redis drops expired records and reservations on its own and
//! [`IdempotencyStore::cleanup_expired`] has nothing to do.
//!
//! Keys are namespaced as `idempotency:v1:<sha256 of client key>`; values are
//! JSON documents tagged with `status`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bb8_redis::RedisConnectionManager;
use bb8_redis::bb8::{Pool, PooledConnection, RunError};
use bb8_redis::redis::{self, RedisError};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::idempotency::{
    IdempotencyKey, IdempotencyLookupResult, IdempotencyRecord, ReservationOutcome,
    StoredResponse,
};
use crate::domain::ports::{IdempotencyStore, IdempotencyStoreError};

const KEY_PREFIX: &str = "idempotency:v1:";

/// Overwrite anything except a stored record. Returns 1 when written.
const COMMIT_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if current and string.find(current, '"status":"stored"', 1, true) then
    return 0
end
redis.call('SET', KEYS[1], ARGV[1], 'EX', ARGV[2])
return 1
"#;

/// Delete the key only while it holds a reservation.
const RELEASE_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if current and string.find(current, '"status":"reserved"', 1, true) then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum RedisEntry {
    Reserved {
        created_at: DateTime<Utc>,
    },
    Stored {
        key: String,
        response: StoredResponse,
        created_at: DateTime<Utc>,
    },
}

impl RedisEntry {
    fn created_at(&self) -> DateTime<Utc> {
        match self {
            Self::Reserved { created_at } | Self::Stored { created_at, .. } => *created_at,
        }
    }
}

/// Redis implementation of [`IdempotencyStore`].
#[derive(Clone)]
pub struct RedisIdempotencyStore {
    pool: Pool<RedisConnectionManager>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl RedisIdempotencyStore {
    /// Build a store over an existing pool.
    pub fn new(pool: Pool<RedisConnectionManager>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { pool, ttl, clock }
    }

    /// Build a pool for `redis_url` and wrap it.
    pub async fn connect(
        redis_url: &str,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, IdempotencyStoreError> {
        let manager = RedisConnectionManager::new(redis_url)
            .map_err(|err| IdempotencyStoreError::connection(err.to_string()))?;
        let pool = Pool::builder()
            .build(manager)
            .await
            .map_err(|err| IdempotencyStoreError::connection(err.to_string()))?;
        Ok(Self::new(pool, ttl, clock))
    }

    async fn conn(
        &self,
    ) -> Result<PooledConnection<'_, RedisConnectionManager>, IdempotencyStoreError> {
        self.pool.get().await.map_err(map_pool_error)
    }

    fn ttl_secs(&self) -> u64 {
        self.ttl.as_secs().max(1)
    }

    fn is_live(&self, entry: &RedisEntry) -> bool {
        let expires_at = crate::domain::idempotency::expiry_of(entry.created_at(), self.ttl);
        self.clock.utc() < expires_at
    }

    async fn read(
        &self,
        conn: &mut PooledConnection<'_, RedisConnectionManager>,
        key: &IdempotencyKey,
    ) -> Result<Option<RedisEntry>, IdempotencyStoreError> {
        let raw: Option<String> = redis::cmd("GET")
            .arg(redis_key(key))
            .query_async(&mut **conn)
            .await
            .map_err(map_redis_error)?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let entry = decode(&raw)?;
        Ok(self.is_live(&entry).then_some(entry))
    }
}

/// Namespaced Redis key for `key`.
pub fn redis_key(key: &IdempotencyKey) -> String {
    format!("{KEY_PREFIX}{}", key.fingerprint())
}

fn encode(entry: &RedisEntry) -> Result<String, IdempotencyStoreError> {
    serde_json::to_string(entry).map_err(|err| IdempotencyStoreError::serialization(err.to_string()))
}

fn decode(raw: &str) -> Result<RedisEntry, IdempotencyStoreError> {
    serde_json::from_str(raw).map_err(|err| IdempotencyStoreError::serialization(err.to_string()))
}

fn map_redis_error(error: RedisError) -> IdempotencyStoreError {
    debug!(error = %error, "redis operation failed");
    if error.is_io_error() || error.is_connection_refusal() || error.is_timeout() {
        IdempotencyStoreError::connection(error.to_string())
    } else {
        IdempotencyStoreError::query(error.to_string())
    }
}

fn map_pool_error(error: RunError<RedisError>) -> IdempotencyStoreError {
    match error {
        RunError::User(err) => map_redis_error(err),
        RunError::TimedOut => IdempotencyStoreError::connection("timed out waiting for redis"),
    }
}

fn entry_to_lookup(entry: RedisEntry) -> Result<IdempotencyLookupResult, IdempotencyStoreError> {
    match entry {
        RedisEntry::Reserved { .. } => Ok(IdempotencyLookupResult::Reserved),
        RedisEntry::Stored {
            key,
            response,
            created_at,
        } => {
            let key = IdempotencyKey::new(key).map_err(|err| {
                IdempotencyStoreError::serialization(format!("stored key invalid: {err}"))
            })?;
            Ok(IdempotencyLookupResult::Stored(IdempotencyRecord::new(
                key, response, created_at,
            )))
        }
    }
}

#[async_trait]
impl IdempotencyStore for RedisIdempotencyStore {
    async fn lookup(
        &self,
        key: &IdempotencyKey,
    ) -> Result<IdempotencyLookupResult, IdempotencyStoreError> {
        let mut conn = self.conn().await?;
        match self.read(&mut conn, key).await? {
            Some(entry) => entry_to_lookup(entry),
            None => Ok(IdempotencyLookupResult::NotFound),
        }
    }

    async fn store(&self, record: &IdempotencyRecord) -> Result<(), IdempotencyStoreError> {
        let value = encode(&RedisEntry::Stored {
            key: record.key.as_ref().to_owned(),
            response: record.response.clone(),
            created_at: record.created_at,
        })?;
        let mut conn = self.conn().await?;
        let written: i64 = redis::cmd("EVAL")
            .arg(COMMIT_SCRIPT)
            .arg(1)
            .arg(redis_key(&record.key))
            .arg(value)
            .arg(self.ttl_secs())
            .query_async(&mut *conn)
            .await
            .map_err(map_redis_error)?;
        if written == 0 {
            return Err(IdempotencyStoreError::duplicate_key(record.key.as_ref()));
        }
        Ok(())
    }

    async fn reserve(
        &self,
        key: &IdempotencyKey,
    ) -> Result<ReservationOutcome, IdempotencyStoreError> {
        let value = encode(&RedisEntry::Reserved {
            created_at: self.clock.utc(),
        })?;
        let mut conn = self.conn().await?;
        for _ in 0..2 {
            let acquired: Option<String> = redis::cmd("SET")
                .arg(redis_key(key))
                .arg(&value)
                .arg("NX")
                .arg("EX")
                .arg(self.ttl_secs())
                .query_async(&mut *conn)
                .await
                .map_err(map_redis_error)?;
            if acquired.is_some() {
                return Ok(ReservationOutcome::Acquired);
            }
            match self.read(&mut conn, key).await? {
                Some(RedisEntry::Reserved { .. }) => return Ok(ReservationOutcome::AlreadyReserved),
                Some(entry) => {
                    return match entry_to_lookup(entry)? {
                        IdempotencyLookupResult::Stored(record) => {
                            Ok(ReservationOutcome::AlreadyStored(record))
                        }
                        _ => Ok(ReservationOutcome::AlreadyReserved),
                    };
                }
                None => continue,
            }
        }
        Ok(ReservationOutcome::AlreadyReserved)
    }

    async fn release(&self, key: &IdempotencyKey) -> Result<(), IdempotencyStoreError> {
        let mut conn = self.conn().await?;
        let _: i64 = redis::cmd("EVAL")
            .arg(RELEASE_SCRIPT)
            .arg(1)
            .arg(redis_key(key))
            .query_async(&mut *conn)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    async fn cleanup_expired(&self) -> Result<u64, IdempotencyStoreError> {
        Ok(0)
    }
}
