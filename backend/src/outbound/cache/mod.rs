//! Redis-backed adapters.
//!
//! The idempotency store relies on Redis key expiry instead of the sweeper,
//! so it suits multi-instance deployments that already run Redis.

mod redis_idempotency_store;

pub use redis_idempotency_store::{RedisIdempotencyStore, redis_key};
