//! PostgreSQL persistence adapters using Diesel ORM.
//!
//! - **Thin adapters**: repositories only translate between Diesel rows and
//!   domain types.
//! - **Internal models**: row structs (`models.rs`) and table definitions
//!   (`schema.rs`) never leave this module.
//! - **Async pooling**: `diesel-async` connections pooled with `bb8`.
//!
//! ```ignore
//! use mfi_backend::outbound::persistence::{DbPool, DieselIdempotencyStore, PoolConfig};
//!
//! let pool = DbPool::new(PoolConfig::new(url)).await?;
//! let store = DieselIdempotencyStore::new(pool, ttl, Arc::new(DefaultClock));
//! ```

mod diesel_idempotency_store;
mod models;
mod pool;
mod schema;

pub use diesel_idempotency_store::DieselIdempotencyStore;
pub use pool::{DbPool, PoolConfig, PoolError, run_migrations};
