//! HTTP inbound adapter exposing REST endpoints.

pub mod error;
pub mod health;
pub mod idempotency;
pub mod state;
pub mod transactions;

pub use error::ApiResult;
