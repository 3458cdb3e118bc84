//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! - **memory**: process-local stores for single-instance deployments
//! - **persistence**: PostgreSQL-backed idempotency store using Diesel ORM
//! - **cache**: Redis-backed idempotency store with native key expiry
//! - **realtime**: `awc` WebSocket transport for the realtime relay
//! - **metrics**: Prometheus-backed metrics exporters (feature-gated)
//!
//! Adapters are thin translators that convert between domain types and
//! infrastructure-specific representations. They contain no business logic.

pub mod cache;
pub mod memory;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod persistence;
pub mod realtime;
