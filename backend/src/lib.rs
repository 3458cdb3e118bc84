//! Core services for the microfinance MIS backend.
//!
//! The crate is split hexagonally: [`domain`] holds the idempotency guard,
//! the realtime relay and the transaction ledger; [`inbound`] adapts HTTP and
//! WebSocket traffic onto them; [`outbound`] provides the stores and
//! transports they depend on.

pub mod doc;
pub mod domain;
pub mod inbound;
pub mod middleware;
pub mod outbound;
#[cfg(test)]
mod test_support;

/// Public OpenAPI surface used by Swagger UI and tooling.
pub use doc::ApiDoc;
pub use middleware::Trace;
