//! Request middleware.
//!
//! Request correlation lives here. Request deduplication is an inbound HTTP
//! concern and sits in [`crate::inbound::http::idempotency`].

pub mod trace;

pub use trace::Trace;
