//! Shared HTTP adapter state.
//!
//! Handlers receive this via `actix_web::web::Data` so they only depend on
//! domain services and stay testable without I/O.

use crate::domain::TransactionService;

/// Dependency bundle for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub transactions: TransactionService,
}

impl HttpState {
    /// Bundle the services handlers need.
    pub fn new(transactions: TransactionService) -> Self {
        Self { transactions }
    }
}
