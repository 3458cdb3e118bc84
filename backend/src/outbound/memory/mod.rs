//! In-process adapters used when no external store is configured.

mod idempotency_store;
mod transaction_repository;

pub use idempotency_store::InMemoryIdempotencyStore;
pub use transaction_repository::InMemoryTransactionRepository;
