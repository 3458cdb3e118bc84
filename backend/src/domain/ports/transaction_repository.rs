//! Port for persisting group ledger transactions.
use async_trait::async_trait;

use crate::domain::transactions::{Transaction, TransactionId};

use super::define_port_error;

define_port_error! {
    /// Errors raised by transaction repositories.
    pub enum TransactionRepositoryError {
        /// The backing store could not be reached.
        Connection { message: String } => "transaction repository connection failed: {message}",
        /// A query or mutation failed.
        Query { message: String } => "transaction repository query failed: {message}",
        /// A transaction with the same id already exists.
        Duplicate { id: String } => "transaction already exists: {id}",
    }
}

/// Storage for ledger transactions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Insert a new transaction.
    async fn insert(&self, transaction: &Transaction) -> Result<(), TransactionRepositoryError>;

    /// Fetch a transaction by id.
    async fn find_by_id(
        &self,
        id: &TransactionId,
    ) -> Result<Option<Transaction>, TransactionRepositoryError>;

    /// List a group's transactions, oldest first.
    async fn list_for_group(
        &self,
        group_id: &str,
    ) -> Result<Vec<Transaction>, TransactionRepositoryError>;
}
