//! Process-local `TransactionRepository`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::domain::ports::{TransactionRepository, TransactionRepositoryError};
use crate::domain::transactions::{Transaction, TransactionId};

/// Keeps transactions in insertion order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTransactionRepository {
    transactions: Arc<Mutex<Vec<Transaction>>>,
}

impl InMemoryTransactionRepository {
    /// Empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    fn transactions(&self) -> MutexGuard<'_, Vec<Transaction>> {
        self.transactions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
    async fn insert(&self, transaction: &Transaction) -> Result<(), TransactionRepositoryError> {
        let mut transactions = self.transactions();
        if transactions.iter().any(|existing| existing.id == transaction.id) {
            return Err(TransactionRepositoryError::duplicate(transaction.id.to_string()));
        }
        transactions.push(transaction.clone());
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &TransactionId,
    ) -> Result<Option<Transaction>, TransactionRepositoryError> {
        Ok(self
            .transactions()
            .iter()
            .find(|transaction| transaction.id == *id)
            .cloned())
    }

    async fn list_for_group(
        &self,
        group_id: &str,
    ) -> Result<Vec<Transaction>, TransactionRepositoryError> {
        Ok(self
            .transactions()
            .iter()
            .filter(|transaction| transaction.group_id == group_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::transactions::TransactionKind;
    use chrono::Utc;
    use rstest::rstest;

    fn transaction(group: &str) -> Transaction {
        Transaction {
            id: TransactionId::random(),
            group_id: group.to_owned(),
            member_id: "m-1".to_owned(),
            kind: TransactionKind::LoanRepayment,
            amount: 1_000,
            created_at: Utc::now(),
        }
    }

    #[rstest]
    #[tokio::test]
    async fn inserted_transactions_are_found_and_listed_by_group() {
        let repository = InMemoryTransactionRepository::new();
        let first = transaction("g-1");
        let other = transaction("g-2");
        let second = transaction("g-1");
        for tx in [&first, &other, &second] {
            repository.insert(tx).await.expect("insert succeeds");
        }

        assert_eq!(
            repository.find_by_id(&other.id).await,
            Ok(Some(other.clone()))
        );
        assert_eq!(
            repository.list_for_group("g-1").await,
            Ok(vec![first, second])
        );
    }

    #[rstest]
    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let repository = InMemoryTransactionRepository::new();
        let tx = transaction("g-1");
        repository.insert(&tx).await.expect("first insert");

        assert!(matches!(
            repository.insert(&tx).await,
            Err(TransactionRepositoryError::Duplicate { .. })
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn unknown_ids_are_absent() {
        let repository = InMemoryTransactionRepository::new();
        assert_eq!(repository.find_by_id(&TransactionId::random()).await, Ok(None));
    }
}
