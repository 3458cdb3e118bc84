//! Group ledger transactions.
//!
//! A transaction records money moving between a member and their savings
//! group. Amounts are positive integers in minor currency units.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::Error;
use crate::domain::ports::{
    EventPublisher, TransactionRepository, TransactionRepositoryError,
};
use crate::domain::realtime::ServerEvent;

/// Stable transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Generate a fresh identifier.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Kind of ledger movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Member pays into group savings.
    Deposit,
    /// Member withdraws from group savings.
    Withdrawal,
    /// Member repays part of a loan.
    LoanRepayment,
}

impl TransactionKind {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdrawal => "withdrawal",
            Self::LoanRepayment => "loan_repayment",
        }
    }
}

impl FromStr for TransactionKind {
    type Err = TransactionValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(Self::Deposit),
            "withdrawal" => Ok(Self::Withdrawal),
            "loan_repayment" => Ok(Self::LoanRepayment),
            other => Err(TransactionValidationError::UnknownKind(other.to_owned())),
        }
    }
}

/// Validation failures for [`TransactionDraft`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransactionValidationError {
    /// `groupId` was blank.
    #[error("groupId must not be empty")]
    EmptyGroup,
    /// `memberId` was blank.
    #[error("memberId must not be empty")]
    EmptyMember,
    /// `amount` was zero.
    #[error("amount must be a positive integer")]
    NonPositiveAmount,
    /// `kind` was not recognised.
    #[error("unknown transaction kind: {0}")]
    UnknownKind(String),
}

impl TransactionValidationError {
    /// Name of the offending request field.
    pub fn field(&self) -> &'static str {
        match self {
            Self::EmptyGroup => "groupId",
            Self::EmptyMember => "memberId",
            Self::NonPositiveAmount => "amount",
            Self::UnknownKind(_) => "kind",
        }
    }
}

/// A validated request to record a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionDraft {
    group_id: String,
    member_id: String,
    kind: TransactionKind,
    amount: u64,
}

impl TransactionDraft {
    /// Validate and build a draft. Identifiers are trimmed.
    pub fn new(
        group_id: &str,
        member_id: &str,
        kind: TransactionKind,
        amount: u64,
    ) -> Result<Self, TransactionValidationError> {
        let group_id = group_id.trim();
        if group_id.is_empty() {
            return Err(TransactionValidationError::EmptyGroup);
        }
        let member_id = member_id.trim();
        if member_id.is_empty() {
            return Err(TransactionValidationError::EmptyMember);
        }
        if amount == 0 {
            return Err(TransactionValidationError::NonPositiveAmount);
        }
        Ok(Self {
            group_id: group_id.to_owned(),
            member_id: member_id.to_owned(),
            kind,
            amount,
        })
    }
}

/// A recorded ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Identifier assigned on creation.
    #[schema(value_type = String, format = Uuid)]
    pub id: TransactionId,
    /// Savings group the transaction belongs to.
    pub group_id: String,
    /// Member who made the transaction.
    pub member_id: String,
    /// Kind of movement.
    pub kind: TransactionKind,
    /// Amount in minor units.
    pub amount: u64,
    /// When the transaction was recorded.
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Realtime room for the transaction's group.
    pub fn group_room(&self) -> String {
        group_room(&self.group_id)
    }
}

/// Realtime room name for a savings group.
pub fn group_room(group_id: &str) -> String {
    format!("group:{group_id}")
}

/// Records transactions and announces them to realtime subscribers.
#[derive(Clone)]
pub struct TransactionService {
    repository: Arc<dyn TransactionRepository>,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
}

impl TransactionService {
    /// Build the service.
    pub fn new(
        repository: Arc<dyn TransactionRepository>,
        publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            publisher,
            clock,
        }
    }

    /// Persist a draft and publish `transaction_created`.
    ///
    /// Publication failures are logged; the transaction is already recorded.
    pub async fn record(&self, draft: TransactionDraft) -> Result<Transaction, Error> {
        let transaction = Transaction {
            id: TransactionId::random(),
            group_id: draft.group_id,
            member_id: draft.member_id,
            kind: draft.kind,
            amount: draft.amount,
            created_at: self.clock.utc(),
        };
        self.repository
            .insert(&transaction)
            .await
            .map_err(map_repository_error)?;

        match serde_json::to_value(&transaction) {
            Ok(payload) => self.announce(&transaction, payload).await,
            Err(error) => {
                warn!(error = %error, transaction_id = %transaction.id, "failed to encode transaction event");
            }
        }
        Ok(transaction)
    }

    async fn announce(&self, transaction: &Transaction, payload: serde_json::Value) {
        if let Err(error) = self
            .publisher
            .publish(ServerEvent::TransactionCreated, payload.clone())
            .await
        {
            warn!(error = %error, transaction_id = %transaction.id, "failed to broadcast transaction");
        }
        if let Err(error) = self
            .publisher
            .publish_to_room(&transaction.group_room(), ServerEvent::TransactionCreated, payload)
            .await
        {
            warn!(error = %error, transaction_id = %transaction.id, "failed to notify group room");
        }
    }

    /// Fetch a transaction by id.
    pub async fn find(&self, id: TransactionId) -> Result<Transaction, Error> {
        self.repository
            .find_by_id(&id)
            .await
            .map_err(map_repository_error)?
            .ok_or_else(|| Error::not_found(format!("transaction {id} not found")))
    }
}

fn map_repository_error(error: TransactionRepositoryError) -> Error {
    match error {
        TransactionRepositoryError::Connection { message } => {
            Error::service_unavailable(format!("transaction store unavailable: {message}"))
        }
        TransactionRepositoryError::Query { message } => {
            Error::internal(format!("transaction store failed: {message}"))
        }
        TransactionRepositoryError::Duplicate { id } => {
            Error::conflict(format!("transaction {id} already exists"))
        }
    }
}
