//! Group ledger transaction handlers.
//!
//! ```text
//! POST /api/v1/transactions
//! GET  /api/v1/transactions/{id}
//! ```

use std::str::FromStr;

use actix_web::{HttpResponse, get, post, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::transactions::TransactionValidationError;
use crate::domain::{Error, Transaction, TransactionDraft, TransactionId, TransactionKind};
use crate::inbound::http::ApiResult;
use crate::inbound::http::state::HttpState;

/// Request payload for recording a transaction.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransactionRequestBody {
    #[schema(example = "grp-42")]
    pub group_id: String,
    #[schema(example = "mbr-7")]
    pub member_id: String,
    /// `deposit`, `withdrawal` or `loan_repayment`.
    #[schema(example = "deposit")]
    pub kind: String,
    /// Amount in minor units.
    #[schema(example = 25000)]
    pub amount: u64,
}

fn validation_error(err: TransactionValidationError) -> Error {
    let field = err.field();
    Error::invalid_request(err.to_string()).with_details(json!({ "field": field }))
}

fn parse_draft(body: CreateTransactionRequestBody) -> Result<TransactionDraft, Error> {
    let kind = TransactionKind::from_str(body.kind.trim()).map_err(validation_error)?;
    TransactionDraft::new(&body.group_id, &body.member_id, kind, body.amount)
        .map_err(validation_error)
}

/// Record a transaction and announce it to the group's realtime room.
///
/// Send an `Idempotency-Key` header to make retries safe: a repeated key
/// replays the first response instead of recording a second transaction.
#[utoipa::path(
    post,
    path = "/api/v1/transactions",
    request_body = CreateTransactionRequestBody,
    params(
        ("Idempotency-Key" = Option<String>, Header, description = "Deduplicates retries for 24 hours")
    ),
    responses(
        (status = 201, description = "Transaction recorded", body = Transaction),
        (status = 200, description = "Replayed response for a repeated idempotency key", body = Transaction),
        (status = 400, description = "Invalid request", body = Error),
        (status = 409, description = "Idempotency key in progress", body = Error),
        (status = 503, description = "Service unavailable", body = Error)
    ),
    tags = ["transactions"],
    operation_id = "createTransaction"
)]
#[post("/transactions")]
pub async fn create_transaction(
    state: web::Data<HttpState>,
    payload: web::Json<CreateTransactionRequestBody>,
) -> ApiResult<HttpResponse> {
    let draft = parse_draft(payload.into_inner())?;
    let transaction = state.transactions.record(draft).await?;
    Ok(HttpResponse::Created().json(transaction))
}

/// Fetch a recorded transaction.
#[utoipa::path(
    get,
    path = "/api/v1/transactions/{id}",
    params(("id" = String, Path, description = "Transaction identifier (UUID)")),
    responses(
        (status = 200, description = "Transaction", body = Transaction),
        (status = 400, description = "Malformed identifier", body = Error),
        (status = 404, description = "Unknown transaction", body = Error)
    ),
    tags = ["transactions"],
    operation_id = "getTransaction"
)]
#[get("/transactions/{id}")]
pub async fn get_transaction(
    state: web::Data<HttpState>,
    path: web::Path<String>,
) -> ApiResult<web::Json<Transaction>> {
    let raw = path.into_inner();
    let id = Uuid::parse_str(raw.trim()).map_err(|_| {
        Error::invalid_request("id must be a valid UUID").with_details(json!({ "field": "id" }))
    })?;
    let transaction = state.transactions.find(TransactionId::from_uuid(id)).await?;
    Ok(web::Json(transaction))
}

#[cfg(test)]
#[path = "transactions_tests.rs"]
mod tests;
