//! Tests for HTTP error mapping.

use super::*;
use crate::domain::Error;
use actix_web::body::to_bytes;
use actix_web::http::StatusCode;
use actix_web::{App, ResponseError, test as actix_test};
use rstest::{fixture, rstest};
use serde_json::json;

const TRACE_ID: &str = "00000000-0000-0000-0000-000000000000";

#[fixture]
fn expected_trace_id() -> String {
    TRACE_ID.to_owned()
}

#[fixture]
fn internal_error_case(expected_trace_id: String) -> Error {
    Error::internal("pool exhausted")
        .with_trace_id(expected_trace_id)
        .with_details(json!({"secret": "x"}))
}

#[fixture]
fn invalid_request_case(expected_trace_id: String) -> Error {
    Error::invalid_request("amount must be positive")
        .with_trace_id(expected_trace_id)
        .with_details(json!({"field": "amount"}))
}

#[rstest]
#[case(Error::invalid_request("bad"), StatusCode::BAD_REQUEST)]
#[case(Error::unauthorized("no auth"), StatusCode::UNAUTHORIZED)]
#[case(Error::not_found("missing"), StatusCode::NOT_FOUND)]
#[case(Error::conflict("in progress"), StatusCode::CONFLICT)]
#[case(Error::service_unavailable("store down"), StatusCode::SERVICE_UNAVAILABLE)]
#[case(Error::internal("boom"), StatusCode::INTERNAL_SERVER_ERROR)]
fn status_code_matches_error_code(#[case] err: Error, #[case] status: StatusCode) {
    assert_eq!(ResponseError::status_code(&err), status);
}

async fn assert_error_response(
    error: Error,
    expected_status: StatusCode,
    expected_trace_id: Option<&str>,
) -> Error {
    let response = ResponseError::error_response(&error);
    assert_eq!(response.status(), expected_status);

    let header = response.headers().get(TRACE_ID_HEADER);
    match expected_trace_id {
        Some(expected) => {
            let trace_id = header
                .expect("Trace-Id header is set by error_response")
                .to_str()
                .expect("Trace-Id not valid UTF-8");
            assert_eq!(trace_id, expected);
        }
        None => assert!(header.is_none(), "Trace-Id header should not be present"),
    }

    let bytes = to_bytes(response.into_body())
        .await
        .expect("reading response body succeeds");

    serde_json::from_slice(&bytes).expect("Error JSON deserialisation succeeds")
}

#[rstest]
#[actix_web::test]
async fn internal_errors_are_redacted_but_keep_trace_id(
    #[from(internal_error_case)] internal_error: Error,
    expected_trace_id: String,
) {
    let redacted = assert_error_response(
        internal_error,
        StatusCode::INTERNAL_SERVER_ERROR,
        Some(expected_trace_id.as_str()),
    )
    .await;
    assert_eq!(redacted.code(), ErrorCode::InternalError);
    assert_eq!(redacted.message(), "Internal server error");
    assert!(redacted.details().is_none());
}

#[rstest]
#[actix_web::test]
async fn client_errors_keep_message_and_details(
    #[from(invalid_request_case)] invalid_request: Error,
    expected_trace_id: String,
) {
    let payload = assert_error_response(
        invalid_request,
        StatusCode::BAD_REQUEST,
        Some(expected_trace_id.as_str()),
    )
    .await;
    assert_eq!(payload.code(), ErrorCode::InvalidRequest);
    assert_eq!(payload.message(), "amount must be positive");
    assert_eq!(payload.details(), Some(&json!({"field": "amount"})));
}

#[rstest]
#[actix_web::test]
async fn error_without_trace_id_omits_trace_header() {
    let error = Error::conflict("request with this idempotency key is already in progress");

    let payload = assert_error_response(error, StatusCode::CONFLICT, None).await;
    assert_eq!(payload.code(), ErrorCode::Conflict);
    assert_eq!(payload.trace_id(), None);
}

#[rstest]
fn redaction_leaves_client_errors_untouched() {
    let error = Error::not_found("transaction not found").with_trace_id(TRACE_ID);
    assert_eq!(redact_if_internal(&error), error);
}

#[rstest]
fn from_actix_error_is_redacted_internal_error() {
    let actix_err = actix_web::error::ErrorBadRequest("boom");
    let err: Error = actix_err.into();

    assert_eq!(err.code(), ErrorCode::InternalError);
    assert_eq!(err.message(), "Internal server error");
    assert_eq!(err.trace_id(), None);
    assert_eq!(err.details(), None);
}

#[derive(serde::Deserialize)]
struct Body {
    #[expect(dead_code, reason = "deserialisation target only")]
    amount: u64,
}

async fn echo(_body: web::Json<Body>) -> HttpResponse {
    HttpResponse::Ok().finish()
}

#[rstest]
#[actix_web::test]
async fn malformed_json_bodies_become_invalid_request_envelopes() {
    let app = actix_test::init_service(
        App::new()
            .app_data(json_config())
            .route("/", web::post().to(echo)),
    )
    .await;
    let req = actix_test::TestRequest::post()
        .uri("/")
        .insert_header(("content-type", "application/json"))
        .set_payload("{\"amount\": \"lots\"}")
        .to_request();
    let res = actix_test::call_service(&app, req).await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Error = actix_test::read_body_json(res).await;
    assert_eq!(body.code(), ErrorCode::InvalidRequest);
    assert!(body.message().starts_with("invalid JSON body"));
}
