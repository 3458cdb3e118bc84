//! Tests for transaction HTTP handlers.

use super::*;
use crate::domain::ports::{MockEventPublisher, NoOpEventPublisher};
use crate::domain::realtime::ServerEvent;
use crate::domain::{ErrorCode, TransactionService};
use crate::outbound::memory::InMemoryTransactionRepository;
use actix_web::http::StatusCode;
use actix_web::{App, test as actix_test};
use chrono::{TimeZone, Utc};
use mockable::MockClock;
use rstest::rstest;
use serde_json::Value;
use std::sync::Arc;

fn clock() -> MockClock {
    let mut clock = MockClock::new();
    clock.expect_utc().returning(|| {
        Utc.with_ymd_and_hms(2026, 7, 1, 8, 0, 0)
            .single()
            .expect("valid timestamp")
    });
    clock
}

fn state_with(publisher: Arc<dyn crate::domain::ports::EventPublisher>) -> HttpState {
    HttpState::new(TransactionService::new(
        Arc::new(InMemoryTransactionRepository::new()),
        publisher,
        Arc::new(clock()),
    ))
}

fn test_app(
    state: HttpState,
) -> App<
    impl actix_web::dev::ServiceFactory<
        actix_web::dev::ServiceRequest,
        Config = (),
        Response = actix_web::dev::ServiceResponse,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    App::new()
        .app_data(web::Data::new(state))
        .app_data(crate::inbound::http::error::json_config())
        .service(
            web::scope("/api/v1")
                .service(create_transaction)
                .service(get_transaction),
        )
}

fn create_request(body: Value) -> actix_http::Request {
    actix_test::TestRequest::post()
        .uri("/api/v1/transactions")
        .set_json(body)
        .to_request()
}

#[rstest]
#[actix_web::test]
async fn created_transaction_can_be_fetched() {
    let app = actix_test::init_service(test_app(state_with(Arc::new(NoOpEventPublisher)))).await;

    let res = actix_test::call_service(
        &app,
        create_request(json!({
            "groupId": "grp-1",
            "memberId": "mbr-1",
            "kind": "deposit",
            "amount": 25000
        })),
    )
    .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: Value = actix_test::read_body_json(res).await;
    insta::assert_json_snapshot!(created, {".id" => "[id]"}, @r#"
    {
      "amount": 25000,
      "createdAt": "2026-07-01T08:00:00Z",
      "groupId": "grp-1",
      "id": "[id]",
      "kind": "deposit",
      "memberId": "mbr-1"
    }
    "#);

    let id = created["id"].as_str().expect("id is a string");
    let res = actix_test::call_service(
        &app,
        actix_test::TestRequest::get()
            .uri(&format!("/api/v1/transactions/{id}"))
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    let fetched: Value = actix_test::read_body_json(res).await;
    assert_eq!(fetched, created);
}

#[rstest]
#[actix_web::test]
async fn creation_is_announced_to_the_group_room() {
    let mut publisher = MockEventPublisher::new();
    publisher
        .expect_publish()
        .withf(|event, _| *event == ServerEvent::TransactionCreated)
        .times(1)
        .returning(|_, _| Ok(0));
    publisher
        .expect_publish_to_room()
        .withf(|room, event, payload| {
            room == "group:grp-9"
                && *event == ServerEvent::TransactionCreated
                && payload["amount"] == 100
        })
        .times(1)
        .returning(|_, _, _| Ok(0));
    let app = actix_test::init_service(test_app(state_with(Arc::new(publisher)))).await;

    let res = actix_test::call_service(
        &app,
        create_request(json!({
            "groupId": "grp-9",
            "memberId": "mbr-2",
            "kind": "loan_repayment",
            "amount": 100
        })),
    )
    .await;

    assert_eq!(res.status(), StatusCode::CREATED);
}

#[rstest]
#[case(json!({"groupId": " ", "memberId": "m", "kind": "deposit", "amount": 1}), "groupId")]
#[case(json!({"groupId": "g", "memberId": "", "kind": "deposit", "amount": 1}), "memberId")]
#[case(json!({"groupId": "g", "memberId": "m", "kind": "gift", "amount": 1}), "kind")]
#[case(json!({"groupId": "g", "memberId": "m", "kind": "deposit", "amount": 0}), "amount")]
#[actix_web::test]
async fn invalid_payloads_are_rejected_with_field_details(
    #[case] body: Value,
    #[case] field: &str,
) {
    let app = actix_test::init_service(test_app(state_with(Arc::new(NoOpEventPublisher)))).await;

    let res = actix_test::call_service(&app, create_request(body)).await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let err: Error = actix_test::read_body_json(res).await;
    assert_eq!(err.code(), ErrorCode::InvalidRequest);
    assert_eq!(err.details(), Some(&json!({ "field": field })));
}

#[rstest]
#[actix_web::test]
async fn negative_amounts_fail_deserialisation() {
    let app = actix_test::init_service(test_app(state_with(Arc::new(NoOpEventPublisher)))).await;

    let res = actix_test::call_service(
        &app,
        create_request(json!({"groupId": "g", "memberId": "m", "kind": "deposit", "amount": -5})),
    )
    .await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[rstest]
#[case("00000000-0000-0000-0000-000000000001", StatusCode::NOT_FOUND)]
#[case("not-a-uuid", StatusCode::BAD_REQUEST)]
#[actix_web::test]
async fn lookups_for_unknown_or_malformed_ids_fail(#[case] id: &str, #[case] status: StatusCode) {
    let app = actix_test::init_service(test_app(state_with(Arc::new(NoOpEventPublisher)))).await;

    let res = actix_test::call_service(
        &app,
        actix_test::TestRequest::get()
            .uri(&format!("/api/v1/transactions/{id}"))
            .to_request(),
    )
    .await;

    assert_eq!(res.status(), status);
}
