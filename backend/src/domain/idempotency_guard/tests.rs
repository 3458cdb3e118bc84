//! Tests for the idempotency guard decision logic.

use super::*;
use crate::domain::ErrorCode;
use crate::domain::ports::{MockIdempotencyMetrics, MockIdempotencyStore, NoOpIdempotencyMetrics};
use chrono::{DateTime, TimeZone, Utc};
use mockable::MockClock;
use rstest::{fixture, rstest};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 14, 8, 0, 0)
        .single()
        .expect("valid timestamp")
}

#[fixture]
fn clock() -> Arc<dyn Clock> {
    let mut clock = MockClock::new();
    clock.expect_utc().returning(now);
    Arc::new(clock)
}

fn key(raw: &str) -> IdempotencyKey {
    IdempotencyKey::new(raw).expect("valid key")
}

fn record(raw: &str, body: &[u8]) -> IdempotencyRecord {
    IdempotencyRecord::new(
        key(raw),
        StoredResponse::new(body.to_vec(), Some("application/json".to_owned())),
        now(),
    )
}

fn guard(store: MockIdempotencyStore, clock: Arc<dyn Clock>, config: IdempotencyConfig) -> IdempotencyGuard {
    IdempotencyGuard::new(
        Arc::new(store),
        Arc::new(NoOpIdempotencyMetrics),
        clock,
        config,
    )
}

fn ticket(raw: &str, reserved: bool) -> GuardTicket {
    GuardTicket {
        key: key(raw),
        reserved,
    }
}

#[rstest]
#[tokio::test]
async fn missing_key_passes_through_without_touching_the_store(clock: Arc<dyn Clock>) {
    let store = MockIdempotencyStore::new();
    let guard = guard(store, clock, IdempotencyConfig::default());

    assert!(matches!(guard.begin(None).await, GuardDecision::PassThrough));
}

#[rstest]
#[tokio::test]
async fn stored_record_is_replayed(clock: Arc<dyn Clock>) {
    let mut store = MockIdempotencyStore::new();
    store
        .expect_lookup()
        .times(1)
        .returning(|_| Ok(IdempotencyLookupResult::Stored(record("abc", br#"{"id":1}"#))));
    let mut metrics = MockIdempotencyMetrics::new();
    metrics.expect_record_hit().times(1).returning(|| Ok(()));
    let guard = IdempotencyGuard::new(
        Arc::new(store),
        Arc::new(metrics),
        clock,
        IdempotencyConfig::default(),
    );

    let GuardDecision::Replay(replayed) = guard.begin(Some(key("abc"))).await else {
        panic!("expected replay");
    };
    assert_eq!(replayed.response.body, br#"{"id":1}"#);
}

#[rstest]
#[tokio::test]
async fn unseen_key_proceeds_without_reservation(clock: Arc<dyn Clock>) {
    let mut store = MockIdempotencyStore::new();
    store
        .expect_lookup()
        .returning(|_| Ok(IdempotencyLookupResult::NotFound));
    store.expect_reserve().never();
    let guard = guard(store, clock, IdempotencyConfig::default());

    let GuardDecision::Proceed(ticket) = guard.begin(Some(key("abc"))).await else {
        panic!("expected proceed");
    };
    assert_eq!(ticket.key().as_ref(), "abc");
    assert!(!ticket.is_reserved());
}

#[rstest]
#[case(FailurePolicy::FailOpen, None)]
#[case(FailurePolicy::FailClosed, Some(ErrorCode::ServiceUnavailable))]
#[tokio::test]
async fn lookup_failures_follow_the_failure_policy(
    clock: Arc<dyn Clock>,
    #[case] policy: FailurePolicy,
    #[case] rejection: Option<ErrorCode>,
) {
    let mut store = MockIdempotencyStore::new();
    store
        .expect_lookup()
        .returning(|_| Err(IdempotencyStoreError::connection("refused")));
    let guard = guard(
        store,
        clock,
        IdempotencyConfig::default().with_failure_policy(policy),
    );

    match (guard.begin(Some(key("abc"))).await, rejection) {
        (GuardDecision::PassThrough, None) => {}
        (GuardDecision::Reject(error), Some(code)) => assert_eq!(error.code(), code),
        (other, _) => panic!("unexpected decision: {other:?}"),
    }
}

#[rstest]
#[tokio::test]
async fn storable_response_is_persisted_with_clock_timestamp(clock: Arc<dyn Clock>) {
    let mut store = MockIdempotencyStore::new();
    store
        .expect_store()
        .withf(|record| {
            record.key.as_ref() == "abc"
                && record.response.body == br#"{"id":1}"#
                && record.created_at == now()
        })
        .times(1)
        .returning(|_| Ok(()));
    let guard = guard(store, clock, IdempotencyConfig::default());

    guard
        .complete(
            ticket("abc", false),
            201,
            StoredResponse::new(br#"{"id":1}"#.to_vec(), None),
        )
        .await;
}

#[rstest]
#[case(500, b"{}".as_slice())]
#[case(204, b"".as_slice())]
#[case(200, b"".as_slice())]
#[tokio::test]
async fn unstorable_responses_are_not_persisted(
    clock: Arc<dyn Clock>,
    #[case] status: u16,
    #[case] body: &[u8],
) {
    let mut store = MockIdempotencyStore::new();
    store.expect_store().never();
    store.expect_release().never();
    let guard = guard(store, clock, IdempotencyConfig::default());

    guard
        .complete(ticket("abc", false), status, StoredResponse::new(body.to_vec(), None))
        .await;
}

#[rstest]
#[tokio::test]
async fn duplicate_insert_is_swallowed(clock: Arc<dyn Clock>) {
    let mut store = MockIdempotencyStore::new();
    store
        .expect_store()
        .returning(|record| Err(IdempotencyStoreError::duplicate_key(record.key.as_ref())));
    let mut metrics = MockIdempotencyMetrics::new();
    metrics.expect_record_store_failure().never();
    metrics.expect_record_stored().never();
    let guard = IdempotencyGuard::new(
        Arc::new(store),
        Arc::new(metrics),
        clock,
        IdempotencyConfig::default(),
    );

    guard
        .complete(ticket("abc", false), 200, StoredResponse::new(b"{}".to_vec(), None))
        .await;
}

#[rstest]
#[tokio::test]
async fn store_failure_is_counted_and_ignored(clock: Arc<dyn Clock>) {
    let mut store = MockIdempotencyStore::new();
    store
        .expect_store()
        .returning(|_| Err(IdempotencyStoreError::query("disk full")));
    let mut metrics = MockIdempotencyMetrics::new();
    metrics
        .expect_record_store_failure()
        .times(1)
        .returning(|| Err(crate::domain::ports::IdempotencyMetricsError::export("down")));
    let guard = IdempotencyGuard::new(
        Arc::new(store),
        Arc::new(metrics),
        clock,
        IdempotencyConfig::default(),
    );

    guard
        .complete(ticket("abc", false), 200, StoredResponse::new(b"{}".to_vec(), None))
        .await;
}

mod reserve_mode {
    use super::*;

    fn reserve_config() -> IdempotencyConfig {
        IdempotencyConfig::default().with_mode(GuardMode::Reserve)
    }

    #[rstest]
    #[tokio::test]
    async fn acquired_reservation_proceeds(clock: Arc<dyn Clock>) {
        let mut store = MockIdempotencyStore::new();
        store.expect_lookup().never();
        store
            .expect_reserve()
            .times(1)
            .returning(|_| Ok(ReservationOutcome::Acquired));
        let guard = guard(store, clock, reserve_config());

        let GuardDecision::Proceed(ticket) = guard.begin(Some(key("k1"))).await else {
            panic!("expected proceed");
        };
        assert!(ticket.is_reserved());
    }

    #[rstest]
    #[tokio::test]
    async fn held_reservation_is_a_conflict(clock: Arc<dyn Clock>) {
        let mut store = MockIdempotencyStore::new();
        store
            .expect_reserve()
            .returning(|_| Ok(ReservationOutcome::AlreadyReserved));
        let mut metrics = MockIdempotencyMetrics::new();
        metrics.expect_record_conflict().times(1).returning(|| Ok(()));
        let guard = IdempotencyGuard::new(Arc::new(store), Arc::new(metrics), clock, reserve_config());

        let GuardDecision::Reject(error) = guard.begin(Some(key("k1"))).await else {
            panic!("expected rejection");
        };
        assert_eq!(error.code(), ErrorCode::Conflict);
        assert_eq!(error.message(), KEY_IN_PROGRESS_MESSAGE);
    }

    #[rstest]
    #[tokio::test]
    async fn record_stored_meanwhile_is_replayed(clock: Arc<dyn Clock>) {
        let mut store = MockIdempotencyStore::new();
        store
            .expect_reserve()
            .returning(|_| Ok(ReservationOutcome::AlreadyStored(record("k1", b"{}"))));
        let guard = guard(store, clock, reserve_config());

        assert!(matches!(
            guard.begin(Some(key("k1"))).await,
            GuardDecision::Replay(_)
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn failed_handler_releases_the_reservation(clock: Arc<dyn Clock>) {
        let mut store = MockIdempotencyStore::new();
        store.expect_store().never();
        store
            .expect_release()
            .withf(|key| key.as_ref() == "k1")
            .times(1)
            .returning(|_| Ok(()));
        let guard = guard(store, clock, reserve_config());

        guard
            .complete(ticket("k1", true), 422, StoredResponse::new(b"{}".to_vec(), None))
            .await;
    }

    #[rstest]
    #[tokio::test]
    async fn failed_commit_releases_the_reservation(clock: Arc<dyn Clock>) {
        let mut store = MockIdempotencyStore::new();
        store
            .expect_store()
            .returning(|_| Err(IdempotencyStoreError::connection("reset")));
        store.expect_release().times(1).returning(|_| Ok(()));
        let guard = guard(store, clock, reserve_config());

        guard
            .complete(ticket("k1", true), 201, StoredResponse::new(b"{}".to_vec(), None))
            .await;
    }

    #[rstest]
    #[tokio::test]
    async fn abandon_releases_only_reserved_tickets(clock: Arc<dyn Clock>) {
        let mut store = MockIdempotencyStore::new();
        store.expect_release().times(1).returning(|_| Ok(()));
        let guard = guard(store, clock, reserve_config());

        guard.abandon(ticket("k1", false)).await;
        guard.abandon(ticket("k1", true)).await;
    }
}
