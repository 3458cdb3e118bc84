//! Server construction and middleware wiring.

mod config;
mod state_builders;

pub use config::{ServerConfig, ServerSettings};

use std::sync::Arc;

use actix_web::dev::{Server, ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::{App, HttpServer, web};
use mockable::{Clock, DefaultClock};
#[cfg(debug_assertions)]
use utoipa::OpenApi;
#[cfg(debug_assertions)]
use utoipa_swagger_ui::SwaggerUi;

use mfi_backend::Trace;
#[cfg(debug_assertions)]
use mfi_backend::doc::ApiDoc;
use mfi_backend::domain::{IdempotencyGuard, IdempotencySweeper};
use mfi_backend::inbound::http::error::json_config;
use mfi_backend::inbound::http::health::{HealthState, live, ready};
use mfi_backend::inbound::http::idempotency::Idempotency;
use mfi_backend::inbound::http::state::HttpState;
use mfi_backend::inbound::http::transactions::{create_transaction, get_transaction};
use mfi_backend::inbound::ws;
use mfi_backend::inbound::ws::hub::RealtimeHub;
use mfi_backend::inbound::ws::state::WsState;

use state_builders::{
    build_guard, build_http_state, build_idempotency_metrics, build_idempotency_store,
};

#[derive(Clone)]
struct AppDependencies {
    health_state: web::Data<HealthState>,
    http_state: web::Data<HttpState>,
    ws_state: web::Data<WsState>,
    guard: IdempotencyGuard,
}

fn build_app(
    deps: AppDependencies,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let AppDependencies {
        health_state,
        http_state,
        ws_state,
        guard,
    } = deps;

    let api = web::scope("/api/v1")
        .wrap(Idempotency::new(guard))
        .service(create_transaction)
        .service(get_transaction);

    let app = App::new()
        .app_data(health_state)
        .app_data(http_state)
        .app_data(ws_state)
        .app_data(json_config())
        .wrap(Trace)
        .service(api)
        .service(ws::ws_entry)
        .service(ready)
        .service(live);

    #[cfg(debug_assertions)]
    let app = app.service(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));

    app
}

#[cfg(feature = "metrics")]
fn make_metrics(
    registry: &prometheus::Registry,
) -> std::io::Result<actix_web_prom::PrometheusMetrics> {
    actix_web_prom::PrometheusMetricsBuilder::new("mfi")
        .registry(registry.clone())
        .endpoint("/metrics")
        .build()
        .map_err(|e| std::io::Error::other(format!("configure Prometheus metrics: {e}")))
}

/// Construct the HTTP server for `config`.
///
/// Connects the idempotency store, starts the expiry sweeper and marks
/// `health_state` ready once the listener is bound.
///
/// # Errors
/// Propagates [`std::io::Error`] when the store is unreachable, metric
/// registration fails or the socket cannot be bound.
pub async fn create_server(
    health_state: web::Data<HealthState>,
    config: ServerConfig,
) -> std::io::Result<Server> {
    let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
    let store = build_idempotency_store(&config, Arc::clone(&clock)).await?;

    #[cfg(feature = "metrics")]
    let registry = prometheus::Registry::new();
    #[cfg(feature = "metrics")]
    let metrics = build_idempotency_metrics(&registry)?;
    #[cfg(not(feature = "metrics"))]
    let metrics = build_idempotency_metrics();
    #[cfg(feature = "metrics")]
    let prometheus = make_metrics(&registry)?;

    let guard = build_guard(&config, Arc::clone(&store), metrics, Arc::clone(&clock));
    actix_web::rt::spawn(IdempotencySweeper::new(store, config.sweep_interval).run());

    let hub = Arc::new(RealtimeHub::new());
    let http_state = web::Data::new(build_http_state(hub.clone(), clock));
    let ws_state = web::Data::new(WsState::new(hub));
    let server_health_state = health_state.clone();

    let server = HttpServer::new(move || {
        let app = build_app(AppDependencies {
            health_state: server_health_state.clone(),
            http_state: http_state.clone(),
            ws_state: ws_state.clone(),
            guard: guard.clone(),
        });

        #[cfg(feature = "metrics")]
        let app = app.wrap(prometheus.clone());

        app
    })
    .bind(config.bind_addr)?
    .run();

    health_state.mark_ready();
    Ok(server)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test;
    use mfi_backend::domain::idempotency::IdempotencyConfig;
    use mfi_backend::domain::ports::{NoOpEventPublisher, NoOpIdempotencyMetrics};
    use mfi_backend::outbound::memory::InMemoryIdempotencyStore;
    use rstest::rstest;
    use serde_json::{Value, json};
    use std::time::Duration;

    fn deps() -> AppDependencies {
        let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
        let config = IdempotencyConfig::default();
        let store = Arc::new(InMemoryIdempotencyStore::new(config.ttl(), Arc::clone(&clock)));
        let health = HealthState::new();
        health.mark_ready();
        AppDependencies {
            health_state: web::Data::new(health),
            http_state: web::Data::new(build_http_state(
                Arc::new(NoOpEventPublisher),
                Arc::clone(&clock),
            )),
            ws_state: web::Data::new(WsState::new(Arc::new(RealtimeHub::new()))),
            guard: IdempotencyGuard::new(store, Arc::new(NoOpIdempotencyMetrics), clock, config),
        }
    }

    async fn wait_for_replay<S>(app: &S, body: &Value) -> actix_web::dev::ServiceResponse
    where
        S: actix_web::dev::Service<
                actix_http::Request,
                Response = ServiceResponse,
                Error = actix_web::Error,
            >,
    {
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let res = test::call_service(
                app,
                test::TestRequest::post()
                    .uri("/api/v1/transactions")
                    .insert_header(("Idempotency-Key", "retry-1"))
                    .set_json(body)
                    .to_request(),
            )
            .await;
            if res.headers().contains_key("idempotent-replayed") {
                return res;
            }
        }
        panic!("response was never replayed");
    }

    #[rstest]
    #[actix_web::test]
    async fn transactions_are_guarded_and_traced() {
        let app = test::init_service(build_app(deps())).await;
        let body = json!({"groupId": "g-1", "memberId": "m-1", "kind": "deposit", "amount": 250});

        let first = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/v1/transactions")
                .insert_header(("Idempotency-Key", "retry-1"))
                .set_json(&body)
                .to_request(),
        )
        .await;
        assert_eq!(first.status(), actix_web::http::StatusCode::CREATED);
        assert!(first.headers().contains_key("trace-id"));
        let created: Value = test::read_body_json(first).await;

        let replay = wait_for_replay(&app, &body).await;
        assert_eq!(replay.status(), actix_web::http::StatusCode::OK);
        let replayed: Value = test::read_body_json(replay).await;
        assert_eq!(replayed, created);
    }

    #[rstest]
    #[case("/health/ready")]
    #[case("/health/live")]
    #[actix_web::test]
    async fn probes_are_mounted(#[case] path: &str) {
        let app = test::init_service(build_app(deps())).await;

        let res = test::call_service(&app, test::TestRequest::get().uri(path).to_request()).await;

        assert!(res.status().is_success());
    }

    #[rstest]
    #[actix_web::test]
    async fn malformed_json_is_an_error_envelope() {
        let app = test::init_service(build_app(deps())).await;

        let res = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/v1/transactions")
                .insert_header(("content-type", "application/json"))
                .set_payload("{not json")
                .to_request(),
        )
        .await;

        assert_eq!(res.status(), actix_web::http::StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(res).await;
        assert_eq!(body["code"], "invalid_request");
    }
}
