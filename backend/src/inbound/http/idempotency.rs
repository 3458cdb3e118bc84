//! Idempotency middleware for mutating routes.
//!
//! Wrap a scope with [`Idempotency`] to deduplicate requests carrying the
//! configured key header. Safe methods (`GET`, `HEAD`, `OPTIONS`, `TRACE`)
//! pass straight through. A stored response is replayed as `200` with its
//! original body and `Content-Type` plus `Idempotent-Replayed: true`; the
//! handler does not run. Otherwise the handler runs and, once its response
//! has been sent on its way, the outcome is handed to the guard on a spawned
//! task so persistence never delays the client.

use std::future::Future;
use std::rc::Rc;
use std::task::{Context, Poll};

use actix_web::body::{BoxBody, MessageBody, to_bytes};
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::{self, HeaderMap, HeaderValue};
use actix_web::{HttpResponse, ResponseError};
use futures_util::future::{LocalBoxFuture, Ready, ready};
use tracing::{debug, error};

use crate::domain::idempotency::{IdempotencyKey, IdempotencyRecord, StoredResponse};
use crate::domain::{Error, GuardDecision, GuardTicket, IdempotencyGuard, TraceId};

/// Header marking a replayed response.
pub const IDEMPOTENT_REPLAYED_HEADER: &str = "Idempotent-Replayed";

/// Read the idempotency key from `headers`.
///
/// Any non-blank value is a key. Missing and blank values yield `None`;
/// blank ones are logged at debug level and the request runs unguarded.
pub fn extract_idempotency_key(headers: &HeaderMap, header_name: &str) -> Option<IdempotencyKey> {
    let value = headers.get(header_name)?;
    match IdempotencyKey::from_header_bytes(value.as_bytes()) {
        Ok(key) => Some(key),
        Err(err) => {
            debug!(header = header_name, error = %err, "ignoring unusable idempotency key");
            None
        }
    }
}

/// Build the response replayed for `record`.
pub fn replay_response(record: &IdempotencyRecord) -> HttpResponse {
    let mut builder = HttpResponse::Ok();
    if let Some(content_type) = record.response.content_type.as_deref() {
        builder.insert_header((header::CONTENT_TYPE, content_type));
    }
    builder
        .insert_header((IDEMPOTENT_REPLAYED_HEADER, HeaderValue::from_static("true")))
        .body(record.response.body.clone())
}

fn spawn_in_trace_scope<F>(fut: F)
where
    F: Future<Output = ()> + 'static,
{
    match TraceId::current() {
        Some(trace_id) => {
            actix_web::rt::spawn(TraceId::scope(trace_id, fut));
        }
        None => {
            actix_web::rt::spawn(fut);
        }
    }
}

/// Middleware factory applying an [`IdempotencyGuard`].
///
/// # Examples
/// ```no_run
/// use std::sync::Arc;
/// use actix_web::{App, web};
/// use mockable::DefaultClock;
/// use mfi_backend::domain::IdempotencyGuard;
/// use mfi_backend::domain::idempotency::IdempotencyConfig;
/// use mfi_backend::domain::ports::NoOpIdempotencyMetrics;
/// use mfi_backend::inbound::http::idempotency::Idempotency;
/// use mfi_backend::outbound::memory::InMemoryIdempotencyStore;
///
/// let config = IdempotencyConfig::default();
/// let store = InMemoryIdempotencyStore::new(config.ttl(), Arc::new(DefaultClock));
/// let guard = IdempotencyGuard::new(
///     Arc::new(store),
///     Arc::new(NoOpIdempotencyMetrics),
///     Arc::new(DefaultClock),
///     config,
/// );
/// let _app = App::new().service(web::scope("/api/v1").wrap(Idempotency::new(guard)));
/// ```
#[derive(Clone)]
pub struct Idempotency {
    guard: IdempotencyGuard,
}

impl Idempotency {
    /// Wrap routes with `guard`.
    pub fn new(guard: IdempotencyGuard) -> Self {
        Self { guard }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Idempotency
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = actix_web::Error;
    type InitError = ();
    type Transform = IdempotencyMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(IdempotencyMiddleware {
            service: Rc::new(service),
            guard: self.guard.clone(),
        }))
    }
}

/// Service wrapper produced by [`Idempotency`].
pub struct IdempotencyMiddleware<S> {
    service: Rc<S>,
    guard: IdempotencyGuard,
}

impl<S, B> Service<ServiceRequest> for IdempotencyMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let guard = self.guard.clone();
        Box::pin(async move {
            if req.method().is_safe() {
                return Ok(service.call(req).await?.map_into_boxed_body());
            }
            let key = extract_idempotency_key(req.headers(), guard.config().header_name());
            match guard.begin(key).await {
                GuardDecision::PassThrough => {
                    Ok(service.call(req).await?.map_into_boxed_body())
                }
                GuardDecision::Replay(record) => Ok(req.into_response(replay_response(&record))),
                GuardDecision::Reject(err) => Ok(req.into_response(err.error_response())),
                GuardDecision::Proceed(ticket) => run_guarded(&*service, req, guard, ticket).await,
            }
        })
    }
}

async fn run_guarded<S, B>(
    service: &S,
    req: ServiceRequest,
    guard: IdempotencyGuard,
    ticket: GuardTicket,
) -> Result<ServiceResponse<BoxBody>, actix_web::Error>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody + 'static,
{
    let res = match service.call(req).await {
        Ok(res) => res,
        Err(err) => {
            spawn_in_trace_scope(async move { guard.abandon(ticket).await });
            return Err(err);
        }
    };

    let status = res.status();
    if !status.is_success() {
        spawn_in_trace_scope(async move { guard.abandon(ticket).await });
        return Ok(res.map_into_boxed_body());
    }

    let content_type = res
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let (req, res) = res.into_parts();
    let (res, body) = res.into_parts();
    let bytes = match to_bytes(body).await {
        Ok(bytes) => bytes,
        Err(err) => {
            let err: Box<dyn std::error::Error> = err.into();
            error!(error = %err, "failed to buffer response body for idempotency");
            spawn_in_trace_scope(async move { guard.abandon(ticket).await });
            return Err(Error::internal("failed to read response body").into());
        }
    };

    let response = StoredResponse::new(bytes.to_vec(), content_type);
    let status_code = status.as_u16();
    spawn_in_trace_scope(async move { guard.complete(ticket, status_code, response).await });

    let res = res.set_body(BoxBody::new(bytes));
    Ok(ServiceResponse::new(req, res))
}

#[cfg(test)]
#[path = "idempotency_tests.rs"]
mod tests;
