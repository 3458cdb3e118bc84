//! WebSocket inbound adapter hosting the realtime hub.
//!
//! Responsibilities:
//! - authenticate upgrade requests with a bearer credential
//! - run one session task per socket, registered with the [`hub::RealtimeHub`]
//! - keep WebSocket-specific concerns at the edge of the system

use actix_web::http::header::AUTHORIZATION;
use actix_web::web::{self, Payload};
use actix_web::{HttpRequest, HttpResponse, get};
use serde::Deserialize;
use tracing::{debug, error};

use crate::domain::Error;

pub mod hub;
pub mod messages;
mod session;
pub mod state;

#[derive(Debug, Deserialize)]
struct CredentialQuery {
    token: Option<String>,
}

/// Credential from `Authorization: Bearer <token>` or the `token` query
/// parameter, in that order. Blank values count as missing.
fn credential(req: &HttpRequest) -> Option<String> {
    let bearer = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_owned);
    bearer.or_else(|| {
        web::Query::<CredentialQuery>::from_query(req.query_string())
            .ok()
            .and_then(|query| query.into_inner().token)
            .map(|token| token.trim().to_owned())
            .filter(|token| !token.is_empty())
    })
}

/// Handle WebSocket upgrade for the `/ws` endpoint.
#[utoipa::path(
    get,
    path = "/ws",
    params(("token" = Option<String>, Query, description = "Credential when no Authorization header is sent")),
    responses(
        (status = 101, description = "Switching protocols to the realtime socket"),
        (status = 401, description = "Missing credential", body = Error)
    ),
    tags = ["realtime"]
)]
#[get("/ws")]
pub async fn ws_entry(
    state: web::Data<state::WsState>,
    req: HttpRequest,
    stream: Payload,
) -> actix_web::Result<HttpResponse> {
    let Some(member) = credential(&req) else {
        debug!("rejecting realtime upgrade without credential");
        return Err(Error::unauthorized("realtime credential required").into());
    };

    let (response, session, messages) = actix_ws::handle(&req, stream).map_err(|error| {
        error!(error = %error, "WebSocket upgrade failed");
        error
    })?;
    actix_web::rt::spawn(session::handle_ws_session(
        state.hub.clone(),
        member,
        session,
        messages,
    ));
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;
    use rstest::rstest;

    #[rstest]
    #[case(TestRequest::default().insert_header((AUTHORIZATION, "Bearer alice")), Some("alice"))]
    #[case(TestRequest::default().uri("/ws?token=bob"), Some("bob"))]
    #[case(
        TestRequest::default()
            .uri("/ws?token=bob")
            .insert_header((AUTHORIZATION, "Bearer alice")),
        Some("alice")
    )]
    #[case(TestRequest::default().insert_header((AUTHORIZATION, "Bearer   ")), None)]
    #[case(TestRequest::default().insert_header((AUTHORIZATION, "Basic YWxpY2U=")), None)]
    #[case(TestRequest::default().uri("/ws?token="), None)]
    #[case(TestRequest::default(), None)]
    fn credential_sources(#[case] req: TestRequest, #[case] expected: Option<&str>) {
        let req = req.to_http_request();
        assert_eq!(credential(&req).as_deref(), expected);
    }
}
