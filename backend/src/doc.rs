//! OpenAPI documentation configuration.
//!
//! [`ApiDoc`] registers the transaction endpoints, the realtime upgrade and
//! the health probes together with the domain schemas they return. It backs
//! Swagger UI in debug builds and `cargo run --bin openapi-dump`.

use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::domain::{Error, ErrorCode, Transaction, TransactionKind};
use crate::inbound::http::transactions::CreateTransactionRequestBody;

/// Registers the bearer credential used by the realtime socket.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi
            .components
            .get_or_insert_with(utoipa::openapi::Components::default);

        components.add_security_scheme(
            "BearerToken",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );
    }
}

/// OpenAPI document for the REST API.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Microfinance MIS backend API",
        description = "Ledger endpoints with idempotent retries, the realtime socket and health probes."
    ),
    servers(
        (url = "/", description = "Relative to the deployment base URL")
    ),
    paths(
        crate::inbound::http::transactions::create_transaction,
        crate::inbound::http::transactions::get_transaction,
        crate::inbound::ws::ws_entry,
        crate::inbound::http::health::ready,
        crate::inbound::http::health::live,
    ),
    components(schemas(
        Error,
        ErrorCode,
        Transaction,
        TransactionKind,
        CreateTransactionRequestBody
    )),
    tags(
        (name = "transactions", description = "Savings and loan ledger"),
        (name = "realtime", description = "WebSocket event relay"),
        (name = "health", description = "Endpoints for health checks")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use utoipa::openapi::RefOr;
    use utoipa::openapi::schema::Schema;

    fn object_fields(name: &str) -> Vec<String> {
        let doc = ApiDoc::openapi();
        let schemas = doc.components.expect("components").schemas;
        match schemas.get(name).expect("schema registered") {
            RefOr::T(Schema::Object(obj)) => obj.properties.keys().cloned().collect(),
            _ => panic!("expected object schema for {name}"),
        }
    }

    #[rstest]
    #[case("Error", &["code", "message"])]
    #[case("Transaction", &["id", "groupId", "memberId", "kind", "amount", "createdAt"])]
    #[case("CreateTransactionRequestBody", &["groupId", "memberId", "kind", "amount"])]
    fn schemas_expose_wire_fields(#[case] name: &str, #[case] fields: &[&str]) {
        let present = object_fields(name);
        for field in fields {
            assert!(present.iter().any(|p| p == field), "{name} lacks {field}");
        }
    }

    #[rstest]
    #[case("/api/v1/transactions")]
    #[case("/api/v1/transactions/{id}")]
    #[case("/ws")]
    #[case("/health/ready")]
    #[case("/health/live")]
    fn paths_are_documented(#[case] path: &str) {
        assert!(ApiDoc::openapi().paths.paths.contains_key(path));
    }
}
