//! Backend entry-point: loads settings, wires the server and runs it.

mod server;

use actix_web::web;
use ortho_config::OrthoConfig;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use mfi_backend::inbound::http::health::HealthState;
use server::{ServerConfig, ServerSettings, create_server};

/// Application bootstrap.
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let settings = ServerSettings::load()
        .map_err(|e| std::io::Error::other(format!("failed to load settings: {e}")))?;
    let config = ServerConfig::try_from(&settings)?;
    info!(bind_addr = %config.bind_addr, "starting server");

    let health_state = web::Data::new(HealthState::new());
    let server = create_server(health_state, config).await?;
    server.await
}
