//! Builders for the idempotency store, guard and HTTP state.

use std::sync::Arc;

use mockable::Clock;
use tracing::info;

use mfi_backend::domain::ports::{EventPublisher, IdempotencyMetrics, IdempotencyStore};
use mfi_backend::domain::{IdempotencyGuard, TransactionService};
use mfi_backend::inbound::http::state::HttpState;
use mfi_backend::outbound::cache::RedisIdempotencyStore;
use mfi_backend::outbound::memory::{InMemoryIdempotencyStore, InMemoryTransactionRepository};
use mfi_backend::outbound::persistence::{
    DbPool, DieselIdempotencyStore, PoolConfig, run_migrations,
};

use super::config::{ServerConfig, StoreBackend};

/// Connect the configured idempotency store.
///
/// # Errors
/// Returns [`std::io::Error`] when Redis or PostgreSQL cannot be reached or
/// migrations fail.
pub(crate) async fn build_idempotency_store(
    config: &ServerConfig,
    clock: Arc<dyn Clock>,
) -> std::io::Result<Arc<dyn IdempotencyStore>> {
    let ttl = config.idempotency.ttl();
    match &config.store {
        StoreBackend::Redis(url) => {
            let store = RedisIdempotencyStore::connect(url, ttl, clock)
                .await
                .map_err(|e| std::io::Error::other(format!("redis store unavailable: {e}")))?;
            info!("idempotency records stored in redis");
            Ok(Arc::new(store))
        }
        StoreBackend::Postgres(url) => {
            run_migrations(url)
                .await
                .map_err(|e| std::io::Error::other(format!("migrations failed: {e}")))?;
            let pool = DbPool::new(PoolConfig::new(url.as_str()))
                .await
                .map_err(|e| std::io::Error::other(format!("database pool failed: {e}")))?;
            info!("idempotency records stored in postgres");
            Ok(Arc::new(DieselIdempotencyStore::new(pool, ttl, clock)))
        }
        StoreBackend::Memory => {
            info!("idempotency records kept in memory");
            Ok(Arc::new(InMemoryIdempotencyStore::new(ttl, clock)))
        }
    }
}

/// Idempotency metrics exported through `registry`.
///
/// # Errors
/// Returns [`std::io::Error`] if metric registration fails.
#[cfg(feature = "metrics")]
pub(crate) fn build_idempotency_metrics(
    registry: &prometheus::Registry,
) -> std::io::Result<Arc<dyn IdempotencyMetrics>> {
    use mfi_backend::outbound::metrics::PrometheusIdempotencyMetrics;

    PrometheusIdempotencyMetrics::new(registry)
        .map(|metrics| Arc::new(metrics) as Arc<dyn IdempotencyMetrics>)
        .map_err(|e| std::io::Error::other(format!("idempotency metrics registration failed: {e}")))
}

/// Metrics are discarded when the `metrics` feature is disabled.
#[cfg(not(feature = "metrics"))]
pub(crate) fn build_idempotency_metrics() -> Arc<dyn IdempotencyMetrics> {
    Arc::new(mfi_backend::domain::ports::NoOpIdempotencyMetrics)
}

/// Guard over `store` using the configured header, ttl, policy and mode.
pub(crate) fn build_guard(
    config: &ServerConfig,
    store: Arc<dyn IdempotencyStore>,
    metrics: Arc<dyn IdempotencyMetrics>,
    clock: Arc<dyn Clock>,
) -> IdempotencyGuard {
    IdempotencyGuard::new(store, metrics, clock, config.idempotency.clone())
}

/// HTTP state with the ledger announcing through `publisher`.
pub(crate) fn build_http_state(
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
) -> HttpState {
    let repository = Arc::new(InMemoryTransactionRepository::new());
    HttpState::new(TransactionService::new(repository, publisher, clock))
}
