//! Prometheus adapter for idempotency guard outcomes.

use async_trait::async_trait;
use prometheus::{IntCounterVec, Opts, Registry};

use crate::domain::ports::{IdempotencyMetrics, IdempotencyMetricsError, IdempotencyOutcome};

/// Prometheus-backed idempotency metrics recorder.
///
/// # Metrics
///
/// - **Name**: `mfi_idempotency_requests_total`
/// - **Type**: Counter
/// - **Labels**:
///   - `outcome`: `hit`, `miss`, `stored`, `store_failure`, or `conflict`
pub struct PrometheusIdempotencyMetrics {
    requests_total: IntCounterVec,
}

impl PrometheusIdempotencyMetrics {
    /// Create and register metrics with the given registry.
    ///
    /// # Errors
    ///
    /// Returns an error if a metric with the same name is already registered.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let requests_total = IntCounterVec::new(
            Opts::new(
                "mfi_idempotency_requests_total",
                "Idempotency guard decisions by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;
        Ok(Self { requests_total })
    }

    fn record(&self, outcome: IdempotencyOutcome) -> Result<(), IdempotencyMetricsError> {
        self.requests_total
            .get_metric_with_label_values(&[outcome.as_str()])
            .map_err(|err| IdempotencyMetricsError::export(err.to_string()))?
            .inc();
        Ok(())
    }
}

#[async_trait]
impl IdempotencyMetrics for PrometheusIdempotencyMetrics {
    async fn record_hit(&self) -> Result<(), IdempotencyMetricsError> {
        self.record(IdempotencyOutcome::Hit)
    }

    async fn record_miss(&self) -> Result<(), IdempotencyMetricsError> {
        self.record(IdempotencyOutcome::Miss)
    }

    async fn record_stored(&self) -> Result<(), IdempotencyMetricsError> {
        self.record(IdempotencyOutcome::Stored)
    }

    async fn record_store_failure(&self) -> Result<(), IdempotencyMetricsError> {
        self.record(IdempotencyOutcome::StoreFailure)
    }

    async fn record_conflict(&self) -> Result<(), IdempotencyMetricsError> {
        self.record(IdempotencyOutcome::Conflict)
    }
}
