//! Port for recording idempotency guard outcomes.
//!
//! Metric writes are fire-and-forget: the guard ignores failures so a broken
//! exporter never affects request handling.

use async_trait::async_trait;

use super::define_port_error;

define_port_error! {
    /// Errors exposed when recording idempotency metrics.
    pub enum IdempotencyMetricsError {
        /// Metric exporter rejected the write.
        Export { message: String } => "idempotency metrics exporter failed: {message}",
    }
}

/// Outcome labels shared by metric adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdempotencyOutcome {
    /// A stored response was replayed.
    Hit,
    /// No record existed; the handler ran.
    Miss,
    /// A response was persisted for replay.
    Stored,
    /// Persisting a response failed.
    StoreFailure,
    /// A concurrent request already held the key.
    Conflict,
}

impl IdempotencyOutcome {
    /// Stable label value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
            Self::Stored => "stored",
            Self::StoreFailure => "store_failure",
            Self::Conflict => "conflict",
        }
    }
}

/// Metrics recording port for idempotency outcomes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdempotencyMetrics: Send + Sync {
    /// Record a replayed response.
    async fn record_hit(&self) -> Result<(), IdempotencyMetricsError>;

    /// Record a first-seen key.
    async fn record_miss(&self) -> Result<(), IdempotencyMetricsError>;

    /// Record a persisted response.
    async fn record_stored(&self) -> Result<(), IdempotencyMetricsError>;

    /// Record a failed persistence attempt.
    async fn record_store_failure(&self) -> Result<(), IdempotencyMetricsError>;

    /// Record a request rejected because its key was reserved.
    async fn record_conflict(&self) -> Result<(), IdempotencyMetricsError>;
}

/// Discards every metric.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpIdempotencyMetrics;

#[async_trait]
impl IdempotencyMetrics for NoOpIdempotencyMetrics {
    async fn record_hit(&self) -> Result<(), IdempotencyMetricsError> {
        Ok(())
    }

    async fn record_miss(&self) -> Result<(), IdempotencyMetricsError> {
        Ok(())
    }

    async fn record_stored(&self) -> Result<(), IdempotencyMetricsError> {
        Ok(())
    }

    async fn record_store_failure(&self) -> Result<(), IdempotencyMetricsError> {
        Ok(())
    }

    async fn record_conflict(&self) -> Result<(), IdempotencyMetricsError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[tokio::test]
    async fn noop_accepts_every_outcome() {
        let metrics = NoOpIdempotencyMetrics;
        assert!(metrics.record_hit().await.is_ok());
        assert!(metrics.record_miss().await.is_ok());
        assert!(metrics.record_stored().await.is_ok());
        assert!(metrics.record_store_failure().await.is_ok());
        assert!(metrics.record_conflict().await.is_ok());
    }

    #[rstest]
    #[case(IdempotencyOutcome::Hit, "hit")]
    #[case(IdempotencyOutcome::Miss, "miss")]
    #[case(IdempotencyOutcome::Stored, "stored")]
    #[case(IdempotencyOutcome::StoreFailure, "store_failure")]
    #[case(IdempotencyOutcome::Conflict, "conflict")]
    fn outcome_labels_are_stable(#[case] outcome: IdempotencyOutcome, #[case] label: &str) {
        assert_eq!(outcome.as_str(), label);
    }

    #[test]
    fn export_error_message() {
        let err = IdempotencyMetricsError::export("registry closed");
        assert_eq!(
            err.to_string(),
            "idempotency metrics exporter failed: registry closed"
        );
    }
}
