//! Background removal of expired idempotency records.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::domain::ports::{IdempotencyStore, IdempotencyStoreError};

/// Default pause between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Periodically calls [`IdempotencyStore::cleanup_expired`].
#[derive(Clone)]
pub struct IdempotencySweeper {
    store: Arc<dyn IdempotencyStore>,
    interval: Duration,
}

impl IdempotencySweeper {
    /// Build a sweeper. A zero interval falls back to the default.
    pub fn new(store: Arc<dyn IdempotencyStore>, interval: Duration) -> Self {
        let interval = if interval.is_zero() {
            DEFAULT_SWEEP_INTERVAL
        } else {
            interval
        };
        Self { store, interval }
    }

    /// Pause between sweeps.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run a single sweep and log what it removed.
    pub async fn sweep_once(&self) -> Result<u64, IdempotencyStoreError> {
        let removed = self.store.cleanup_expired().await?;
        if removed > 0 {
            info!(removed, "removed expired idempotency records");
        } else {
            debug!("no expired idempotency records");
        }
        Ok(removed)
    }

    /// Sweep forever. The first sweep runs after one full interval.
    pub async fn run(self) {
        let mut ticker = time::interval_at(time::Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(error) = self.sweep_once().await {
                warn!(error = %error, "idempotency sweep failed");
            }
        }
    }
}
