//! Domain ports and supporting types for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod event_publisher;
mod idempotency_metrics;
mod idempotency_store;
mod realtime_transport;
mod transaction_repository;

#[cfg(test)]
pub use event_publisher::MockEventPublisher;
pub use event_publisher::{EventPublisher, EventPublisherError, NoOpEventPublisher};
#[cfg(test)]
pub use idempotency_metrics::MockIdempotencyMetrics;
pub use idempotency_metrics::{
    IdempotencyMetrics, IdempotencyMetricsError, IdempotencyOutcome, NoOpIdempotencyMetrics,
};
#[cfg(test)]
pub use idempotency_store::MockIdempotencyStore;
pub use idempotency_store::{IdempotencyStore, IdempotencyStoreError};
#[cfg(test)]
pub use realtime_transport::{MockRealtimeTransport, MockTransportConnection};
pub use realtime_transport::{
    RealtimeTransport, RealtimeTransportError, TransportConnection, TransportEvent,
    TransportEventSink,
};
#[cfg(test)]
pub use transaction_repository::MockTransactionRepository;
pub use transaction_repository::{TransactionRepository, TransactionRepositoryError};
