//! Port for the client-side realtime socket used by the event relay.
//!
//! The trait is synchronous: adapters own whatever runtime drives the socket
//! and report progress through a [`TransportEventSink`], so the relay can be
//! shared across threads and called from any context.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::define_port_error;

define_port_error! {
    /// Errors raised by realtime transport adapters.
    pub enum RealtimeTransportError {
        /// The socket could not be opened.
        Connect { message: String } => "realtime transport connect failed: {message}",
        /// An outgoing frame could not be written.
        Send { message: String } => "realtime transport send failed: {message}",
    }
}

/// Activity reported by a transport connection.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The handshake completed.
    Connected,
    /// The connection ended.
    Disconnected {
        /// Human readable cause.
        reason: String,
    },
    /// The handshake failed.
    ConnectError {
        /// Error description.
        message: String,
    },
    /// An application frame arrived.
    Message {
        /// Event name.
        event: String,
        /// Event payload.
        payload: Value,
    },
}

/// Receiver for [`TransportEvent`]s, called from the transport's thread.
pub trait TransportEventSink: Send + Sync {
    /// Handle one event.
    fn deliver(&self, event: TransportEvent);
}

/// A live transport connection.
#[cfg_attr(test, mockall::automock)]
pub trait TransportConnection: Send + Sync {
    /// Whether the socket is currently open.
    fn is_connected(&self) -> bool;

    /// Queue a frame for sending.
    fn emit(&self, event: &str, payload: &Value) -> Result<(), RealtimeTransportError>;

    /// Close the socket. Idempotent.
    fn close(&self);
}

impl fmt::Debug for dyn TransportConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportConnection")
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Factory for transport connections.
#[cfg_attr(test, mockall::automock)]
pub trait RealtimeTransport: Send + Sync {
    /// Open a connection authenticated with `credential`.
    ///
    /// The handshake may complete asynchronously; its outcome is reported to
    /// `sink` as [`TransportEvent::Connected`] or
    /// [`TransportEvent::ConnectError`].
    fn connect(
        &self,
        credential: &str,
        sink: Arc<dyn TransportEventSink>,
    ) -> Result<Arc<dyn TransportConnection>, RealtimeTransportError>;
}
