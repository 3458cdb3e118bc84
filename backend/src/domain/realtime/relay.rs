//! Connection manager translating transport activity into local events.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crate::domain::ports::{
    RealtimeTransport, RealtimeTransportError, TransportConnection, TransportEvent,
    TransportEventSink,
};

use super::events::{ControlEvent, LocalEvent};
use super::subscriptions::{EventCallback, Subscription, SubscriptionTable};

/// Errors returned by [`RealtimeRelay::connect`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    /// The credential was blank.
    #[error("realtime credential must not be empty")]
    EmptyCredential,
    /// The transport refused to open a connection.
    #[error(transparent)]
    Transport(#[from] RealtimeTransportError),
    /// [`RealtimeRelay::disconnect`] ran before the connection was stored.
    #[error("realtime connection was closed while it was opening")]
    Cancelled,
}

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Shared handle to the relay's transport connection.
///
/// Clones refer to the same connection; compare with
/// [`same_as`](Self::same_as).
#[derive(Clone)]
pub struct ConnectionHandle {
    id: u64,
    connection: Arc<dyn TransportConnection>,
    ended: Arc<AtomicBool>,
}

impl ConnectionHandle {
    fn new(connection: Arc<dyn TransportConnection>, ended: Arc<AtomicBool>) -> Self {
        Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            connection,
            ended,
        }
    }

    /// Process-unique connection number.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether both handles refer to the same connection.
    pub fn same_as(&self, other: &Self) -> bool {
        self.id == other.id
    }

    /// Whether the socket is open.
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    fn has_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Receives transport events for one connection and fans them out.
struct Dispatcher {
    subscriptions: Arc<SubscriptionTable>,
    generation: Arc<AtomicU64>,
    expected_generation: u64,
    ended: Arc<AtomicBool>,
}

impl TransportEventSink for Dispatcher {
    fn deliver(&self, event: TransportEvent) {
        if self.generation.load(Ordering::SeqCst) != self.expected_generation {
            debug!(?event, "dropping event from a superseded connection");
            return;
        }
        match event {
            TransportEvent::Connected => {
                info!("realtime connection established");
                dispatch(
                    &self.subscriptions,
                    LocalEvent::ConnectionStatus.as_str(),
                    &json!({ "connected": true }),
                );
            }
            TransportEvent::Disconnected { reason } => {
                info!(%reason, "realtime connection closed");
                self.ended.store(true, Ordering::SeqCst);
                dispatch(
                    &self.subscriptions,
                    LocalEvent::ConnectionStatus.as_str(),
                    &json!({ "connected": false, "reason": reason }),
                );
            }
            TransportEvent::ConnectError { message } => {
                warn!(%message, "realtime connection failed");
                self.ended.store(true, Ordering::SeqCst);
                dispatch(
                    &self.subscriptions,
                    LocalEvent::ConnectionError.as_str(),
                    &json!({ "message": message }),
                );
            }
            TransportEvent::Message { event, payload } => {
                dispatch(&self.subscriptions, &event, &payload);
            }
        }
    }
}

fn dispatch(subscriptions: &SubscriptionTable, event: &str, payload: &Value) {
    let callbacks = subscriptions.callbacks_for(event);
    if callbacks.is_empty() {
        debug!(event, "no subscribers for realtime event");
        return;
    }
    for callback in callbacks {
        if catch_unwind(AssertUnwindSafe(|| callback(payload))).is_err() {
            error!(event, "realtime subscriber panicked");
        }
    }
}

/// Owns one realtime connection and a local publish/subscribe table.
///
/// Construct one per application and share it as `Arc<RealtimeRelay>`.
///
/// ```no_run
/// # use std::sync::Arc;
/// # use mfi_backend::domain::realtime::RealtimeRelay;
/// # use mfi_backend::outbound::realtime::AwcTransport;
/// let relay = RealtimeRelay::new(Arc::new(AwcTransport::new("ws://127.0.0.1:8080/ws")));
/// let _status = relay.on("connection_status", Arc::new(|payload| println!("{payload}")));
/// relay.connect("member-42").expect("credential is not blank");
/// relay.join_room("group:7");
/// ```
pub struct RealtimeRelay {
    transport: Arc<dyn RealtimeTransport>,
    connecting: Mutex<()>,
    connection: Mutex<Option<ConnectionHandle>>,
    subscriptions: Arc<SubscriptionTable>,
    generation: Arc<AtomicU64>,
}

impl RealtimeRelay {
    /// Build a relay over `transport`. No connection is opened yet.
    pub fn new(transport: Arc<dyn RealtimeTransport>) -> Self {
        Self {
            transport,
            connecting: Mutex::new(()),
            connection: Mutex::new(None),
            subscriptions: Arc::new(SubscriptionTable::default()),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<ConnectionHandle>> {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Open the connection, or return the live one.
    ///
    /// While a connection is open or still handshaking, every call returns
    /// a handle to that same connection and `credential` is ignored.
    /// Transport failures are also delivered as `connection_error`.
    ///
    /// # Errors
    ///
    /// - [`RelayError::EmptyCredential`] for a blank credential.
    /// - [`RelayError::Transport`] when the transport refuses.
    /// - [`RelayError::Cancelled`] when `disconnect` runs before the new
    ///   connection is stored.
    pub fn connect(&self, credential: &str) -> Result<ConnectionHandle, RelayError> {
        let _connecting = self
            .connecting
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let current = self.slot().clone();
        if let Some(existing) = current.filter(|handle| !handle.has_ended()) {
            debug!(connection = existing.id(), "reusing realtime connection");
            return Ok(existing);
        }

        let credential = credential.trim();
        if credential.is_empty() {
            return Err(RelayError::EmptyCredential);
        }

        let stale = self.slot().take();
        if let Some(stale) = stale {
            stale.connection.close();
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let ended = Arc::new(AtomicBool::new(false));
        let sink = Arc::new(Dispatcher {
            subscriptions: Arc::clone(&self.subscriptions),
            generation: Arc::clone(&self.generation),
            expected_generation: generation,
            ended: Arc::clone(&ended),
        });

        match self.transport.connect(credential, sink) {
            Ok(connection) => {
                let handle = ConnectionHandle::new(connection, ended);
                let mut slot = self.slot();
                if self.generation.load(Ordering::SeqCst) != generation {
                    drop(slot);
                    info!(connection = handle.id(), "realtime connection cancelled while opening");
                    handle.ended.store(true, Ordering::SeqCst);
                    handle.connection.close();
                    return Err(RelayError::Cancelled);
                }
                info!(connection = handle.id(), "realtime connection opened");
                *slot = Some(handle.clone());
                Ok(handle)
            }
            Err(err) => {
                warn!(error = %err, "realtime transport refused connection");
                dispatch(
                    &self.subscriptions,
                    LocalEvent::ConnectionError.as_str(),
                    &json!({ "message": err.to_string() }),
                );
                Err(RelayError::Transport(err))
            }
        }
    }

    /// Whether the connection is open.
    pub fn is_connected(&self) -> bool {
        self.slot()
            .as_ref()
            .is_some_and(ConnectionHandle::is_connected)
    }

    /// Register `callback` for `event`. Registering the same `Arc` twice
    /// is a no-op; both handles then unsubscribe the one registration.
    pub fn on(&self, event: &str, callback: EventCallback) -> Subscription {
        if !self.subscriptions.add(event, Arc::clone(&callback)) {
            debug!(event, "callback already subscribed");
        }
        Subscription::new(event, callback, &self.subscriptions)
    }

    /// Remove `callback` from `event`. Returns whether it was registered.
    pub fn off(&self, event: &str, callback: &EventCallback) -> bool {
        self.subscriptions.remove(event, callback)
    }

    /// Number of callbacks registered for `event`.
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.subscriptions.count(event)
    }

    /// Send `event` if connected; otherwise log a warning and drop it.
    pub fn send(&self, event: &str, payload: Value) {
        let connection = self.slot().clone();
        match connection {
            Some(handle) if handle.is_connected() => {
                if let Err(err) = handle.connection.emit(event, &payload) {
                    warn!(event, error = %err, "failed to send realtime event");
                }
            }
            _ => warn!(event, "realtime relay is not connected; dropping event"),
        }
    }

    fn send_control(&self, control: ControlEvent, payload: Value) {
        self.send(control.as_str(), payload);
    }

    /// Join `room`.
    pub fn join_room(&self, room: &str) {
        self.send_control(ControlEvent::JoinRoom, json!({ "room": room }));
    }

    /// Leave `room`.
    pub fn leave_room(&self, room: &str) {
        self.send_control(ControlEvent::LeaveRoom, json!({ "room": room }));
    }

    /// Announce typing in `room`.
    pub fn start_typing(&self, room: &str) {
        self.send_control(ControlEvent::TypingStart, json!({ "room": room }));
    }

    /// Announce that typing in `room` stopped.
    pub fn stop_typing(&self, room: &str) {
        self.send_control(ControlEvent::TypingStop, json!({ "room": room }));
    }

    /// Publish a presence status.
    pub fn update_status(&self, status: &str) {
        self.send_control(ControlEvent::StatusUpdate, json!({ "status": status }));
    }

    /// Close the connection and drop every subscription.
    ///
    /// Events still in flight from the closed connection are discarded. A
    /// `connect` still talking to the transport fails with
    /// [`RelayError::Cancelled`].
    pub fn disconnect(&self) {
        let previous = {
            let mut slot = self.slot();
            self.generation.fetch_add(1, Ordering::SeqCst);
            slot.take()
        };
        if let Some(handle) = previous {
            info!(connection = handle.id(), "closing realtime connection");
            handle.connection.close();
        }
        self.subscriptions.clear();
    }
}

impl fmt::Debug for RealtimeRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeRelay")
            .field("connection", &*self.slot())
            .field("subscriptions", &self.subscriptions)
            .finish_non_exhaustive()
    }
}
