//! WebSocket transport for the realtime relay built on `awc`.
//!
//! `awc` clients are `!Send`, so every connection gets its own thread running
//! an `actix_rt::System`. The relay talks to that thread through an unbounded
//! command channel and learns about socket activity through its
//! [`TransportEventSink`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use awc::ws::{CloseCode, Frame, Message};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, warn};

use crate::domain::ports::{
    RealtimeTransport, RealtimeTransportError, TransportConnection, TransportEvent,
    TransportEventSink,
};
use crate::domain::realtime::WireFrame;

/// Handshake timeout used by [`AwcTransport::new`].
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens WebSocket connections to a fixed endpoint.
#[derive(Debug, Clone)]
pub struct AwcTransport {
    url: String,
    connect_timeout: Duration,
}

impl AwcTransport {
    /// Transport for `url`, e.g. `ws://localhost:8080/ws`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Override the handshake timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Endpoint this transport dials.
    pub fn url(&self) -> &str {
        &self.url
    }
}

enum Command {
    Emit(String),
    Close,
}

struct AwcConnection {
    commands: UnboundedSender<Command>,
    connected: Arc<AtomicBool>,
}

impl TransportConnection for AwcConnection {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn emit(&self, event: &str, payload: &Value) -> Result<(), RealtimeTransportError> {
        if !self.is_connected() {
            return Err(RealtimeTransportError::send("socket is not open"));
        }
        let text = WireFrame::new(event, payload.clone())
            .encode()
            .map_err(|err| RealtimeTransportError::send(err.to_string()))?;
        self.commands
            .send(Command::Emit(text))
            .map_err(|_| RealtimeTransportError::send("socket task has stopped"))
    }

    fn close(&self) {
        self.connected.store(false, Ordering::Release);
        // The pump may already be gone.
        let _ = self.commands.send(Command::Close);
    }
}

impl RealtimeTransport for AwcTransport {
    fn connect(
        &self,
        credential: &str,
        sink: Arc<dyn TransportEventSink>,
    ) -> Result<Arc<dyn TransportConnection>, RealtimeTransportError> {
        let (commands, receiver) = unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));
        let pump = Pump {
            url: self.url.clone(),
            credential: credential.to_owned(),
            timeout: self.connect_timeout,
            connected: Arc::clone(&connected),
            sink,
        };
        thread::Builder::new()
            .name("realtime-relay".into())
            .spawn(move || actix_rt::System::new().block_on(pump.run(receiver)))
            .map_err(|err| RealtimeTransportError::connect(err.to_string()))?;
        Ok(Arc::new(AwcConnection {
            commands,
            connected,
        }))
    }
}

struct Pump {
    url: String,
    credential: String,
    timeout: Duration,
    connected: Arc<AtomicBool>,
    sink: Arc<dyn TransportEventSink>,
}

impl Pump {
    async fn run(self, mut commands: UnboundedReceiver<Command>) {
        let client = awc::Client::builder().timeout(self.timeout).finish();
        let socket = client
            .ws(self.url.as_str())
            .bearer_auth(&self.credential)
            .connect()
            .await;
        let (_response, socket) = match socket {
            Ok(pair) => pair,
            Err(err) => {
                debug!(url = %self.url, error = %err, "realtime handshake failed");
                self.sink.deliver(TransportEvent::ConnectError {
                    message: err.to_string(),
                });
                return;
            }
        };

        // A close requested during the handshake wins.
        if let Ok(Command::Close) = commands.try_recv() {
            self.sink.deliver(TransportEvent::Disconnected {
                reason: "closed by client".into(),
            });
            return;
        }

        self.connected.store(true, Ordering::Release);
        self.sink.deliver(TransportEvent::Connected);

        let (mut writer, mut reader) = socket.split();
        let reason = loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Emit(text)) => {
                        if let Err(err) = writer.send(Message::Text(text.into())).await {
                            break err.to_string();
                        }
                    }
                    Some(Command::Close) | None => {
                        let _ = writer
                            .send(Message::Close(Some(CloseCode::Normal.into())))
                            .await;
                        break "closed by client".to_owned();
                    }
                },
                frame = reader.next() => match frame {
                    Some(Ok(Frame::Text(bytes))) => self.forward(&bytes),
                    Some(Ok(Frame::Ping(bytes))) => {
                        if let Err(err) = writer.send(Message::Pong(bytes)).await {
                            break err.to_string();
                        }
                    }
                    Some(Ok(Frame::Close(close))) => {
                        break close
                            .and_then(|close| close.description)
                            .unwrap_or_else(|| "closed by server".to_owned());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => break err.to_string(),
                    None => break "stream ended".to_owned(),
                },
            }
        };

        self.connected.store(false, Ordering::Release);
        self.sink.deliver(TransportEvent::Disconnected { reason });
    }

    fn forward(&self, bytes: &[u8]) {
        let frame = std::str::from_utf8(bytes)
            .map_err(|err| err.to_string())
            .and_then(|text| WireFrame::decode(text).map_err(|err| err.to_string()));
        match frame {
            Ok(frame) => self.sink.deliver(TransportEvent::Message {
                event: frame.event,
                payload: frame.data,
            }),
            Err(error) => warn!(%error, "dropping undecodable realtime frame"),
        }
    }
}
