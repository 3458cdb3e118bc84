//! Per-connection WebSocket handler.
//!
//! Keeps framing and heartbeats at the edge and hands decoded frames to the
//! [`RealtimeHub`]. The public contract pings every 5s and considers a
//! connection idle after 10s without client traffic. Tests shorten both.

use std::sync::Arc;
use std::time::{Duration, Instant};

use actix_ws::{CloseCode, CloseReason, Closed, Message, MessageStream, ProtocolError, Session};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time;
use tracing::{debug, warn};

use crate::domain::realtime::WireFrame;
use crate::inbound::ws::hub::{ConnectionId, RealtimeHub};

/// Time between heartbeats to the client (5s in production, shorter in tests).
#[cfg(not(test))]
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
#[cfg(test)]
const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(50);

/// Max idle time before disconnecting the client (10s in production, shorter in tests).
#[cfg(not(test))]
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);
#[cfg(test)]
const CLIENT_TIMEOUT: Duration = Duration::from_millis(100);

pub(super) async fn handle_ws_session(
    hub: Arc<RealtimeHub>,
    member: String,
    session: Session,
    stream: MessageStream,
) {
    let (id, outbox) = hub.register(&member);
    WsSession { hub: Arc::clone(&hub), id }
        .run(session, stream, outbox)
        .await;
    hub.unregister(id);
}

enum SessionError {
    ClientClosed(Option<CloseReason>),
    StreamClosed,
    HeartbeatTimeout,
    Protocol(ProtocolError),
    InvalidPayload,
    Network(Closed),
}

enum CloseAction {
    None,
    Close(Option<CloseReason>),
}

struct WsSession {
    hub: Arc<RealtimeHub>,
    id: ConnectionId,
}

impl WsSession {
    async fn run(
        &self,
        mut session: Session,
        mut stream: MessageStream,
        mut outbox: UnboundedReceiver<String>,
    ) {
        let mut last_heartbeat = Instant::now();
        let mut heartbeat = time::interval(HEARTBEAT_INTERVAL);

        loop {
            let result = tokio::select! {
                _ = heartbeat.tick() => {
                    self.handle_heartbeat_tick(&mut session, &last_heartbeat).await
                }
                frame = outbox.recv() => match frame {
                    Some(frame) => session.text(frame).await.map_err(SessionError::Network),
                    None => Err(SessionError::StreamClosed),
                },
                message = stream.recv() => {
                    self.handle_stream_message(&mut session, &mut last_heartbeat, message)
                        .await
                }
            };

            if let Err(error) = result {
                self.log_shutdown_reason(&error);
                let close_action = self.close_action_for(&error);
                self.close_session_if_needed(session, close_action).await;
                return;
            }
        }
    }

    async fn handle_heartbeat_tick(
        &self,
        session: &mut Session,
        last_heartbeat: &Instant,
    ) -> Result<(), SessionError> {
        if Instant::now().duration_since(*last_heartbeat) > CLIENT_TIMEOUT {
            return Err(SessionError::HeartbeatTimeout);
        }

        session.ping(b"").await.map_err(SessionError::Network)
    }

    async fn handle_stream_message(
        &self,
        session: &mut Session,
        last_heartbeat: &mut Instant,
        message: Option<Result<Message, ProtocolError>>,
    ) -> Result<(), SessionError> {
        let Some(message) = message else {
            return Err(SessionError::StreamClosed);
        };

        match message {
            Ok(message) => self.handle_message(session, last_heartbeat, message).await,
            Err(error) => Err(SessionError::Protocol(error)),
        }
    }

    async fn handle_message(
        &self,
        session: &mut Session,
        last_heartbeat: &mut Instant,
        message: Message,
    ) -> Result<(), SessionError> {
        match message {
            Message::Ping(payload) => {
                *last_heartbeat = Instant::now();
                session
                    .pong(&payload)
                    .await
                    .map_err(SessionError::Network)
            }
            Message::Text(text) => {
                *last_heartbeat = Instant::now();
                self.handle_text_message(text.as_ref())
            }
            Message::Pong(_) | Message::Binary(_) | Message::Continuation(_) | Message::Nop => {
                *last_heartbeat = Instant::now();
                Ok(())
            }
            Message::Close(reason) => Err(SessionError::ClientClosed(reason)),
        }
    }

    fn handle_text_message(&self, text: &str) -> Result<(), SessionError> {
        match WireFrame::decode(text) {
            Ok(frame) => {
                self.hub.handle_frame(self.id, frame);
                Ok(())
            }
            Err(error) => {
                warn!(connection = self.id, error = %error, "Rejected malformed WebSocket frame");
                Err(SessionError::InvalidPayload)
            }
        }
    }

    fn log_shutdown_reason(&self, error: &SessionError) {
        match error {
            SessionError::HeartbeatTimeout => {
                warn!(connection = self.id, "WebSocket heartbeat timeout; closing connection");
            }
            SessionError::Protocol(error) => {
                warn!(connection = self.id, error = %error, "WebSocket protocol error");
            }
            SessionError::Network(error) => {
                warn!(connection = self.id, error = %error, "WebSocket send failed; closing connection");
            }
            SessionError::InvalidPayload
            | SessionError::ClientClosed(_)
            | SessionError::StreamClosed => {
                debug!(connection = self.id, "WebSocket session ended");
            }
        }
    }

    fn close_action_for(&self, error: &SessionError) -> CloseAction {
        match error {
            SessionError::HeartbeatTimeout => CloseAction::Close(Some(CloseReason {
                code: CloseCode::Normal,
                description: Some("heartbeat timeout".to_owned()),
            })),
            SessionError::Protocol(_) => CloseAction::Close(Some(CloseReason {
                code: CloseCode::Protocol,
                description: Some("protocol error".to_owned()),
            })),
            SessionError::InvalidPayload => CloseAction::Close(Some(CloseReason {
                code: CloseCode::Policy,
                description: Some("invalid payload".to_owned()),
            })),
            SessionError::ClientClosed(reason) => CloseAction::Close(reason.clone()),
            SessionError::StreamClosed | SessionError::Network(_) => CloseAction::None,
        }
    }

    async fn close_session_if_needed(&self, session: Session, close_action: CloseAction) {
        if let CloseAction::Close(reason) = close_action {
            if let Err(error) = session.close(reason).await {
                warn!(connection = self.id, error = %error, "Failed to close WebSocket session");
            }
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
