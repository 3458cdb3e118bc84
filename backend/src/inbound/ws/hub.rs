//! Server-side realtime hub.
//!
//! Tracks live sockets, their member identity and room membership. Sessions
//! register with the hub and drain an outbox of encoded frames; everything
//! else (domain publishers, control events from other sessions) writes into
//! those outboxes. Delivery is best effort: a frame for a socket whose
//! session has already gone is dropped.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, info, warn};

use crate::domain::ports::{EventPublisher, EventPublisherError};
use crate::domain::realtime::{ControlEvent, ServerEvent, WireFrame};
use crate::inbound::ws::messages::{
    PresenceNotice, RoomRequest, StatusNotice, StatusRequest, TypingNotice,
};

/// Hub-assigned socket identifier.
pub type ConnectionId = u64;

struct Member {
    name: String,
    outbox: UnboundedSender<String>,
}

#[derive(Default)]
struct Registry {
    connections: HashMap<ConnectionId, Member>,
    rooms: HashMap<String, HashSet<ConnectionId>>,
}

impl Registry {
    fn deliver<'a>(&self, targets: impl IntoIterator<Item = &'a ConnectionId>, frame: &str) -> usize {
        targets
            .into_iter()
            .filter_map(|id| self.connections.get(id))
            .filter(|member| member.outbox.send(frame.to_owned()).is_ok())
            .count()
    }

    fn everyone_except(&self, skip: Option<ConnectionId>) -> Vec<ConnectionId> {
        self.connections
            .keys()
            .copied()
            .filter(|id| Some(*id) != skip)
            .collect()
    }
}

/// Fan-out point for realtime frames.
#[derive(Default)]
pub struct RealtimeHub {
    registry: Mutex<Registry>,
    next_id: AtomicU64,
}

fn encode(event: &str, data: impl Serialize) -> Result<String, EventPublisherError> {
    let data = serde_json::to_value(data).map_err(|err| EventPublisherError::encode(err.to_string()))?;
    WireFrame::new(event, data)
        .encode()
        .map_err(|err| EventPublisherError::encode(err.to_string()))
}

impl RealtimeHub {
    /// Empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of live sockets.
    pub fn connection_count(&self) -> usize {
        self.registry().connections.len()
    }

    /// Number of sockets in `room`.
    pub fn room_size(&self, room: &str) -> usize {
        self.registry().rooms.get(room).map_or(0, HashSet::len)
    }

    /// Register a socket for `member` and announce it with `user_online`.
    pub fn register(&self, member: &str) -> (ConnectionId, UnboundedReceiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (outbox, inbox) = unbounded_channel();
        let mut registry = self.registry();
        registry.connections.insert(
            id,
            Member {
                name: member.to_owned(),
                outbox,
            },
        );
        info!(connection = id, member, "realtime socket registered");
        match encode(ServerEvent::UserOnline.as_str(), PresenceNotice { member }) {
            Ok(frame) => {
                let others = registry.everyone_except(Some(id));
                registry.deliver(&others, &frame);
            }
            Err(error) => warn!(%error, "failed to encode user_online"),
        }
        (id, inbox)
    }

    /// Drop a socket from every room and announce `user_offline`.
    pub fn unregister(&self, id: ConnectionId) {
        let mut registry = self.registry();
        let Some(member) = registry.connections.remove(&id) else {
            return;
        };
        registry.rooms.retain(|_, members| {
            members.remove(&id);
            !members.is_empty()
        });
        info!(connection = id, member = %member.name, "realtime socket unregistered");
        match encode(
            ServerEvent::UserOffline.as_str(),
            PresenceNotice {
                member: &member.name,
            },
        ) {
            Ok(frame) => {
                let others = registry.everyone_except(None);
                registry.deliver(&others, &frame);
            }
            Err(error) => warn!(%error, "failed to encode user_offline"),
        }
    }

    /// Add a socket to `room`.
    pub fn join(&self, id: ConnectionId, room: &str) {
        let mut registry = self.registry();
        if !registry.connections.contains_key(&id) {
            return;
        }
        registry.rooms.entry(room.to_owned()).or_default().insert(id);
        debug!(connection = id, room, "joined room");
    }

    /// Remove a socket from `room`.
    pub fn leave(&self, id: ConnectionId, room: &str) {
        let mut registry = self.registry();
        if let Some(members) = registry.rooms.get_mut(room) {
            members.remove(&id);
            if members.is_empty() {
                registry.rooms.remove(room);
            }
        }
        debug!(connection = id, room, "left room");
    }

    fn forward_typing(&self, id: ConnectionId, room: &str, event: ControlEvent) {
        let registry = self.registry();
        let Some(sender) = registry.connections.get(&id) else {
            return;
        };
        let frame = match encode(
            event.as_str(),
            TypingNotice {
                room,
                member: &sender.name,
            },
        ) {
            Ok(frame) => frame,
            Err(error) => {
                warn!(%error, "failed to encode typing notice");
                return;
            }
        };
        if let Some(members) = registry.rooms.get(room) {
            let others = members.iter().filter(|member| **member != id);
            registry.deliver(others, &frame);
        }
    }

    fn broadcast_status(&self, id: ConnectionId, status: &str) {
        let registry = self.registry();
        let Some(sender) = registry.connections.get(&id) else {
            return;
        };
        match encode(
            ControlEvent::StatusUpdate.as_str(),
            StatusNotice {
                member: &sender.name,
                status,
            },
        ) {
            Ok(frame) => {
                let everyone = registry.everyone_except(None);
                registry.deliver(&everyone, &frame);
            }
            Err(error) => warn!(%error, "failed to encode status notice"),
        }
    }

    /// Apply a frame received from socket `id`.
    ///
    /// Control events update membership or are relayed; anything else is
    /// ignored.
    pub fn handle_frame(&self, id: ConnectionId, frame: WireFrame) {
        let Ok(event) = frame.event.parse::<ControlEvent>() else {
            debug!(connection = id, event = %frame.event, "ignoring client event");
            return;
        };
        match event {
            ControlEvent::StatusUpdate => match serde_json::from_value::<StatusRequest>(frame.data) {
                Ok(request) => self.broadcast_status(id, &request.status),
                Err(error) => debug!(connection = id, %error, "malformed status_update"),
            },
            room_event => match serde_json::from_value::<RoomRequest>(frame.data) {
                Ok(RoomRequest { room }) => match room_event {
                    ControlEvent::JoinRoom => self.join(id, &room),
                    ControlEvent::LeaveRoom => self.leave(id, &room),
                    _ => self.forward_typing(id, &room, room_event),
                },
                Err(error) => {
                    debug!(connection = id, event = %frame.event, %error, "malformed room event");
                }
            },
        }
    }
}

#[async_trait]
impl EventPublisher for RealtimeHub {
    async fn publish(&self, event: ServerEvent, payload: Value) -> Result<usize, EventPublisherError> {
        let frame = encode(event.as_str(), payload)?;
        let registry = self.registry();
        let everyone = registry.everyone_except(None);
        Ok(registry.deliver(&everyone, &frame))
    }

    async fn publish_to_room(
        &self,
        room: &str,
        event: ServerEvent,
        payload: Value,
    ) -> Result<usize, EventPublisherError> {
        let frame = encode(event.as_str(), payload)?;
        let registry = self.registry();
        Ok(registry
            .rooms
            .get(room)
            .map_or(0, |members| registry.deliver(members, &frame)))
    }
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
