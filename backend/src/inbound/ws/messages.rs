//! Payloads exchanged on the realtime socket.
//!
//! Every frame is a [`WireFrame`](crate::domain::realtime::WireFrame); these
//! types describe its `data` for the control events the hub understands and
//! the notifications it emits.

use serde::{Deserialize, Serialize};

/// `data` of `join_room`, `leave_room`, `typing_start` and `typing_stop`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RoomRequest {
    pub room: String,
}

/// `data` of `status_update` sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

/// Typing indicator forwarded to the other members of a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypingNotice<'a> {
    pub room: &'a str,
    pub member: &'a str,
}

/// Status change broadcast to every connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusNotice<'a> {
    pub member: &'a str,
    pub status: &'a str,
}

/// `user_online` / `user_offline` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresenceNotice<'a> {
    pub member: &'a str,
}
