//! Realtime event catalogue and wire envelope.
//!
//! Every frame on the realtime socket, in either direction, is a JSON text
//! message `{"event": <name>, "data": <payload>}`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Application events pushed by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerEvent {
    /// Generic user notification.
    Notification,
    /// A group member's profile changed.
    MemberUpdated,
    /// A loan changed state.
    LoanUpdated,
    /// A ledger transaction was recorded.
    TransactionCreated,
    /// A savings balance changed.
    SavingsUpdated,
    /// An upcoming group meeting.
    MeetingReminder,
    /// A member connected.
    UserOnline,
    /// A member disconnected.
    UserOffline,
    /// Operator broadcast.
    SystemAlert,
}

impl ServerEvent {
    /// Every server event, in catalogue order.
    pub const ALL: [Self; 9] = [
        Self::Notification,
        Self::MemberUpdated,
        Self::LoanUpdated,
        Self::TransactionCreated,
        Self::SavingsUpdated,
        Self::MeetingReminder,
        Self::UserOnline,
        Self::UserOffline,
        Self::SystemAlert,
    ];

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Notification => "notification",
            Self::MemberUpdated => "member_updated",
            Self::LoanUpdated => "loan_updated",
            Self::TransactionCreated => "transaction_created",
            Self::SavingsUpdated => "savings_updated",
            Self::MeetingReminder => "meeting_reminder",
            Self::UserOnline => "user_online",
            Self::UserOffline => "user_offline",
            Self::SystemAlert => "system_alert",
        }
    }
}

/// Reserved events a client sends to steer its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlEvent {
    /// Join a room: `{"room": ...}`.
    JoinRoom,
    /// Leave a room: `{"room": ...}`.
    LeaveRoom,
    /// Started typing in a room: `{"room": ...}`.
    TypingStart,
    /// Stopped typing in a room: `{"room": ...}`.
    TypingStop,
    /// Presence change: `{"status": ...}`.
    StatusUpdate,
}

impl ControlEvent {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::JoinRoom => "join_room",
            Self::LeaveRoom => "leave_room",
            Self::TypingStart => "typing_start",
            Self::TypingStop => "typing_stop",
            Self::StatusUpdate => "status_update",
        }
    }
}

/// Events the relay synthesises locally from transport activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocalEvent {
    /// `{"connected": bool}`, plus `"reason"` on disconnect.
    ConnectionStatus,
    /// `{"message": ...}` when the transport fails to connect.
    ConnectionError,
}

impl LocalEvent {
    /// Name subscribers register for.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionStatus => "connection_status",
            Self::ConnectionError => "connection_error",
        }
    }
}

/// Error for unknown event names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventError(pub String);

impl fmt::Display for UnknownEventError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown realtime event: {}", self.0)
    }
}

impl std::error::Error for UnknownEventError {}

impl FromStr for ServerEvent {
    type Err = UnknownEventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| UnknownEventError(s.to_owned()))
    }
}

impl FromStr for ControlEvent {
    type Err = UnknownEventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "join_room" => Ok(Self::JoinRoom),
            "leave_room" => Ok(Self::LeaveRoom),
            "typing_start" => Ok(Self::TypingStart),
            "typing_stop" => Ok(Self::TypingStop),
            "status_update" => Ok(Self::StatusUpdate),
            other => Err(UnknownEventError(other.to_owned())),
        }
    }
}

impl fmt::Display for ServerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ControlEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON envelope of a realtime frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFrame {
    /// Event name.
    pub event: String,
    /// Event payload; `null` when absent.
    #[serde(default)]
    pub data: Value,
}

impl WireFrame {
    /// Build a frame.
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Encode as a text frame body.
    ///
    /// # Errors
    ///
    /// Propagates `serde_json` failures (non-string map keys in `data`).
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode a text frame body.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error for malformed frames.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
