//! Realtime event relay.
//!
//! [`RealtimeRelay`] owns a single transport connection and exposes a local
//! publish/subscribe surface over it:
//!
//! - transport connect and disconnect become `connection_status`;
//! - transport connect failures become `connection_error`;
//! - application frames are dispatched by event name.
//!
//! Rooms, typing indicators and presence are plain events sent through
//! [`RealtimeRelay::send`] with reserved names (see [`ControlEvent`]).

mod events;
mod relay;
mod subscriptions;

pub use events::{ControlEvent, LocalEvent, ServerEvent, UnknownEventError, WireFrame};
pub use relay::{ConnectionHandle, RealtimeRelay, RelayError};
pub use subscriptions::{EventCallback, Subscription, SubscriptionTable};
