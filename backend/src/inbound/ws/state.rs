//! Shared WebSocket adapter state.

use std::sync::Arc;

use crate::inbound::ws::hub::RealtimeHub;

/// Dependency bundle for the WebSocket entry point.
#[derive(Clone)]
pub struct WsState {
    pub hub: Arc<RealtimeHub>,
}

impl WsState {
    /// Wrap the hub sessions register with.
    pub fn new(hub: Arc<RealtimeHub>) -> Self {
        Self { hub }
    }
}
