//! Inbound adapters translating HTTP requests and WebSocket frames into
//! domain calls while keeping framework details at the edge.

pub mod http;
pub mod ws;
