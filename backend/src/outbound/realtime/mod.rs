//! Client-side realtime transport adapters.

mod awc_transport;

pub use awc_transport::{AwcTransport, DEFAULT_CONNECT_TIMEOUT};
