//! WebSocket transport for the push feed
//!
//! Single-shot client: one connect, one streaming session. The client
//! never reconnects on its own; when the session drops it emits
//! `WsMessage::Disconnected` and ends, leaving retry policy to the owner.

mod client;
mod types;

pub use client::{WsClient, WsSession};
pub use types::{WsConfig, WsError, WsMessage};
