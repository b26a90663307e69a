//! Signaling channel adapter.
//!
//! The room talks to the relay through [`SignalingChannel`], a
//! fire-and-forget outbound pipe, and receives [`ChannelEvent`]s on a
//! single queue. [`WsSignalingChannel`] is the WebSocket implementation
//! over `tokio-tungstenite`, with heartbeats, reconnect backoff and
//! automatic re-join.

mod client;
mod connection;
mod types;

pub use client::WsSignalingChannel;
pub use types::{ChannelEvent, SignalingChannel};
