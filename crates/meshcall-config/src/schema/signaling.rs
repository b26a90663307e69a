//! Signaling client configuration.

use serde::{Deserialize, Serialize};

/// How the room client reaches the signaling relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    /// WebSocket URL of the relay (`ws://` or `wss://`).
    pub url: String,
    /// Seconds to wait for the WebSocket handshake.
    pub connect_timeout_secs: u64,
    /// Reconnect base delay in seconds.
    pub reconnect_delay_secs: u64,
    /// Maximum reconnect delay in seconds.
    pub max_reconnect_delay_secs: u64,
    /// Capacity of the inbound and outbound frame queues.
    pub channel_capacity: usize,
    /// Seconds between WebSocket pings while connected.
    pub heartbeat_interval_secs: u64,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080".into(),
            connect_timeout_secs: 15,
            reconnect_delay_secs: 1,
            max_reconnect_delay_secs: 30,
            channel_capacity: 256,
            heartbeat_interval_secs: 25,
        }
    }
}
