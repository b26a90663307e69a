//! Reference relay server configuration.

use serde::{Deserialize, Serialize};

/// Settings for the `meshcall-relay` binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Address the relay binds to.
    pub bind: String,
    /// Port to listen on.
    pub port: u16,
    /// Seconds a new connection has to send its `join-room` frame.
    pub hello_timeout_secs: u64,
    /// Maximum participants per room. Full mesh cost grows quadratically.
    pub max_room_size: usize,
    /// Seconds an empty room is kept before it is reaped.
    pub room_ttl_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 8080,
            hello_timeout_secs: 10,
            max_room_size: 8,
            room_ttl_secs: 300,
        }
    }
}

impl RelayConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
