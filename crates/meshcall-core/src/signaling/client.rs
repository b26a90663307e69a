//! Public handle for the WebSocket signaling connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

use meshcall_common::{ClientMessage, SignalingError};
use meshcall_config::SignalingConfig;

use super::connection::connection_loop;
use super::types::{ChannelEvent, SignalingChannel};

/// WebSocket connection to the signaling relay.
///
/// Frames are handed to a background task; `send` never blocks. Dropping
/// the channel shuts the connection down.
pub struct WsSignalingChannel {
    command_tx: mpsc::Sender<ClientMessage>,
    connected: Arc<AtomicBool>,
}

impl WsSignalingChannel {
    /// Start the background connection.
    /// Returns `(channel, event_receiver)`.
    pub fn connect(config: SignalingConfig) -> (Self, mpsc::Receiver<ChannelEvent>) {
        let (event_tx, event_rx) = mpsc::channel(config.channel_capacity);
        let (command_tx, command_rx) = mpsc::channel(config.channel_capacity);
        let connected = Arc::new(AtomicBool::new(false));

        let channel = Self {
            command_tx,
            connected: Arc::clone(&connected),
        };

        tokio::spawn(connection_loop(config, connected, event_tx, command_rx));

        (channel, event_rx)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

impl SignalingChannel for WsSignalingChannel {
    fn send(&self, message: ClientMessage) -> Result<(), SignalingError> {
        self.command_tx.try_send(message).map_err(|e| match e {
            TrySendError::Full(msg) => {
                warn!(kind = msg.kind(), "Signaling queue full");
                SignalingError::Backpressure(msg.kind())
            }
            TrySendError::Closed(_) => SignalingError::ChannelClosed,
        })
    }
}
