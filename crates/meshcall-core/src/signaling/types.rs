use meshcall_common::{ClientMessage, ServerMessage, SignalingError};

/// Inbound activity on the signaling channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Connected,
    /// The relay connection dropped. Not a peer departure.
    Disconnected,
    Message(ServerMessage),
}

/// Outbound half of the signaling channel.
pub trait SignalingChannel: Send + Sync {
    /// Queue a frame for the relay without waiting.
    fn send(&self, message: ClientMessage) -> Result<(), SignalingError>;
}
