pub mod error;
pub mod media;
pub mod membership;
pub mod negotiator;
pub mod peer;
pub mod room;
pub mod signaling;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use error::{AttachmentConflict, NegotiationFailure, SignalingProtocolViolation};
pub use media::{
    CaptureDevice, MediaConstraints, MediaEvent, MediaSourceManager, MediaStream, MediaTrack,
    RemoteStream, RemoteTrack, ReplaceReport, TrackKind, TrackSource, VideoSenderTarget,
};
pub use membership::{Admission, RoomState};
pub use peer::{NegotiationOp, NegotiationRole, PeerRegistry, PeerSession, PeerState, SenderAttachState};
pub use room::{
    RoomConfig, RoomDeps, RoomEvent, RoomHandle, RoomIdentity, RoomObserver, RoomSession,
    RoomSnapshot,
};
pub use signaling::{ChannelEvent, SignalingChannel, WsSignalingChannel};
pub use transport::{
    ConnectionState, PeerConnection, PeerConnector, PeerTransportEvent, SenderId, TransportEvent,
    TransportEvents,
};
