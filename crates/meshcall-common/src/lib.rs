pub mod errors;
pub mod id;
pub mod protocol;

pub use errors::{
    ConfigError, DeviceError, MediaError, MeshError, RoomError, SignalingError, TransportError,
};
pub use id::{new_id, ParticipantId, RoomId};
pub use protocol::{ClientMessage, IceCandidate, Participant, SdpKind, ServerMessage, SessionDescription};

pub type Result<T> = std::result::Result<T, MeshError>;
