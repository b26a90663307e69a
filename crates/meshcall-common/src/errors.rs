use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Capture device acquisition failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error("permission denied for {0}")]
    PermissionDenied(String),

    #[error("no capture device available for {0}")]
    NotFound(String),

    #[error("capture device busy: {0}")]
    Busy(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("not supported: {0}")]
    Unsupported(String),

    #[error("screen share picker dismissed")]
    UserCancelled,

    #[error("requested constraints select no tracks")]
    EmptyConstraints,

    #[error("local media is not active")]
    NotActive,
}

/// Errors reported by a peer transport implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connection setup failed: {0}")]
    Connect(String),

    #[error("session description rejected: {0}")]
    Description(String),

    #[error("sender operation failed: {0}")]
    Sender(String),

    #[error("ice candidate rejected: {0}")]
    Candidate(String),

    #[error("connection closed")]
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum SignalingError {
    #[error("signaling channel closed")]
    ChannelClosed,

    #[error("signaling channel full, dropped {0}")]
    Backpressure(&'static str),

    #[error("malformed signaling message: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Intents rejected by the room session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("room session closed")]
    Closed,

    #[error("not joined to a room")]
    NotJoined,

    #[error("unknown participant: {0}")]
    UnknownPeer(String),
}

#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Signaling(#[from] SignalingError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Room(#[from] RoomError),

    #[error("{0}")]
    Other(String),
}
