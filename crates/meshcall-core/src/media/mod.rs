//! Local capture, screen share, and inbound remote streams.

mod device;
mod manager;
mod remote;
mod track;

pub use device::{CaptureDevice, MediaConstraints};
pub use manager::{MediaEvent, MediaSourceManager, ReplaceReport, VideoSenderTarget};
pub use remote::{RemoteStream, RemoteTrack};
pub use track::{MediaStream, MediaTrack, TrackKind, TrackSource};
