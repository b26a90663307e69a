//! Capture device seam.

use async_trait::async_trait;

use meshcall_common::{DeviceError, MediaError};
use meshcall_config::MediaConfig;

use super::track::MediaStream;

/// Which local tracks to capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl MediaConstraints {
    pub fn audio_only() -> Self {
        Self {
            audio: true,
            video: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.audio && !self.video
    }
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

impl From<&MediaConfig> for MediaConstraints {
    fn from(config: &MediaConfig) -> Self {
        Self {
            audio: config.audio,
            video: config.video,
        }
    }
}

/// Platform capture: camera/microphone and the screen picker.
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Capture microphone and/or camera.
    async fn user_media(&self, constraints: MediaConstraints) -> Result<MediaStream, DeviceError>;

    /// Open the screen picker. Fails with `MediaError::Unsupported` when the
    /// platform has no screen capture and `MediaError::UserCancelled` when
    /// the picker is dismissed.
    async fn display_media(&self) -> Result<MediaStream, MediaError>;
}
