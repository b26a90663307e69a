//! Media capture and negotiation settings.

use serde::{Deserialize, Serialize};

/// Default capture constraints used by `start_local_media`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub audio: bool,
    pub video: bool,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

/// Per-peer negotiation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NegotiationConfig {
    /// Upper bound for a single offer/answer step, in seconds.
    pub timeout_secs: u64,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self { timeout_secs: 15 }
    }
}
