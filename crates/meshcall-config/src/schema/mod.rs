//! Configuration schema types for meshcall.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod media;
mod relay;
mod signaling;
mod system;

pub use media::*;
pub use relay::*;
pub use signaling::*;
pub use system::*;

use serde::{Deserialize, Serialize};

/// Root configuration shared by the room client and the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct MeshConfig {
    pub signaling: SignalingConfig,
    pub media: MediaConfig,
    pub negotiation: NegotiationConfig,
    pub relay: RelayConfig,
    pub logging: LoggingConfig,
}

// =============================================================================
// Tests
// =============================================================================
