//! meshcall configuration system.
//!
//! TOML-based configuration shared by the room client and the relay.
//! All sections use sensible defaults so partial configs work out of the box.

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{
    LogLevel, LoggingConfig, MediaConfig, MeshConfig, NegotiationConfig, RelayConfig,
    SignalingConfig,
};

use meshcall_common::ConfigError;
use std::path::Path;

/// Load config from the platform default path, creating it if missing.
///
/// A config that fails validation is replaced by the defaults.
pub fn load_config() -> Result<MeshConfig, ConfigError> {
    toml_loader::load_default()
}

/// Load config from an explicit path override.
pub fn load_config_from(path: &Path) -> Result<MeshConfig, ConfigError> {
    toml_loader::load_from_path(path)
}
