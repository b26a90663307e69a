//! Full configuration validation.
//!
//! Collects every range and format error into a single `ConfigError`.

mod helpers;

#[cfg(test)]
mod tests;

use crate::schema::MeshConfig;
use meshcall_common::ConfigError;

use helpers::{validate_range, validate_ws_url};

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &MeshConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    // Signaling
    validate_ws_url(&mut errors, "signaling.url", &config.signaling.url);
    validate_range(
        &mut errors,
        "signaling.connect_timeout_secs",
        config.signaling.connect_timeout_secs,
        1,
        120,
    );
    validate_range(
        &mut errors,
        "signaling.reconnect_delay_secs",
        config.signaling.reconnect_delay_secs,
        1,
        60,
    );
    validate_range(
        &mut errors,
        "signaling.max_reconnect_delay_secs",
        config.signaling.max_reconnect_delay_secs,
        config.signaling.reconnect_delay_secs,
        600,
    );
    validate_range(
        &mut errors,
        "signaling.channel_capacity",
        config.signaling.channel_capacity,
        16,
        65536,
    );
    validate_range(
        &mut errors,
        "signaling.heartbeat_interval_secs",
        config.signaling.heartbeat_interval_secs,
        5,
        300,
    );

    // Negotiation
    validate_range(
        &mut errors,
        "negotiation.timeout_secs",
        config.negotiation.timeout_secs,
        1,
        300,
    );

    // Relay
    validate_range(&mut errors, "relay.port", config.relay.port, 1, u16::MAX);
    validate_range(
        &mut errors,
        "relay.hello_timeout_secs",
        config.relay.hello_timeout_secs,
        1,
        120,
    );
    validate_range(&mut errors, "relay.max_room_size", config.relay.max_room_size, 2, 32);
    validate_range(
        &mut errors,
        "relay.room_ttl_secs",
        config.relay.room_ttl_secs,
        10,
        86400,
    );

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}
