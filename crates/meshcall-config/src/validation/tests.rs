//! Tests for the full validation pipeline.

use super::*;

#[test]
fn default_config_validates() {
    let config = MeshConfig::default();
    assert!(validate(&config).is_ok());
}

#[test]
fn catches_http_signaling_url() {
    let mut config = MeshConfig::default();
    config.signaling.url = "http://relay.example".into();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("signaling.url"));
}

#[test]
fn accepts_secure_signaling_url() {
    let mut config = MeshConfig::default();
    config.signaling.url = "wss://relay.example/ws".into();
    assert!(validate(&config).is_ok());
}

#[test]
fn catches_zero_negotiation_timeout() {
    let mut config = MeshConfig::default();
    config.negotiation.timeout_secs = 0;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("negotiation.timeout_secs"));
}

#[test]
fn catches_max_delay_below_base_delay() {
    let mut config = MeshConfig::default();
    config.signaling.reconnect_delay_secs = 10;
    config.signaling.max_reconnect_delay_secs = 5;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("signaling.max_reconnect_delay_secs"));
}

#[test]
fn catches_zero_heartbeat() {
    let mut config = MeshConfig::default();
    config.signaling.heartbeat_interval_secs = 0;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("signaling.heartbeat_interval_secs"));
}

#[test]
fn catches_single_seat_room() {
    let mut config = MeshConfig::default();
    config.relay.max_room_size = 1;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("relay.max_room_size"));
}

#[test]
fn catches_port_zero() {
    let mut config = MeshConfig::default();
    config.relay.port = 0;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("relay.port"));
}

#[test]
fn collects_multiple_errors() {
    let mut config = MeshConfig::default();
    config.negotiation.timeout_secs = 0;
    config.relay.hello_timeout_secs = 0;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("negotiation.timeout_secs"));
    assert!(err.contains("relay.hello_timeout_secs"));
    assert!(err.contains("; "));
}
