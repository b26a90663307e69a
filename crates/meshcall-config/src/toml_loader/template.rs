//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# meshcall configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[signaling]
# url = "ws://127.0.0.1:8080"     # ws:// or wss://
# connect_timeout_secs = 15       # 1-120
# reconnect_delay_secs = 1        # 1-60
# max_reconnect_delay_secs = 30   # >= reconnect_delay_secs, <= 600
# channel_capacity = 256          # 16-65536
# heartbeat_interval_secs = 25    # 5-300

[media]
# audio = true
# video = true

[negotiation]
# timeout_secs = 15               # 1-300, per offer/answer step

[relay]
# bind = "0.0.0.0"
# port = 8080
# hello_timeout_secs = 10         # 1-120
# max_room_size = 8               # 2-32, full mesh
# room_ttl_secs = 300             # 10-86400

[logging]
# level = "info"                  # trace, debug, info, warn, error
# directives = []                 # extra EnvFilter directives
"##
    .to_string()
}
