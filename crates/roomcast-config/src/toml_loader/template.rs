//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# roomcast configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[broker]
# address = "wss://broker.example.org:8084/mqtt"   # offered when none is saved
# topic_prefix = "room"        # topics are <prefix>/<room>/...
# clean_start = true
# reconnect_delay_ms = 5000    # 100-300000
# keep_alive_secs = 30         # 5-3600
# connect_timeout_ms = 10000   # 500-120000

[presence]
# settle_delay_ms = 500                      # 0-10000
# heartbeat_interval_secs = 15               # 1-3600
# background_heartbeat_interval_secs = 30    # 1-3600
# sweep_interval_secs = 30                   # 1-3600
# timeout_secs = 60            # at least twice either heartbeat interval
# response_delay_min_ms = 500
# response_delay_max_ms = 1500

[chat]
# max_message_chars = 500      # 1-500
# history_limit = 500          # 0-100000

[logging]
# level = "INFO"               # TRACE, DEBUG, INFO, WARNING, ERROR
"##
    .to_string()
}
