//! Validation for the `[broker]` section.

use crate::schema::RoomcastConfig;

use super::helpers::validate_range;

pub(crate) fn validate_broker(errors: &mut Vec<String>, config: &RoomcastConfig) {
    let broker = &config.broker;

    let prefix = broker.topic_prefix.trim();
    if prefix.is_empty() {
        errors.push("broker.topic_prefix must not be empty".to_string());
    } else if prefix.contains(['+', '#', '/']) {
        errors.push(format!(
            "broker.topic_prefix = {prefix:?} must not contain '+', '#' or '/'"
        ));
    }

    validate_range(
        errors,
        "broker.reconnect_delay_ms",
        broker.reconnect_delay_ms,
        100,
        300_000,
    );
    validate_range(errors, "broker.keep_alive_secs", broker.keep_alive_secs, 5, 3600);
    validate_range(
        errors,
        "broker.connect_timeout_ms",
        broker.connect_timeout_ms,
        500,
        120_000,
    );
}
