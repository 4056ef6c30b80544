//! Validation for the `[presence]` section.
//!
//! Besides plain ranges, the timeout has to leave room for at least one
//! missed heartbeat at either rate, otherwise healthy peers get evicted.

use crate::schema::RoomcastConfig;

use super::helpers::validate_range;

pub(crate) fn validate_presence(errors: &mut Vec<String>, config: &RoomcastConfig) {
    let p = &config.presence;

    validate_range(errors, "presence.settle_delay_ms", p.settle_delay_ms, 0, 10_000);
    validate_range(
        errors,
        "presence.heartbeat_interval_secs",
        p.heartbeat_interval_secs,
        1,
        3600,
    );
    validate_range(
        errors,
        "presence.background_heartbeat_interval_secs",
        p.background_heartbeat_interval_secs,
        1,
        3600,
    );
    validate_range(errors, "presence.sweep_interval_secs", p.sweep_interval_secs, 1, 3600);
    validate_range(errors, "presence.timeout_secs", p.timeout_secs, 2, 86_400);
    validate_range(
        errors,
        "presence.response_delay_min_ms",
        p.response_delay_min_ms,
        0,
        60_000,
    );
    validate_range(
        errors,
        "presence.response_delay_max_ms",
        p.response_delay_max_ms,
        0,
        60_000,
    );

    if p.timeout_secs < p.heartbeat_interval_secs.saturating_mul(2) {
        errors.push(format!(
            "presence.timeout_secs = {} must be at least twice heartbeat_interval_secs ({})",
            p.timeout_secs, p.heartbeat_interval_secs
        ));
    }
    if p.timeout_secs < p.background_heartbeat_interval_secs.saturating_mul(2) {
        errors.push(format!(
            "presence.timeout_secs = {} must be at least twice background_heartbeat_interval_secs ({})",
            p.timeout_secs, p.background_heartbeat_interval_secs
        ));
    }
    if p.response_delay_min_ms > p.response_delay_max_ms {
        errors.push(format!(
            "presence.response_delay_min_ms = {} exceeds response_delay_max_ms = {}",
            p.response_delay_min_ms, p.response_delay_max_ms
        ));
    }
}
