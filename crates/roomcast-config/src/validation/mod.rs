//! Full configuration validation.
//!
//! Each section has its own submodule; this orchestrator calls them all
//! and collects errors into a single `ConfigError`.

mod broker;
mod helpers;
mod presence;


use crate::schema::RoomcastConfig;
use roomcast_common::ConfigError;

use helpers::validate_range;

/// Protocol ceiling for a chat body; a config may only lower it.
const MAX_MESSAGE_CHARS: u64 = 500;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &RoomcastConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    broker::validate_broker(&mut errors, config);
    presence::validate_presence(&mut errors, config);
    validate_chat(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}

fn validate_chat(errors: &mut Vec<String>, config: &RoomcastConfig) {
    validate_range(
        errors,
        "chat.max_message_chars",
        config.chat.max_message_chars as u64,
        1,
        MAX_MESSAGE_CHARS,
    );
    validate_range(
        errors,
        "chat.history_limit",
        config.chat.history_limit as u64,
        0,
        100_000,
    );
}
