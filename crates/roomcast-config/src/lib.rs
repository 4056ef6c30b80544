//! roomcast configuration system.
//!
//! Provides TOML-based configuration with full validation, plus the
//! last-session settings the front end prefills from. All config sections
//! use sensible defaults so partial configs work out of the box.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use roomcast_config::load_config;
//!
//! let config = load_config().expect("failed to load config");
//! println!("heartbeat every {:?}", config.presence.heartbeat_interval());
//! ```

pub mod schema;
pub mod settings;
pub mod toml_loader;
pub mod toml_writer;
pub mod validation;

// Re-export core types for convenience
pub use schema::{
    BrokerConfig, ChatConfig, LogLevel, LoggingConfig, PresenceTimings, RoomcastConfig,
};
pub use settings::{load_settings, load_settings_from, save_settings, save_settings_to, SavedSettings};

use roomcast_common::ConfigError;
use std::path::Path;

/// Load config from the platform default path.
///
/// Loads `config.toml` from the OS config directory, creates a default
/// if none exists, and validates the result.
pub fn load_config() -> Result<RoomcastConfig, ConfigError> {
    let config = toml_loader::load_default()?;
    validation::validate(&config)?;
    Ok(config)
}

/// Load and validate config from an explicit path.
pub fn load_config_from(path: &Path) -> Result<RoomcastConfig, ConfigError> {
    let config = toml_loader::load_from_path(path)?;
    validation::validate(&config)?;
    Ok(config)
}
