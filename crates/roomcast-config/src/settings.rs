//! Last-used connection settings.
//!
//! Remembered between runs so the front end can prefill the broker
//! address, identity and room. Written after every successful join.

use std::path::{Path, PathBuf};

use roomcast_common::ConfigError;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::toml_loader::config_dir;
use crate::toml_writer::write_toml;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct SavedSettings {
    pub address: String,
    pub identity: String,
    pub room: String,
}

impl SavedSettings {
    pub fn new(address: &str, identity: &str, room: &str) -> Self {
        Self {
            address: address.to_string(),
            identity: identity.to_string(),
            room: room.to_string(),
        }
    }
}

/// `<config dir>/roomcast/last_session.toml`.
pub fn default_settings_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("last_session.toml"))
}

/// Load saved settings from the default path.
pub fn load_settings() -> Result<SavedSettings, ConfigError> {
    load_settings_from(&default_settings_path()?)
}

/// Load saved settings, or the empty default when nothing was saved yet.
pub fn load_settings_from(path: &Path) -> Result<SavedSettings, ConfigError> {
    if !path.exists() {
        debug!(path = %path.display(), "no saved settings");
        return Ok(SavedSettings::default());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ParseError(format!("failed to read {}: {e}", path.display())))?;
    toml::from_str(&content)
        .map_err(|e| ConfigError::ParseError(format!("failed to parse {}: {e}", path.display())))
}

pub fn save_settings(settings: &SavedSettings) -> Result<(), ConfigError> {
    save_settings_to(settings, &default_settings_path()?)
}

pub fn save_settings_to(settings: &SavedSettings, path: &Path) -> Result<(), ConfigError> {
    write_toml(settings, path)
}
