//! Lenient TOML loading.
//!
//! These functions report a missing file as `FileNotFound` and only log
//! validation failures, so callers can still inspect a broken file. The
//! crate-level `load_config` and `load_config_from` are the strict
//! entry points that reject an invalid config.

use crate::schema::RoomcastConfig;
use crate::validation;
use roomcast_common::ConfigError;
use std::path::Path;
use tracing::{info, warn};

use super::paths::{create_default_config, default_config_path};

/// Parse `path`, filling missing fields from defaults.
///
/// A missing file is `FileNotFound` rather than a read error, which lets
/// [`load_default`] tell first run apart from an unreadable file.
/// Validation problems are logged and the parsed config is returned.
pub fn load_from_path(path: &Path) -> Result<RoomcastConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ParseError(format!("failed to read {}: {e}", path.display())))?;

    let config: RoomcastConfig = toml::from_str(&content)
        .map_err(|e| ConfigError::ParseError(format!("failed to parse TOML: {e}")))?;

    if let Err(e) = validation::validate(&config) {
        warn!(path = %path.display(), error = %e, "config failed validation");
    }

    info!("loaded config from {}", path.display());
    Ok(config)
}

/// Load `config.toml` from the platform config directory
/// (`~/.config/roomcast/` on Linux), writing the commented template on
/// first run and returning defaults.
pub fn load_default() -> Result<RoomcastConfig, ConfigError> {
    let path = default_config_path()?;

    match load_from_path(&path) {
        Ok(config) => Ok(config),
        Err(ConfigError::FileNotFound(_)) => {
            info!("no config found at {}, creating default", path.display());
            create_default_config(&path)?;
            Ok(RoomcastConfig::default())
        }
        Err(e) => Err(e),
    }
}
