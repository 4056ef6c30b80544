//! roomcast: terminal chat client for broker-backed rooms.
//!
//! Joins a room on an MQTT broker, shows who is online and relays chat
//! lines. Presence is tracked entirely by the clients; the broker only
//! routes messages.

mod app;
mod args;
mod commands;
mod render;

use std::process::ExitCode;

use clap::Parser;
use roomcast_config::RoomcastConfig;

use crate::args::Args;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("roomcast: {e}");
            return ExitCode::FAILURE;
        }
    };

    let level = args
        .log_level
        .unwrap_or(config.logging.level)
        .as_directive();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{level},rumqttc=warn").into()),
        )
        .init();

    match app::run(args, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "roomcast failed");
            eprintln!("roomcast: {e}");
            ExitCode::FAILURE
        }
    }
}

/// An explicit `--config` must load; the default location falls back to
/// built-in defaults unless the file exists and is invalid.
fn load_config(args: &Args) -> Result<RoomcastConfig, roomcast_common::ConfigError> {
    if let Some(path) = &args.config {
        return roomcast_config::load_config_from(path);
    }
    match roomcast_config::load_config() {
        Ok(config) => Ok(config),
        Err(e @ roomcast_common::ConfigError::ValidationError(_)) => Err(e),
        Err(e) => {
            eprintln!("roomcast: using default configuration ({e})");
            Ok(RoomcastConfig::default())
        }
    }
}
