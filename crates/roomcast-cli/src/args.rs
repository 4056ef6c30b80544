//! Command-line arguments and connection target resolution.

use std::path::PathBuf;

use clap::Parser;
use roomcast_config::{LogLevel, RoomcastConfig, SavedSettings};

#[derive(Parser, Debug)]
#[command(name = "roomcast", about = "Serverless chat rooms with peer-tracked presence")]
pub struct Args {
    /// Broker address (mqtt://, mqtts://, ws:// or wss://).
    #[arg(short, long)]
    pub address: Option<String>,

    /// Name shown to other participants.
    #[arg(short, long)]
    pub identity: Option<String>,

    /// Room to join.
    #[arg(short, long)]
    pub room: Option<String>,

    /// Config file (defaults to the platform config directory).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level for stderr output; `RUST_LOG` takes precedence.
    #[arg(long)]
    pub log_level: Option<LogLevel>,

    /// Use an in-process broker instead of the network.
    #[arg(long)]
    pub loopback: bool,
}

/// Connection inputs after merging the command line, saved settings and
/// config. Missing values are asked for interactively.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Target {
    pub address: Option<String>,
    pub identity: Option<String>,
    pub room: Option<String>,
}

/// First non-blank candidate, trimmed.
fn first_of<'a>(candidates: impl IntoIterator<Item = Option<&'a str>>) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

impl Target {
    pub fn resolve(args: &Args, saved: &SavedSettings, config: &RoomcastConfig) -> Self {
        Self {
            address: first_of([
                args.address.as_deref(),
                Some(saved.address.as_str()),
                Some(config.broker.address.as_str()),
            ]),
            identity: first_of([args.identity.as_deref(), Some(saved.identity.as_str())]),
            room: first_of([args.room.as_deref(), Some(saved.room.as_str())]),
        }
    }
}
