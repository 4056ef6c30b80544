//! Configuration, state and event types for the presence coordinator.

use std::fmt;
use std::time::Duration;

use crate::chat::MAX_MESSAGE_CHARS;
use crate::protocol::{ChatMessage, DEFAULT_TOPIC_PREFIX};
use crate::roster::Participant;
use crate::session::ConnectionStatus;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Timings and transport options for one coordinator.
#[derive(Debug, Clone)]
pub struct PresenceConfig {
    /// First topic segment, shared by every participant of a room.
    pub topic_prefix: String,
    pub clean_start: bool,
    pub reconnect_delay: Duration,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
    /// Pause between subscribing and the first join publish.
    pub settle_delay: Duration,
    pub heartbeat_interval: Duration,
    /// Heartbeat interval while the front end is in the background.
    pub background_heartbeat_interval: Duration,
    pub sweep_interval: Duration,
    /// Peers silent for longer than this are evicted.
    pub timeout: Duration,
    pub response_delay_min: Duration,
    pub response_delay_max: Duration,
    pub max_message_chars: usize,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            topic_prefix: DEFAULT_TOPIC_PREFIX.to_string(),
            clean_start: true,
            reconnect_delay: Duration::from_secs(5),
            keep_alive: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            settle_delay: Duration::from_millis(500),
            heartbeat_interval: Duration::from_secs(15),
            background_heartbeat_interval: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(30),
            timeout: Duration::from_secs(60),
            response_delay_min: Duration::from_millis(500),
            response_delay_max: Duration::from_millis(1500),
            max_message_chars: MAX_MESSAGE_CHARS,
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Protocol state of the local session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolState {
    #[default]
    Idle,
    Subscribing,
    Announcing,
    Joined,
    Leaving,
}

impl fmt::Display for ProtocolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProtocolState::Idle => "idle",
            ProtocolState::Subscribing => "subscribing",
            ProtocolState::Announcing => "announcing",
            ProtocolState::Joined => "joined",
            ProtocolState::Leaving => "leaving",
        };
        f.write_str(label)
    }
}

/// Whether the front end is in the foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Notifications for the rendering side.
#[derive(Debug, Clone, PartialEq)]
pub enum PresenceEvent {
    StatusChanged(ConnectionStatus),
    MessageReceived(ChatMessage),
    PeerJoined {
        identity: String,
    },
    PeerLeft {
        identity: String,
        reason: Option<String>,
    },
    PeerTimedOut {
        identity: String,
    },
    /// Identity-sorted roster after a membership change.
    RosterChanged(Vec<Participant>),
    /// The transport is re-establishing a lost connection.
    Reconnecting,
    Error(String),
}
