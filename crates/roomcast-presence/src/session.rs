//! Connection identity for one room session and its status transitions.

use std::fmt;

use roomcast_common::{SessionError, SessionToken};
use tracing::debug;

use crate::presence::PresenceConfig;
use crate::protocol::{ProtocolEnvelope, RoomChannelSet, RoomTopic};
use crate::transport::{ConnectOptions, LastWill, QoS};

/// Characters that would change topic routing if they appeared in a room name.
const TOPIC_RESERVED: [char; 3] = ['/', '+', '#'];

/// Identity, room and token of one connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    address: String,
    identity: String,
    room: String,
    token: SessionToken,
    channels: RoomChannelSet,
}

impl Session {
    /// Validate the three inputs and mint a fresh session token.
    ///
    /// Inputs are trimmed; an empty value is rejected before anything
    /// touches the transport.
    pub fn open(
        address: &str,
        identity: &str,
        room: &str,
        topic_prefix: &str,
    ) -> Result<Self, SessionError> {
        let address = required("address", address)?;
        let identity = required("identity", identity)?;
        let room = required("room", room)?;
        if room.contains(TOPIC_RESERVED) {
            return Err(SessionError::Validation {
                field: "room",
                reason: "must not contain '/', '+' or '#'",
            });
        }

        let token = SessionToken::generate(identity, room);
        debug!(identity = %identity, room = %room, token = %token, "session opened");
        Ok(Self {
            address: address.to_string(),
            identity: identity.to_string(),
            room: room.to_string(),
            channels: RoomChannelSet::new(topic_prefix, room),
            token,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    pub fn channels(&self) -> &RoomChannelSet {
        &self.channels
    }

    /// Leave announcement the broker publishes if we vanish without one.
    pub fn last_will(&self) -> Result<LastWill, SessionError> {
        let payload = ProtocolEnvelope::last_will(&self.identity, self.token.as_str())
            .encode()
            .map_err(|e| SessionError::Connect(format!("failed to encode last will: {e}")))?;
        Ok(LastWill {
            topic: self.channels.topic(RoomTopic::Leave),
            payload,
            qos: QoS::AtLeastOnce,
            retain: false,
        })
    }

    pub fn connect_options(&self, config: &PresenceConfig) -> Result<ConnectOptions, SessionError> {
        Ok(ConnectOptions {
            identity: self.identity.clone(),
            session_token: self.token.as_str().to_string(),
            clean_start: config.clean_start,
            reconnect_delay: config.reconnect_delay,
            keep_alive: config.keep_alive,
            connect_timeout: config.connect_timeout,
            last_will: Some(self.last_will()?),
        })
    }
}

fn required<'a>(field: &'static str, value: &'a str) -> Result<&'a str, SessionError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(SessionError::Validation {
            field,
            reason: "must not be empty",
        });
    }
    Ok(value)
}

// ---------------------------------------------------------------------------
// Connection status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
        };
        f.write_str(label)
    }
}

/// Remembers the last reported status so only real transitions are emitted.
#[derive(Debug, Default)]
pub struct StatusTracker {
    current: ConnectionStatus,
}

impl StatusTracker {
    pub fn new(current: ConnectionStatus) -> Self {
        Self { current }
    }

    pub fn current(&self) -> ConnectionStatus {
        self.current
    }

    /// Returns the new status if it differs from the current one.
    pub fn transition(&mut self, next: ConnectionStatus) -> Option<ConnectionStatus> {
        if self.current == next {
            return None;
        }
        debug!(from = %self.current, to = %next, "connection status");
        self.current = next;
        Some(next)
    }
}
