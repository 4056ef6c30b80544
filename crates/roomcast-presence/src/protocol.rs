//! Wire types for room traffic.
//!
//! Every room uses six topics under `<prefix>/<room>/`. Presence topics
//! carry [`ProtocolEnvelope`]s, the `messages` topic carries
//! [`ChatMessage`]s. Payloads are JSON objects whose field names match the
//! browser client, so both can share a room.

use chrono::{DateTime, Utc};
use roomcast_common::DecodeError;
use serde::{Deserialize, Serialize};

use crate::transport::QoS;

/// Default first topic segment.
pub const DEFAULT_TOPIC_PREFIX: &str = "room";

/// Reason carried by the last-will leave envelope.
pub const REASON_CONNECTION_LOST: &str = "connection_lost";

// ---------------------------------------------------------------------------
// Topics
// ---------------------------------------------------------------------------

/// One of the six logical channels of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomTopic {
    Messages,
    Join,
    Leave,
    Heartbeat,
    Query,
    Response,
}

impl RoomTopic {
    pub const ALL: [RoomTopic; 6] = [
        RoomTopic::Messages,
        RoomTopic::Join,
        RoomTopic::Leave,
        RoomTopic::Heartbeat,
        RoomTopic::Query,
        RoomTopic::Response,
    ];

    fn suffix(self) -> &'static str {
        match self {
            RoomTopic::Messages => "messages",
            RoomTopic::Join => "users/join",
            RoomTopic::Leave => "users/leave",
            RoomTopic::Heartbeat => "users/heartbeat",
            RoomTopic::Query => "users/query",
            RoomTopic::Response => "users/response",
        }
    }

    /// The presence action a topic carries; `None` for chat traffic.
    pub fn action(self) -> Option<PresenceAction> {
        match self {
            RoomTopic::Messages => None,
            RoomTopic::Join => Some(PresenceAction::Join),
            RoomTopic::Leave => Some(PresenceAction::Leave),
            RoomTopic::Heartbeat => Some(PresenceAction::Heartbeat),
            RoomTopic::Query => Some(PresenceAction::QueryUsers),
            RoomTopic::Response => Some(PresenceAction::UserResponse),
        }
    }

    /// Delivery guarantee used when publishing on this topic.
    pub fn qos(self) -> QoS {
        match self {
            RoomTopic::Heartbeat => QoS::AtMostOnce,
            _ => QoS::AtLeastOnce,
        }
    }
}

impl PresenceAction {
    pub fn topic(self) -> RoomTopic {
        match self {
            PresenceAction::Join => RoomTopic::Join,
            PresenceAction::Leave => RoomTopic::Leave,
            PresenceAction::Heartbeat => RoomTopic::Heartbeat,
            PresenceAction::QueryUsers => RoomTopic::Query,
            PresenceAction::UserResponse => RoomTopic::Response,
        }
    }
}

/// The concrete topic names of one room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomChannelSet {
    base: String,
}

impl RoomChannelSet {
    pub fn new(prefix: &str, room: &str) -> Self {
        Self {
            base: format!("{prefix}/{room}"),
        }
    }

    pub fn topic(&self, kind: RoomTopic) -> String {
        format!("{}/{}", self.base, kind.suffix())
    }

    /// All six topics in subscription order.
    pub fn topics(&self) -> Vec<String> {
        RoomTopic::ALL.iter().map(|kind| self.topic(*kind)).collect()
    }

    /// Map a received topic back to its kind.
    pub fn classify(&self, topic: &str) -> Option<RoomTopic> {
        let suffix = topic.strip_prefix(&self.base)?.strip_prefix('/')?;
        RoomTopic::ALL
            .into_iter()
            .find(|kind| kind.suffix() == suffix)
    }
}

// ---------------------------------------------------------------------------
// Presence envelopes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceAction {
    Join,
    Leave,
    Heartbeat,
    QueryUsers,
    UserResponse,
}

/// A presence protocol event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolEnvelope {
    #[serde(rename = "username")]
    pub sender: String,
    #[serde(rename = "clientId", default)]
    pub session_token: String,
    pub timestamp: DateTime<Utc>,
    pub action: PresenceAction,
    /// Identity whose `query_users` a `user_response` answers.
    #[serde(rename = "targetUser", default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Incoming shape; `action` and `timestamp` are optional because older
/// clients send heartbeats without an action.
#[derive(Deserialize)]
struct RawEnvelope {
    username: String,
    #[serde(rename = "clientId", default)]
    client_id: String,
    timestamp: Option<DateTime<Utc>>,
    action: Option<PresenceAction>,
    #[serde(rename = "targetUser", default)]
    target_user: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

impl ProtocolEnvelope {
    pub fn new(action: PresenceAction, sender: &str, session_token: &str) -> Self {
        Self {
            sender: sender.to_string(),
            session_token: session_token.to_string(),
            timestamp: Utc::now(),
            action,
            target: None,
            reason: None,
        }
    }

    pub fn response_to(sender: &str, session_token: &str, target: &str) -> Self {
        Self {
            target: Some(target.to_string()),
            ..Self::new(PresenceAction::UserResponse, sender, session_token)
        }
    }

    /// Leave envelope registered as the transport's last will.
    pub fn last_will(sender: &str, session_token: &str) -> Self {
        Self {
            reason: Some(REASON_CONNECTION_LOST.to_string()),
            ..Self::new(PresenceAction::Leave, sender, session_token)
        }
    }

    /// Decode a payload received on `topic`. The topic decides the action;
    /// a conflicting `action` field is ignored.
    pub fn decode(topic: RoomTopic, payload: &[u8]) -> Result<Self, DecodeError> {
        let expected = topic
            .action()
            .ok_or_else(|| DecodeError::UnknownTopic(format!("{topic:?}")))?;
        let raw: RawEnvelope = serde_json::from_slice(payload)?;
        let sender = raw.username.trim();
        if sender.is_empty() {
            return Err(DecodeError::MissingSender);
        }
        if let Some(action) = raw.action {
            if action != expected {
                tracing::debug!(?action, ?expected, "envelope action disagrees with topic");
            }
        }
        Ok(Self {
            sender: sender.to_string(),
            session_token: raw.client_id,
            timestamp: raw.timestamp.unwrap_or_else(Utc::now),
            action: expected,
            target: raw.target_user,
            reason: raw.reason,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

// ---------------------------------------------------------------------------
// Chat messages
// ---------------------------------------------------------------------------

/// A chat line as carried on the `messages` topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "username")]
    pub sender: String,
    #[serde(rename = "text")]
    pub body: String,
    pub timestamp: DateTime<Utc>,
    pub id: String,
    #[serde(rename = "clientId", default)]
    pub session_token: String,
}

impl ChatMessage {
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let message: ChatMessage = serde_json::from_slice(payload)?;
        if message.sender.trim().is_empty() {
            return Err(DecodeError::MissingSender);
        }
        Ok(message)
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
