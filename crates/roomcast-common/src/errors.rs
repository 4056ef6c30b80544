use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),

    #[error("config write error: {0}")]
    WriteError(String),
}

/// Failures reported by a pub/sub transport adapter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("unsupported broker address: {0}")]
    UnsupportedAddress(String),

    #[error("subscribe to {topic} failed: {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("transport closed")]
    Closed,
}

/// Failures of a join attempt or of an active room session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("{field} {reason}")]
    Validation {
        field: &'static str,
        reason: &'static str,
    },

    #[error("connect error: {0}")]
    Connect(String),

    #[error("subscription to {topic} failed: {reason}")]
    Subscription { topic: String, reason: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("a room session is already active")]
    AlreadyActive,

    #[error("room session ended before it was joined")]
    Terminated,
}

/// A payload that could not be turned into a protocol envelope or chat message.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload has no sender")]
    MissingSender,

    #[error("topic {0} does not belong to this room")]
    UnknownTopic(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RoomcastError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}
