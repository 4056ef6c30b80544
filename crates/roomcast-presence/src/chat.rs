//! Chat message composition and the in-memory display list.
//!
//! Outgoing messages are never echoed locally: the broker delivers our own
//! publish back and it is displayed through the same path as everyone
//! else's.

use std::collections::VecDeque;

use chrono::Utc;
use roomcast_common::new_id;

use crate::protocol::ChatMessage;

/// Upper bound on a message body, in characters.
pub const MAX_MESSAGE_CHARS: usize = 500;

/// Why a message was not sent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("not joined to a room")]
    NotJoined,

    #[error("message is empty")]
    Empty,

    #[error("message is {chars} characters, the limit is {limit}")]
    TooLong { chars: usize, limit: usize },
}

/// Build an outgoing message from user input.
pub fn compose(
    body: &str,
    sender: &str,
    session_token: &str,
    limit: usize,
) -> Result<ChatMessage, Rejection> {
    let body = body.trim();
    if body.is_empty() {
        return Err(Rejection::Empty);
    }
    let chars = body.chars().count();
    if chars > limit {
        return Err(Rejection::TooLong { chars, limit });
    }
    Ok(ChatMessage {
        sender: sender.to_string(),
        body: body.to_string(),
        timestamp: Utc::now(),
        id: new_id(),
        session_token: session_token.to_string(),
    })
}

/// Configuration for chat history storage.
#[derive(Debug, Clone)]
pub struct ChatHistoryConfig {
    /// Maximum messages to retain.
    pub max_messages: usize,
}

impl Default for ChatHistoryConfig {
    fn default() -> Self {
        Self { max_messages: 500 }
    }
}

/// Bounded list of received messages, oldest first.
pub struct ChatHistory {
    config: ChatHistoryConfig,
    messages: VecDeque<ChatMessage>,
}

impl ChatHistory {
    pub fn new(config: ChatHistoryConfig) -> Self {
        Self {
            config,
            messages: VecDeque::new(),
        }
    }

    /// Append a message, evicting the oldest when full.
    pub fn push(&mut self, msg: ChatMessage) {
        if self.config.max_messages == 0 {
            return;
        }
        if self.messages.len() >= self.config.max_messages {
            self.messages.pop_front();
        }
        self.messages.push_back(msg);
    }

    /// The most recent `limit` messages (oldest first).
    pub fn recent(&self, limit: usize) -> Vec<&ChatMessage> {
        let skip = self.messages.len().saturating_sub(limit);
        self.messages.iter().skip(skip).collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

impl Default for ChatHistory {
    fn default() -> Self {
        Self::new(ChatHistoryConfig::default())
    }
}
