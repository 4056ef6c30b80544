//! Chat limits.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChatConfig {
    /// Longest accepted message body, in characters after trimming.
    pub max_message_chars: usize,
    /// Messages kept for `/history`.
    pub history_limit: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_message_chars: 500,
            history_limit: 500,
        }
    }
}
