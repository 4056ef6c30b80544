use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of the random suffix appended to session tokens.
const TOKEN_SUFFIX_LEN: usize = 9;

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Opaque token naming one connection instance of an identity in a room.
///
/// Also used as the transport client id, so two tabs (or a reconnect) of the
/// same identity are told apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    /// `chat_<identity>_<room>_<unix millis>_<random base36>`.
    pub fn generate(identity: &str, room: &str) -> Self {
        let millis = chrono::Utc::now().timestamp_millis();
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_SUFFIX_LEN)
            .map(|b| char::from(b).to_ascii_lowercase())
            .collect();
        Self(format!("chat_{identity}_{room}_{millis}_{suffix}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
