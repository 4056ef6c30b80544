//! Configuration schema types for roomcast.
//!
//! All structs use `serde(default)` so partial configs work correctly.
//! Missing fields are filled with the protocol's standard timings.

mod broker;
mod chat;
mod presence;
mod system;

pub use broker::*;
pub use chat::*;
pub use presence::*;
pub use system::*;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct RoomcastConfig {
    pub broker: BrokerConfig,
    pub presence: PresenceTimings,
    pub chat: ChatConfig,
    pub logging: LoggingConfig,
}
