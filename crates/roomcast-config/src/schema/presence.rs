//! Presence protocol timings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PresenceTimings {
    /// Pause between subscribing and announcing the join.
    pub settle_delay_ms: u64,
    pub heartbeat_interval_secs: u64,
    /// Heartbeat interval while the client is in the background.
    pub background_heartbeat_interval_secs: u64,
    pub sweep_interval_secs: u64,
    /// Peers silent for longer than this are dropped from the roster.
    pub timeout_secs: u64,
    pub response_delay_min_ms: u64,
    pub response_delay_max_ms: u64,
}

impl Default for PresenceTimings {
    fn default() -> Self {
        Self {
            settle_delay_ms: 500,
            heartbeat_interval_secs: 15,
            background_heartbeat_interval_secs: 30,
            sweep_interval_secs: 30,
            timeout_secs: 60,
            response_delay_min_ms: 500,
            response_delay_max_ms: 1500,
        }
    }
}

impl PresenceTimings {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn background_heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.background_heartbeat_interval_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn response_delay_min(&self) -> Duration {
        Duration::from_millis(self.response_delay_min_ms)
    }

    pub fn response_delay_max(&self) -> Duration {
        Duration::from_millis(self.response_delay_max_ms)
    }
}
