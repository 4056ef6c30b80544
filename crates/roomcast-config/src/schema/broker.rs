//! Broker connection settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where and how to connect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BrokerConfig {
    /// Offered when neither the command line nor saved settings name one.
    pub address: String,
    /// First topic segment: topics are `<prefix>/<room>/...`.
    pub topic_prefix: String,
    pub clean_start: bool,
    pub reconnect_delay_ms: u64,
    pub keep_alive_secs: u64,
    pub connect_timeout_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            topic_prefix: "room".to_string(),
            clean_start: true,
            reconnect_delay_ms: 5000,
            keep_alive_secs: 30,
            connect_timeout_ms: 10_000,
        }
    }
}

impl BrokerConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
