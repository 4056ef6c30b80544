//! Pub/sub transport seam.
//!
//! The coordinator only needs connect, subscribe, publish and a stream of
//! connection events. [`MqttConnector`] talks to a real broker;
//! [`MemoryBroker`] routes between clients in the same process.

mod memory;
mod mqtt;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use roomcast_common::TransportError;
use tokio::sync::mpsc;

pub use memory::{MemoryBroker, MemoryConnector, PublishRecord};
pub use mqtt::{BrokerAddress, MqttConnector, Scheme};

/// Delivery guarantee requested for a publish or subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QoS {
    AtMostOnce,
    AtLeastOnce,
}

/// Message the broker publishes on our behalf if the connection drops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastWill {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub identity: String,
    /// Also used as the broker-side client id.
    pub session_token: String,
    pub clean_start: bool,
    pub reconnect_delay: Duration,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
    pub last_will: Option<LastWill>,
}

/// Connection-level events after the initial connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Connection (re)established.
    Connected,
    Message { topic: String, payload: Vec<u8> },
    Error(String),
    /// A reconnect attempt is starting.
    Reconnecting,
    /// Connection lost; the adapter may still reconnect.
    Closed,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Resolves once the broker acknowledged (or refused) the subscription.
    async fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), TransportError>;

    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS)
        -> Result<(), TransportError>;

    /// Graceful disconnect; the last will is not delivered.
    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// An established connection. The event stream ends when the adapter has
/// given up on the connection for good.
pub struct Connection {
    pub transport: Arc<dyn Transport>,
    pub events: mpsc::Receiver<TransportEvent>,
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        address: &str,
        options: ConnectOptions,
    ) -> Result<Connection, TransportError>;
}
