//! In-process broker with exact-match topic routing.
//!
//! Publishers receive their own messages back, like an MQTT broker does.
//! Every publish is recorded so callers can inspect what went over the wire.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use roomcast_common::TransportError;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{ConnectOptions, Connection, Connector, LastWill, QoS, Transport, TransportEvent};

const CLIENT_QUEUE: usize = 256;

/// One message that went through the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRecord {
    /// Publishing client, or `None` for last wills and injected traffic.
    pub client_id: Option<String>,
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
}

struct ClientEntry {
    subscriptions: HashSet<String>,
    events: mpsc::Sender<TransportEvent>,
    will: Option<LastWill>,
}

struct BrokerState {
    reachable: bool,
    clients: HashMap<String, ClientEntry>,
    refused_topics: HashSet<String>,
    log: Vec<PublishRecord>,
}

impl BrokerState {
    fn route(&mut self, record: PublishRecord) {
        for (id, client) in &self.clients {
            if !client.subscriptions.contains(&record.topic) {
                continue;
            }
            let event = TransportEvent::Message {
                topic: record.topic.clone(),
                payload: record.payload.clone(),
            };
            if client.events.try_send(event).is_err() {
                warn!(client = %id, topic = %record.topic, "memory broker dropped a message");
            }
        }
        self.log.push(record);
    }
}

/// Shared handle to an in-process broker.
#[derive(Clone)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BrokerState {
                reachable: true,
                clients: HashMap::new(),
                refused_topics: HashSet::new(),
                log: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector {
            broker: self.clone(),
        }
    }

    /// Reject later connection attempts while `false`.
    pub fn set_reachable(&self, reachable: bool) {
        self.lock().reachable = reachable;
    }

    /// Make subscriptions to `topic` fail.
    pub fn refuse_subscription(&self, topic: &str) {
        self.lock().refused_topics.insert(topic.to_string());
    }

    pub fn publishes(&self) -> Vec<PublishRecord> {
        self.lock().log.clone()
    }

    pub fn publishes_on(&self, topic: &str) -> Vec<PublishRecord> {
        self.lock()
            .log
            .iter()
            .filter(|r| r.topic == topic)
            .cloned()
            .collect()
    }

    pub fn connected_clients(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().clients.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn subscriptions_of(&self, client_id: &str) -> Vec<String> {
        let mut topics: Vec<String> = self
            .lock()
            .clients
            .get(client_id)
            .map(|c| c.subscriptions.iter().cloned().collect())
            .unwrap_or_default();
        topics.sort();
        topics
    }

    /// Publish from outside any client.
    pub fn inject(&self, topic: &str, payload: Vec<u8>) {
        self.lock().route(PublishRecord {
            client_id: None,
            topic: topic.to_string(),
            payload,
            qos: QoS::AtMostOnce,
        });
    }

    /// Cut a client off without a graceful disconnect: its last will is
    /// published and its event stream reports `Closed` then ends.
    pub fn drop_client(&self, client_id: &str) -> bool {
        let mut state = self.lock();
        let Some(client) = state.clients.remove(client_id) else {
            return false;
        };
        if let Some(will) = client.will {
            debug!(client = %client_id, topic = %will.topic, "publishing last will");
            state.route(PublishRecord {
                client_id: None,
                topic: will.topic,
                payload: will.payload,
                qos: will.qos,
            });
        }
        let _ = client.events.try_send(TransportEvent::Closed);
        true
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

pub struct MemoryConnector {
    broker: MemoryBroker,
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(
        &self,
        address: &str,
        options: ConnectOptions,
    ) -> Result<Connection, TransportError> {
        let mut state = self.broker.lock();
        if !state.reachable {
            return Err(TransportError::Connect(format!("{address} is unreachable")));
        }

        let (events_tx, events_rx) = mpsc::channel(CLIENT_QUEUE);
        let previous = state.clients.insert(
            options.session_token.clone(),
            ClientEntry {
                subscriptions: HashSet::new(),
                events: events_tx,
                will: options.last_will,
            },
        );
        if let Some(previous) = previous {
            // Session takeover, as a broker does for a duplicate client id.
            let _ = previous.events.try_send(TransportEvent::Closed);
        }
        debug!(client = %options.session_token, "memory client connected");

        Ok(Connection {
            transport: Arc::new(MemoryTransport {
                client_id: options.session_token,
                broker: self.broker.clone(),
            }),
            events: events_rx,
        })
    }
}

struct MemoryTransport {
    client_id: String,
    broker: MemoryBroker,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn subscribe(&self, topic: &str, _qos: QoS) -> Result<(), TransportError> {
        let mut state = self.broker.lock();
        if state.refused_topics.contains(topic) {
            return Err(TransportError::Subscribe {
                topic: topic.to_string(),
                reason: "refused by broker".to_string(),
            });
        }
        let client = state
            .clients
            .get_mut(&self.client_id)
            .ok_or(TransportError::Closed)?;
        client.subscriptions.insert(topic.to_string());
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
    ) -> Result<(), TransportError> {
        let mut state = self.broker.lock();
        if !state.clients.contains_key(&self.client_id) {
            return Err(TransportError::Closed);
        }
        state.route(PublishRecord {
            client_id: Some(self.client_id.clone()),
            topic: topic.to_string(),
            payload,
            qos,
        });
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.broker.lock().clients.remove(&self.client_id);
        Ok(())
    }
}
