//! MQTT adapter on top of `rumqttc`.
//!
//! A background task drives the event loop, forwards publishes and
//! connection changes, and keeps reconnecting after a loss. Subscriptions
//! are matched to their SUBACK by packet id, so a refused topic surfaces
//! as an error from [`Transport::subscribe`].

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use roomcast_common::TransportError;
use rumqttc::{
    AsyncClient, Event, EventLoop, LastWill as MqttLastWill, MqttOptions, Outgoing, Packet,
    QoS as MqttQoS, SubscribeReasonCode, Transport as Wire,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use url::Url;

use super::{ConnectOptions, Connection, Connector, QoS, Transport, TransportEvent};

/// Bound on queued client requests.
const REQUEST_CAPACITY: usize = 64;
const EVENT_CAPACITY: usize = 256;
/// How long the event loop keeps flushing after a requested disconnect.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

impl From<QoS> for MqttQoS {
    fn from(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => MqttQoS::AtMostOnce,
            QoS::AtLeastOnce => MqttQoS::AtLeastOnce,
        }
    }
}

// ---------------------------------------------------------------------------
// Broker address
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Tcp,
    Tls,
    Ws,
    Wss,
}

impl Scheme {
    fn default_port(self) -> u16 {
        match self {
            Scheme::Tcp => 1883,
            Scheme::Tls => 8883,
            Scheme::Ws => 80,
            Scheme::Wss => 443,
        }
    }
}

/// A parsed `mqtt://`, `mqtts://`, `ws://` or `wss://` broker address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl BrokerAddress {
    pub fn parse(address: &str) -> Result<Self, TransportError> {
        let url = Url::parse(address.trim())
            .map_err(|e| TransportError::UnsupportedAddress(format!("{address}: {e}")))?;
        let scheme = match url.scheme() {
            "mqtt" | "tcp" => Scheme::Tcp,
            "mqtts" | "ssl" | "tls" => Scheme::Tls,
            "ws" => Scheme::Ws,
            "wss" => Scheme::Wss,
            other => {
                return Err(TransportError::UnsupportedAddress(format!(
                    "{address}: unknown scheme {other}"
                )))
            }
        };
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| TransportError::UnsupportedAddress(format!("{address}: missing host")))?
            .to_string();
        let port = url.port().unwrap_or_else(|| scheme.default_port());
        Ok(Self {
            scheme,
            host,
            port,
            path: url.path().to_string(),
        })
    }

    fn websocket_url(&self) -> String {
        let scheme = if self.scheme == Scheme::Wss { "wss" } else { "ws" };
        format!("{scheme}://{}:{}{}", self.host, self.port, self.path)
    }

    fn mqtt_options(&self, client_id: &str) -> MqttOptions {
        match self.scheme {
            Scheme::Tcp => MqttOptions::new(client_id, self.host.clone(), self.port),
            Scheme::Tls => {
                let mut options = MqttOptions::new(client_id, self.host.clone(), self.port);
                options.set_transport(Wire::tls_with_default_config());
                options
            }
            Scheme::Ws => {
                let mut options = MqttOptions::new(client_id, self.websocket_url(), self.port);
                options.set_transport(Wire::Ws);
                options
            }
            Scheme::Wss => {
                let mut options = MqttOptions::new(client_id, self.websocket_url(), self.port);
                options.set_transport(Wire::wss_with_default_config());
                options
            }
        }
    }
}

// ---------------------------------------------------------------------------
// SUBACK correlation
// ---------------------------------------------------------------------------

type AckSender = oneshot::Sender<Result<(), String>>;

/// Subscribe requests are queued in send order; the event loop reports the
/// packet id of each outgoing SUBSCRIBE in that same order.
#[derive(Default)]
struct SubAcks {
    queued: VecDeque<AckSender>,
    in_flight: HashMap<u16, AckSender>,
}

impl SubAcks {
    fn sent(&mut self, pkid: u16) {
        if let Some(tx) = self.queued.pop_front() {
            self.in_flight.insert(pkid, tx);
        }
    }

    fn acked(&mut self, pkid: u16, codes: &[SubscribeReasonCode]) {
        let Some(tx) = self.in_flight.remove(&pkid) else {
            return;
        };
        let result = if codes
            .iter()
            .all(|code| matches!(code, SubscribeReasonCode::Success(_)))
        {
            Ok(())
        } else {
            Err("refused by broker".to_string())
        };
        let _ = tx.send(result);
    }

    fn fail_all(&mut self, reason: &str) {
        for tx in self.queued.drain(..) {
            let _ = tx.send(Err(reason.to_string()));
        }
        for (_, tx) in self.in_flight.drain() {
            let _ = tx.send(Err(reason.to_string()));
        }
    }
}

fn lock(acks: &Mutex<SubAcks>) -> MutexGuard<'_, SubAcks> {
    acks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

pub struct MqttConnector;

#[async_trait]
impl Connector for MqttConnector {
    async fn connect(
        &self,
        address: &str,
        options: ConnectOptions,
    ) -> Result<Connection, TransportError> {
        let broker = BrokerAddress::parse(address)?;
        let mut mqtt = broker.mqtt_options(&options.session_token);
        mqtt.set_keep_alive(options.keep_alive)
            .set_clean_session(options.clean_start)
            .set_credentials(options.identity.clone(), "");
        if let Some(will) = &options.last_will {
            mqtt.set_last_will(MqttLastWill::new(
                will.topic.clone(),
                will.payload.clone(),
                will.qos.into(),
                will.retain,
            ));
        }

        let (client, mut eventloop) = AsyncClient::new(mqtt, REQUEST_CAPACITY);
        info!(host = %broker.host, port = broker.port, "Connecting to MQTT broker");

        match tokio::time::timeout(options.connect_timeout, wait_for_connack(&mut eventloop)).await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_elapsed) => {
                return Err(TransportError::Connect(format!(
                    "timed out after {}ms",
                    options.connect_timeout.as_millis()
                )))
            }
        }
        info!(client_id = %options.session_token, "MQTT connection established");

        let (event_tx, event_rx) = mpsc::channel(EVENT_CAPACITY);
        let acks = Arc::new(Mutex::new(SubAcks::default()));
        let closing = Arc::new(AtomicBool::new(false));

        tokio::spawn(drive_event_loop(
            eventloop,
            event_tx,
            Arc::clone(&acks),
            Arc::clone(&closing),
            options.reconnect_delay,
        ));

        Ok(Connection {
            transport: Arc::new(MqttTransport {
                client,
                acks,
                subscribe_order: tokio::sync::Mutex::new(()),
                closing,
                ack_timeout: options.connect_timeout,
            }),
            events: event_rx,
        })
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<(), TransportError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
            Ok(_) => {}
            Err(e) => return Err(TransportError::Connect(e.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

async fn drive_event_loop(
    mut eventloop: EventLoop,
    events: mpsc::Sender<TransportEvent>,
    acks: Arc<Mutex<SubAcks>>,
    closing: Arc<AtomicBool>,
    reconnect_delay: Duration,
) {
    loop {
        let polled = if closing.load(Ordering::Acquire) {
            match tokio::time::timeout(CLOSE_GRACE, eventloop.poll()).await {
                Ok(polled) => polled,
                Err(_elapsed) => break,
            }
        } else {
            eventloop.poll().await
        };

        let forward = match polled {
            Ok(Event::Incoming(Packet::Publish(publish))) => Some(TransportEvent::Message {
                topic: publish.topic,
                payload: publish.payload.to_vec(),
            }),
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("MQTT connection re-established");
                Some(TransportEvent::Connected)
            }
            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                lock(&acks).acked(ack.pkid, &ack.return_codes);
                None
            }
            Ok(Event::Outgoing(Outgoing::Subscribe(pkid))) => {
                lock(&acks).sent(pkid);
                None
            }
            Ok(_) => None,
            Err(e) => {
                lock(&acks).fail_all("connection lost");
                if closing.load(Ordering::Acquire) {
                    break;
                }
                warn!(error = %e, "MQTT connection lost");
                if events.send(TransportEvent::Closed).await.is_err() {
                    break;
                }
                tokio::time::sleep(reconnect_delay).await;
                if closing.load(Ordering::Acquire) {
                    break;
                }
                Some(TransportEvent::Reconnecting)
            }
        };

        if let Some(event) = forward {
            if events.send(event).await.is_err() {
                break;
            }
        }
    }
    debug!("MQTT event loop stopped");
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

struct MqttTransport {
    client: AsyncClient,
    acks: Arc<Mutex<SubAcks>>,
    /// Keeps the ack queue in the same order as the requests.
    subscribe_order: tokio::sync::Mutex<()>,
    closing: Arc<AtomicBool>,
    ack_timeout: Duration,
}

#[async_trait]
impl Transport for MqttTransport {
    async fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), TransportError> {
        let (tx, rx) = oneshot::channel();
        {
            let _order = self.subscribe_order.lock().await;
            lock(&self.acks).queued.push_back(tx);
            if let Err(e) = self.client.subscribe(topic, qos.into()).await {
                lock(&self.acks).queued.pop_back();
                return Err(TransportError::Subscribe {
                    topic: topic.to_string(),
                    reason: e.to_string(),
                });
            }
        }

        match tokio::time::timeout(self.ack_timeout, rx).await {
            Ok(Ok(Ok(()))) => {
                debug!(topic = %topic, "subscribed");
                Ok(())
            }
            Ok(Ok(Err(reason))) => Err(TransportError::Subscribe {
                topic: topic.to_string(),
                reason,
            }),
            Ok(Err(_dropped)) => Err(TransportError::Closed),
            Err(_elapsed) => Err(TransportError::Subscribe {
                topic: topic.to_string(),
                reason: "no acknowledgement from broker".to_string(),
            }),
        }
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
    ) -> Result<(), TransportError> {
        self.client
            .publish(topic, qos.into(), false, payload)
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.closing.store(true, Ordering::Release);
        self.client
            .disconnect()
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))
    }
}
