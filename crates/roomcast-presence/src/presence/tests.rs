use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use roomcast_common::{SessionError, TransportError};
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

use super::*;
use crate::protocol::{PresenceAction, ProtocolEnvelope, RoomChannelSet, RoomTopic};
use crate::session::ConnectionStatus;
use crate::transport::{
    ConnectOptions, Connection, Connector, MemoryBroker, PublishRecord, QoS, Transport,
    TransportEvent,
};

const BROKER: &str = "mem://local";

fn client(broker: &MemoryBroker) -> (PresenceClient, mpsc::UnboundedReceiver<PresenceEvent>) {
    PresenceClient::new(Arc::new(broker.connector()), PresenceConfig::default())
}

fn topic(kind: RoomTopic) -> String {
    RoomChannelSet::new("room", "lobby").topic(kind)
}

fn envelope(action: PresenceAction, sender: &str) -> Vec<u8> {
    ProtocolEnvelope::new(action, sender, &format!("tok-{sender}"))
        .encode()
        .unwrap()
}

fn senders(records: &[PublishRecord]) -> Vec<String> {
    records
        .iter()
        .map(|r| {
            let value: serde_json::Value = serde_json::from_slice(&r.payload).unwrap();
            value["username"].as_str().unwrap_or_default().to_string()
        })
        .collect()
}

fn identities(client: &PresenceClient) -> Vec<String> {
    client.roster().into_iter().map(|p| p.identity).collect()
}

fn token(client: &PresenceClient) -> String {
    client.session().unwrap().token().as_str().to_string()
}

async fn wait_for(
    rx: &mut mpsc::UnboundedReceiver<PresenceEvent>,
    matches: impl Fn(&PresenceEvent) -> bool,
) -> PresenceEvent {
    let found = time::timeout(Duration::from_secs(300), async {
        loop {
            match rx.recv().await {
                Some(event) if matches(&event) => return event,
                Some(_) => continue,
                None => panic!("event stream closed"),
            }
        }
    })
    .await;
    found.expect("expected event was not emitted")
}

fn drain(rx: &mut mpsc::UnboundedReceiver<PresenceEvent>) -> Vec<PresenceEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ---------------------------------------------------------------------------
// Joining
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn join_subscribes_everything_then_announces_once() {
    let broker = MemoryBroker::new();
    let (mut alice, mut events) = client(&broker);

    let started = Instant::now();
    let session = alice.join(BROKER, "alice", "lobby").await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(500));
    assert_eq!(session.identity(), "alice");

    let mut expected: Vec<String> = RoomTopic::ALL.iter().map(|k| topic(*k)).collect();
    expected.sort();
    assert_eq!(broker.subscriptions_of(&token(&alice)), expected);

    let joins = broker.publishes_on(&topic(RoomTopic::Join));
    assert_eq!(joins.len(), 1);
    assert_eq!(joins[0].qos, QoS::AtLeastOnce);
    assert_eq!(senders(&joins), vec!["alice"]);

    let all = broker.publishes();
    let join_at = all.iter().position(|r| r.topic == topic(RoomTopic::Join));
    let query_at = all.iter().position(|r| r.topic == topic(RoomTopic::Query));
    assert!(join_at < query_at);

    assert_eq!(alice.state(), ProtocolState::Joined);
    assert!(alice.is_joined());
    assert_eq!(identities(&alice), vec!["alice"]);

    let seen = drain(&mut events);
    assert_eq!(
        seen[0],
        PresenceEvent::StatusChanged(ConnectionStatus::Connecting)
    );
    assert!(seen.contains(&PresenceEvent::StatusChanged(ConnectionStatus::Connected)));
}

#[tokio::test(start_paused = true)]
async fn refused_subscription_fails_join_without_announcing() {
    let broker = MemoryBroker::new();
    broker.refuse_subscription(&topic(RoomTopic::Heartbeat));
    let (mut alice, mut events) = client(&broker);

    let err = alice.join(BROKER, "alice", "lobby").await.unwrap_err();
    match err {
        SessionError::Subscription { topic: t, .. } => assert_eq!(t, topic(RoomTopic::Heartbeat)),
        other => panic!("unexpected error {other:?}"),
    }

    time::sleep(Duration::from_secs(5)).await;
    assert!(broker.publishes_on(&topic(RoomTopic::Join)).is_empty());
    assert!(broker.connected_clients().is_empty());
    assert_eq!(alice.state(), ProtocolState::Idle);

    let seen = drain(&mut events);
    assert!(seen.iter().any(|e| matches!(e, PresenceEvent::Error(_))));
    assert_eq!(
        seen.last(),
        Some(&PresenceEvent::StatusChanged(ConnectionStatus::Disconnected))
    );
}

#[tokio::test(start_paused = true)]
async fn unreachable_broker_reports_connect_error() {
    let broker = MemoryBroker::new();
    broker.set_reachable(false);
    let (mut alice, mut events) = client(&broker);

    let err = alice.join(BROKER, "alice", "lobby").await.unwrap_err();
    assert!(matches!(err, SessionError::Connect(_)));
    assert!(alice.session().is_none());

    let seen = drain(&mut events);
    assert_eq!(
        seen.first(),
        Some(&PresenceEvent::StatusChanged(ConnectionStatus::Connecting))
    );
    assert_eq!(
        seen.last(),
        Some(&PresenceEvent::StatusChanged(ConnectionStatus::Disconnected))
    );
}

#[tokio::test(start_paused = true)]
async fn invalid_input_never_reaches_the_transport() {
    let broker = MemoryBroker::new();
    let (mut alice, mut events) = client(&broker);

    for (address, identity, room) in [("", "alice", "lobby"), (BROKER, " ", "lobby"), (BROKER, "alice", "")] {
        let err = alice.join(address, identity, room).await.unwrap_err();
        assert!(matches!(err, SessionError::Validation { .. }));
    }
    assert!(broker.connected_clients().is_empty());
    assert!(broker.publishes().is_empty());
    assert!(drain(&mut events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn second_join_while_active_is_refused() {
    let broker = MemoryBroker::new();
    let (mut alice, _events) = client(&broker);
    alice.join(BROKER, "alice", "lobby").await.unwrap();

    let err = alice.join(BROKER, "alice", "other").await.unwrap_err();
    assert_eq!(err, SessionError::AlreadyActive);

    alice.leave().await;
    alice.join(BROKER, "alice", "other").await.unwrap();
    assert_eq!(alice.session().unwrap().room(), "other");
}

// ---------------------------------------------------------------------------
// Roster convergence
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn two_peers_converge_on_the_same_roster() {
    let broker = MemoryBroker::new();
    let (mut alice, mut alice_events) = client(&broker);
    let (mut bob, _bob_events) = client(&broker);

    alice.join(BROKER, "alice", "lobby").await.unwrap();
    bob.join(BROKER, "bob", "lobby").await.unwrap();

    wait_for(&mut alice_events, |e| {
        *e == PresenceEvent::PeerJoined {
            identity: "bob".into(),
        }
    })
    .await;
    time::sleep(Duration::from_secs(2)).await;

    assert_eq!(identities(&alice), vec!["alice", "bob"]);
    assert_eq!(identities(&bob), vec!["alice", "bob"]);

    let responses = broker.publishes_on(&topic(RoomTopic::Response));
    assert!(senders(&responses).iter().all(|s| s == "alice"));
    assert!(!responses.is_empty());
}

#[tokio::test(start_paused = true)]
async fn own_announcements_are_not_treated_as_peers() {
    let broker = MemoryBroker::new();
    let (mut alice, mut events) = client(&broker);
    alice.join(BROKER, "alice", "lobby").await.unwrap();
    drain(&mut events);

    broker.inject(&topic(RoomTopic::Join), envelope(PresenceAction::Join, "alice"));
    time::sleep(Duration::from_secs(3)).await;

    let seen = drain(&mut events);
    assert!(!seen
        .iter()
        .any(|e| matches!(e, PresenceEvent::PeerJoined { .. })));
    assert_eq!(identities(&alice), vec!["alice"]);
    assert!(broker.publishes_on(&topic(RoomTopic::Response)).is_empty());
}

#[tokio::test(start_paused = true)]
async fn malformed_traffic_is_ignored() {
    let broker = MemoryBroker::new();
    let (mut alice, _events) = client(&broker);
    alice.join(BROKER, "alice", "lobby").await.unwrap();

    broker.inject(&topic(RoomTopic::Join), b"not json".to_vec());
    broker.inject(&topic(RoomTopic::Heartbeat), br#"{"timestamp":"x"}"#.to_vec());
    broker.inject(&topic(RoomTopic::Messages), b"{}".to_vec());
    broker.inject(&topic(RoomTopic::Heartbeat), envelope(PresenceAction::Heartbeat, "bob"));
    time::sleep(Duration::from_millis(10)).await;

    assert_eq!(identities(&alice), vec!["alice", "bob"]);
    assert!(alice.is_joined());
}

#[tokio::test(start_paused = true)]
async fn silent_peer_is_evicted_after_timeout() {
    let broker = MemoryBroker::new();
    let (mut alice, mut events) = client(&broker);
    alice.join(BROKER, "alice", "lobby").await.unwrap();

    broker.inject(&topic(RoomTopic::Heartbeat), envelope(PresenceAction::Heartbeat, "bob"));
    time::sleep(Duration::from_secs(59)).await;
    assert_eq!(identities(&alice), vec!["alice", "bob"]);

    let heartbeats = broker.publishes_on(&topic(RoomTopic::Heartbeat));
    let own: Vec<_> = heartbeats
        .iter()
        .filter(|r| r.client_id.as_deref() == Some(token(&alice).as_str()))
        .collect();
    assert_eq!(own.len(), 3);
    assert!(own.iter().all(|r| r.qos == QoS::AtMostOnce));

    wait_for(&mut events, |e| {
        *e == PresenceEvent::PeerTimedOut {
            identity: "bob".into(),
        }
    })
    .await;
    assert_eq!(identities(&alice), vec!["alice"]);
}

#[tokio::test(start_paused = true)]
async fn heartbeats_keep_a_peer_alive() {
    let broker = MemoryBroker::new();
    let (mut alice, _events) = client(&broker);
    alice.join(BROKER, "alice", "lobby").await.unwrap();

    for _ in 0..10 {
        broker.inject(&topic(RoomTopic::Heartbeat), envelope(PresenceAction::Heartbeat, "bob"));
        time::sleep(Duration::from_secs(15)).await;
    }
    assert_eq!(identities(&alice), vec!["alice", "bob"]);
}

// ---------------------------------------------------------------------------
// Departures
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn abrupt_disconnect_delivers_last_will() {
    let broker = MemoryBroker::new();
    let (mut alice, mut alice_events) = client(&broker);
    let (mut bob, mut bob_events) = client(&broker);
    alice.join(BROKER, "alice", "lobby").await.unwrap();
    bob.join(BROKER, "bob", "lobby").await.unwrap();
    time::sleep(Duration::from_secs(2)).await;

    assert!(broker.drop_client(&token(&bob)));

    let left = wait_for(&mut alice_events, |e| matches!(e, PresenceEvent::PeerLeft { .. })).await;
    assert_eq!(
        left,
        PresenceEvent::PeerLeft {
            identity: "bob".into(),
            reason: Some("connection_lost".into()),
        }
    );
    assert_eq!(identities(&alice), vec!["alice"]);

    wait_for(&mut bob_events, |e| {
        *e == PresenceEvent::StatusChanged(ConnectionStatus::Disconnected)
    })
    .await;
    time::sleep(Duration::from_millis(10)).await;
    assert_eq!(bob.state(), ProtocolState::Idle);
    assert!(bob.roster().is_empty());
}

#[tokio::test(start_paused = true)]
async fn leave_announces_and_resets() {
    let broker = MemoryBroker::new();
    let (mut alice, mut alice_events) = client(&broker);
    let (mut bob, mut bob_events) = client(&broker);
    alice.join(BROKER, "alice", "lobby").await.unwrap();
    bob.join(BROKER, "bob", "lobby").await.unwrap();
    time::sleep(Duration::from_secs(2)).await;
    let alice_token = token(&alice);

    alice.leave().await;

    let leaves = broker.publishes_on(&topic(RoomTopic::Leave));
    assert_eq!(senders(&leaves), vec!["alice"]);
    assert_eq!(leaves[0].client_id.as_deref(), Some(alice_token.as_str()));
    assert!(!broker.connected_clients().contains(&alice_token));
    assert_eq!(alice.state(), ProtocolState::Idle);
    assert!(alice.roster().is_empty());
    assert!(alice.session().is_none());

    let seen = drain(&mut alice_events);
    assert!(seen.contains(&PresenceEvent::RosterChanged(Vec::new())));
    assert_eq!(
        seen.last(),
        Some(&PresenceEvent::StatusChanged(ConnectionStatus::Disconnected))
    );

    wait_for(&mut bob_events, |e| {
        *e == PresenceEvent::PeerLeft {
            identity: "alice".into(),
            reason: None,
        }
    })
    .await;
    assert_eq!(identities(&bob), vec!["bob"]);

    let before = broker.publishes().len();
    time::sleep(Duration::from_secs(120)).await;
    let after: Vec<_> = broker.publishes()[before..]
        .iter()
        .filter(|r| r.client_id.as_deref() == Some(alice_token.as_str()))
        .cloned()
        .collect();
    assert!(after.is_empty());
}

#[tokio::test(start_paused = true)]
async fn leave_cancels_scheduled_responses() {
    let broker = MemoryBroker::new();
    let (mut alice, _events) = client(&broker);
    alice.join(BROKER, "alice", "lobby").await.unwrap();

    broker.inject(&topic(RoomTopic::Join), envelope(PresenceAction::Join, "bob"));
    time::sleep(Duration::from_millis(1)).await;
    alice.leave().await;
    time::sleep(Duration::from_secs(5)).await;

    assert!(broker.publishes_on(&topic(RoomTopic::Response)).is_empty());
}

#[tokio::test(start_paused = true)]
async fn dropping_the_client_leaves_the_room() {
    let broker = MemoryBroker::new();
    let (mut alice, _events) = client(&broker);
    alice.join(BROKER, "alice", "lobby").await.unwrap();
    let alice_token = token(&alice);

    drop(alice);
    time::sleep(Duration::from_millis(10)).await;

    let leaves = broker.publishes_on(&topic(RoomTopic::Leave));
    assert_eq!(leaves.len(), 1);
    assert_eq!(leaves[0].client_id.as_deref(), Some(alice_token.as_str()));
    assert!(broker.connected_clients().is_empty());
}

#[tokio::test(start_paused = true)]
async fn leave_without_session_is_a_noop() {
    let broker = MemoryBroker::new();
    let (mut alice, _events) = client(&broker);
    alice.leave().await;
    assert!(broker.publishes().is_empty());
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn send_enforces_length_and_delivers_via_echo() {
    let broker = MemoryBroker::new();
    let (mut alice, mut events) = client(&broker);
    alice.join(BROKER, "alice", "lobby").await.unwrap();

    assert!(!alice.send(&"x".repeat(501)).await);
    assert!(!alice.send("   ").await);
    assert!(broker.publishes_on(&topic(RoomTopic::Messages)).is_empty());

    assert!(alice.send(&"x".repeat(500)).await);
    let messages = broker.publishes_on(&topic(RoomTopic::Messages));
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].qos, QoS::AtLeastOnce);

    let received = wait_for(&mut events, |e| matches!(e, PresenceEvent::MessageReceived(_))).await;
    match received {
        PresenceEvent::MessageReceived(message) => {
            assert_eq!(message.sender, "alice");
            assert_eq!(message.body.chars().count(), 500);
            assert_eq!(message.session_token, token(&alice));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn send_without_session_is_rejected() {
    let broker = MemoryBroker::new();
    let (alice, _events) = client(&broker);
    assert!(!alice.send("hello").await);
    assert!(broker.publishes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn peers_receive_each_others_messages() {
    let broker = MemoryBroker::new();
    let (mut alice, _alice_events) = client(&broker);
    let (mut bob, mut bob_events) = client(&broker);
    alice.join(BROKER, "alice", "lobby").await.unwrap();
    bob.join(BROKER, "bob", "lobby").await.unwrap();

    assert!(alice.send("  hi bob  ").await);
    let received = wait_for(&mut bob_events, |e| matches!(e, PresenceEvent::MessageReceived(_))).await;
    let PresenceEvent::MessageReceived(message) = received else {
        unreachable!()
    };
    assert_eq!(message.sender, "alice");
    assert_eq!(message.body, "hi bob");
}

#[tokio::test(start_paused = true)]
async fn commands_complete_while_events_go_unread() {
    let broker = MemoryBroker::new();
    let (mut alice, mut events) = client(&broker);
    alice.join(BROKER, "alice", "lobby").await.unwrap();

    let payload = crate::chat::compose("hi", "bob", "tok-bob", crate::chat::MAX_MESSAGE_CHARS)
        .unwrap()
        .encode()
        .unwrap();
    for batch in 0..6 {
        for _ in 0..50 {
            broker.inject(&topic(RoomTopic::Messages), payload.clone());
        }
        time::sleep(Duration::from_millis(10 * (batch + 1))).await;
    }

    let sent = time::timeout(Duration::from_secs(5), alice.send("hello")).await;
    assert!(matches!(sent, Ok(true)));
    time::timeout(Duration::from_secs(5), alice.leave())
        .await
        .expect("leave completed");

    let received = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, PresenceEvent::MessageReceived(_)))
        .count();
    assert!(received > 256, "only {received} messages delivered");
}

// ---------------------------------------------------------------------------
// Visibility and refresh
// ---------------------------------------------------------------------------

fn own_on(broker: &MemoryBroker, client: &PresenceClient, kind: RoomTopic) -> usize {
    let token = token(client);
    broker
        .publishes_on(&topic(kind))
        .iter()
        .filter(|r| r.client_id.as_deref() == Some(token.as_str()))
        .count()
}

#[tokio::test(start_paused = true)]
async fn hidden_client_heartbeats_at_background_rate() {
    let broker = MemoryBroker::new();
    let (mut alice, _events) = client(&broker);
    alice.join(BROKER, "alice", "lobby").await.unwrap();

    alice.set_visibility(Visibility::Hidden).await;
    time::sleep(Duration::from_secs(61)).await;
    assert_eq!(own_on(&broker, &alice, RoomTopic::Heartbeat), 2);
    assert_eq!(own_on(&broker, &alice, RoomTopic::Query), 1);

    alice.set_visibility(Visibility::Visible).await;
    time::sleep(Duration::from_millis(10)).await;
    assert_eq!(own_on(&broker, &alice, RoomTopic::Query), 2);

    time::sleep(Duration::from_secs(60)).await;
    assert_eq!(own_on(&broker, &alice, RoomTopic::Heartbeat), 6);
}

#[tokio::test(start_paused = true)]
async fn refresh_broadcasts_a_query() {
    let broker = MemoryBroker::new();
    let (mut alice, _events) = client(&broker);
    alice.join(BROKER, "alice", "lobby").await.unwrap();

    alice.refresh().await;
    time::sleep(Duration::from_millis(10)).await;
    assert_eq!(own_on(&broker, &alice, RoomTopic::Query), 2);
}

// ---------------------------------------------------------------------------
// Reconnect
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Recorder {
    subscribes: Mutex<Vec<String>>,
    publishes: Mutex<Vec<String>>,
}

impl Recorder {
    fn subscribes(&self) -> usize {
        self.subscribes.lock().unwrap().len()
    }

    fn publishes_on(&self, topic: &str) -> usize {
        self.publishes
            .lock()
            .unwrap()
            .iter()
            .filter(|t| *t == topic)
            .count()
    }
}

struct ScriptedTransport(Arc<Recorder>);

#[async_trait]
impl Transport for ScriptedTransport {
    async fn subscribe(&self, topic: &str, _qos: QoS) -> Result<(), TransportError> {
        self.0.subscribes.lock().unwrap().push(topic.to_string());
        Ok(())
    }

    async fn publish(&self, topic: &str, _payload: Vec<u8>, _qos: QoS) -> Result<(), TransportError> {
        self.0.publishes.lock().unwrap().push(topic.to_string());
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

struct ScriptedConnector {
    recorder: Arc<Recorder>,
    events: Mutex<Option<mpsc::Receiver<TransportEvent>>>,
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(
        &self,
        _address: &str,
        _options: ConnectOptions,
    ) -> Result<Connection, TransportError> {
        let events = self.events.lock().unwrap().take().ok_or(TransportError::Closed)?;
        Ok(Connection {
            transport: Arc::new(ScriptedTransport(Arc::clone(&self.recorder))),
            events,
        })
    }
}

#[tokio::test(start_paused = true)]
async fn reconnect_runs_a_fresh_join_cycle() {
    let recorder = Arc::new(Recorder::default());
    let (script, events) = mpsc::channel(16);
    let connector = ScriptedConnector {
        recorder: Arc::clone(&recorder),
        events: Mutex::new(Some(events)),
    };
    let (mut alice, mut notifications) =
        PresenceClient::new(Arc::new(connector), PresenceConfig::default());

    alice.join(BROKER, "alice", "lobby").await.unwrap();
    assert_eq!(recorder.subscribes(), 6);
    assert_eq!(recorder.publishes_on(&topic(RoomTopic::Join)), 1);
    drain(&mut notifications);

    script.send(TransportEvent::Closed).await.unwrap();
    wait_for(&mut notifications, |e| {
        *e == PresenceEvent::StatusChanged(ConnectionStatus::Disconnected)
    })
    .await;
    assert_eq!(alice.state(), ProtocolState::Idle);
    assert!(alice.roster().is_empty());

    script.send(TransportEvent::Reconnecting).await.unwrap();
    wait_for(&mut notifications, |e| *e == PresenceEvent::Reconnecting).await;

    script.send(TransportEvent::Connected).await.unwrap();
    wait_for(&mut notifications, |e| {
        *e == PresenceEvent::StatusChanged(ConnectionStatus::Connected)
    })
    .await;
    time::sleep(Duration::from_secs(1)).await;

    assert_eq!(recorder.subscribes(), 12);
    assert_eq!(recorder.publishes_on(&topic(RoomTopic::Join)), 2);
    assert_eq!(alice.state(), ProtocolState::Joined);
    assert_eq!(identities(&alice), vec!["alice"]);
}

#[tokio::test(start_paused = true)]
async fn ended_event_stream_terminates_the_session() {
    let recorder = Arc::new(Recorder::default());
    let (script, events) = mpsc::channel(16);
    let connector = ScriptedConnector {
        recorder: Arc::clone(&recorder),
        events: Mutex::new(Some(events)),
    };
    let (mut alice, mut notifications) =
        PresenceClient::new(Arc::new(connector), PresenceConfig::default());
    alice.join(BROKER, "alice", "lobby").await.unwrap();

    drop(script);
    wait_for(&mut notifications, |e| {
        *e == PresenceEvent::StatusChanged(ConnectionStatus::Disconnected)
    })
    .await;
    time::sleep(Duration::from_millis(10)).await;

    assert_eq!(alice.state(), ProtocolState::Idle);
    assert!(!alice.send("hello").await);
    assert_eq!(recorder.publishes_on(&topic(RoomTopic::Leave)), 0);
}
