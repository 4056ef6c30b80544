//! The session task: owns the transport and the engine, and serializes
//! commands, inbound traffic and timer ticks onto one loop.

use std::future::{self, Future};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{try_join_all, BoxFuture, FutureExt};
use roomcast_common::{SessionError, TransportError};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tokio::time::{self, Instant, Sleep};
use tracing::{debug, info, warn};

use crate::protocol::RoomTopic;
use crate::roster::Participant;
use crate::session::{ConnectionStatus, StatusTracker};
use crate::transport::{Connection, QoS, Transport, TransportEvent};

use super::engine::{Effect, PresenceEngine};
use super::timers::{Tick, Timers};
use super::types::{PresenceEvent, ProtocolState, Visibility};

/// Requests from the [`PresenceClient`](super::PresenceClient) handle.
pub(crate) enum Command {
    Send {
        body: String,
        reply: oneshot::Sender<bool>,
    },
    SetVisibility(Visibility),
    Refresh,
    Leave {
        done: oneshot::Sender<()>,
    },
}

/// Channels the task reports through.
pub(crate) struct Outputs {
    pub events: mpsc::UnboundedSender<PresenceEvent>,
    pub state: watch::Sender<ProtocolState>,
    pub roster: watch::Sender<Vec<Participant>>,
    /// Resolved once the room is joined, or when the first cycle fails.
    pub ready: oneshot::Sender<Result<(), SessionError>>,
}

pub(crate) struct SessionTask {
    engine: PresenceEngine,
    transport: Arc<dyn Transport>,
    transport_events: mpsc::Receiver<TransportEvent>,
    commands: mpsc::Receiver<Command>,
    events: mpsc::UnboundedSender<PresenceEvent>,
    state_tx: watch::Sender<ProtocolState>,
    roster_tx: watch::Sender<Vec<Participant>>,
    ready: Option<oneshot::Sender<Result<(), SessionError>>>,
    status: StatusTracker,
    timers: Timers,
    responses: JoinSet<String>,
    subscribing: Option<BoxFuture<'static, Result<(), SessionError>>>,
    settle: Option<Pin<Box<Sleep>>>,
    settle_delay: Duration,
}

async fn maybe<F: Future + Unpin>(slot: &mut Option<F>) -> F::Output {
    match slot {
        Some(fut) => fut.await,
        None => future::pending().await,
    }
}

impl SessionTask {
    pub(crate) fn new(
        engine: PresenceEngine,
        connection: Connection,
        commands: mpsc::Receiver<Command>,
        outputs: Outputs,
        settle_delay: Duration,
    ) -> Self {
        Self {
            engine,
            transport: connection.transport,
            transport_events: connection.events,
            commands,
            events: outputs.events,
            state_tx: outputs.state,
            roster_tx: outputs.roster,
            ready: Some(outputs.ready),
            status: StatusTracker::new(ConnectionStatus::Connecting),
            timers: Timers::default(),
            responses: JoinSet::new(),
            subscribing: None,
            settle: None,
            settle_delay,
        }
    }

    pub(crate) async fn run(mut self) {
        self.set_status(ConnectionStatus::Connected);
        self.begin_cycle();

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Leave { done }) => {
                        self.leave().await;
                        let _ = done.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => {
                        debug!("presence client dropped, leaving room");
                        self.leave().await;
                        break;
                    }
                },
                event = self.transport_events.recv() => match event {
                    Some(event) => {
                        if !self.handle_transport(event).await {
                            break;
                        }
                    }
                    None => {
                        info!("transport gave up on the connection");
                        self.lose_connection().await;
                        self.resolve_ready(Err(SessionError::Terminated));
                        break;
                    }
                },
                result = maybe(&mut self.subscribing) => {
                    self.subscribing = None;
                    match result {
                        Ok(()) => {
                            if self.engine.subscriptions_confirmed() {
                                self.settle = Some(Box::pin(time::sleep(self.settle_delay)));
                            }
                        }
                        Err(e) => {
                            self.fail(e).await;
                            break;
                        }
                    }
                },
                () = maybe(&mut self.settle) => {
                    self.settle = None;
                    let effects = self.engine.announce(Instant::now());
                    self.apply(effects).await;
                    self.resolve_ready(Ok(()));
                },
                tick = self.timers.next() => {
                    let effects = match tick {
                        Tick::Heartbeat => self.engine.heartbeat_tick(Instant::now()),
                        Tick::Sweep => self.engine.sweep_tick(Instant::now()),
                    };
                    self.apply(effects).await;
                },
                Some(response) = self.responses.join_next(), if !self.responses.is_empty() => {
                    if let Ok(target) = response {
                        let effects = self.engine.respond_to(&target);
                        self.apply(effects).await;
                    }
                },
            }
        }
        debug!("session task finished");
    }

    /// Start a Subscribing cycle on the current connection.
    fn begin_cycle(&mut self) {
        if !self.engine.begin_subscribe() {
            return;
        }
        self.publish_state();

        let transport = Arc::clone(&self.transport);
        let channels = self.engine.channels().clone();
        self.subscribing = Some(
            async move {
                let requests = RoomTopic::ALL.into_iter().map(|kind| {
                    let transport = Arc::clone(&transport);
                    let topic = channels.topic(kind);
                    async move {
                        let result = transport.subscribe(&topic, kind.qos()).await;
                        result.map_err(|e| SessionError::Subscription {
                            topic,
                            reason: e.to_string(),
                        })
                    }
                });
                try_join_all(requests).await.map(|_| ())
            }
            .boxed(),
        );
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Send { body, reply } => {
                let accepted = match self.engine.send_chat(&body) {
                    Ok(Effect::Publish {
                        topic,
                        payload,
                        qos,
                    }) => self.publish(&topic, payload, qos).await,
                    Ok(_) => false,
                    Err(rejection) => {
                        debug!(?rejection, "chat message rejected");
                        false
                    }
                };
                let _ = reply.send(accepted);
            }
            Command::SetVisibility(visibility) => {
                let effects = self.engine.set_visibility(visibility);
                self.apply(effects).await;
            }
            Command::Refresh => {
                let effects = self.engine.refresh();
                self.apply(effects).await;
            }
            Command::Leave { .. } => {}
        }
    }

    /// Returns `false` once the session is over.
    async fn handle_transport(&mut self, event: TransportEvent) -> bool {
        match event {
            TransportEvent::Message { topic, payload } => {
                let effects = self.engine.handle_inbound(&topic, &payload, Instant::now());
                self.apply(effects).await;
            }
            TransportEvent::Connected => {
                self.set_status(ConnectionStatus::Connected);
                if self.engine.state() == ProtocolState::Idle {
                    info!("connection restored, rejoining room");
                    self.begin_cycle();
                }
            }
            TransportEvent::Reconnecting => {
                self.set_status(ConnectionStatus::Connecting);
                self.emit(PresenceEvent::Reconnecting);
            }
            TransportEvent::Error(message) => {
                warn!(error = %message, "transport error");
                self.emit(PresenceEvent::Error(message));
            }
            TransportEvent::Closed => {
                info!("connection lost");
                if self.ready.is_some() {
                    self.fail(SessionError::Transport(TransportError::Closed))
                        .await;
                    return false;
                }
                self.lose_connection().await;
            }
        }
        true
    }

    async fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Publish {
                    topic,
                    payload,
                    qos,
                } => {
                    self.publish(&topic, payload, qos).await;
                }
                Effect::ScheduleResponse { target, delay } => {
                    self.responses.spawn(async move {
                        time::sleep(delay).await;
                        target
                    });
                }
                Effect::StartTimers { heartbeat, sweep } => self.timers.start(heartbeat, sweep),
                Effect::StopTimers => self.timers.stop(),
                Effect::SetHeartbeatInterval(period) => self.timers.set_heartbeat(period),
                Effect::Notify(event) => {
                    if let PresenceEvent::RosterChanged(roster) = &event {
                        self.roster_tx.send_replace(roster.clone());
                    }
                    self.emit(event);
                }
            }
        }
        self.publish_state();
    }

    async fn publish(&mut self, topic: &str, payload: Vec<u8>, qos: QoS) -> bool {
        match self.transport.publish(topic, payload, qos).await {
            Ok(()) => true,
            Err(e) => {
                warn!(topic = %topic, error = %e, "publish failed");
                false
            }
        }
    }

    async fn leave(&mut self) {
        self.cancel_pending();
        let connected = self.status.current() == ConnectionStatus::Connected;
        let effects = self.engine.begin_leave(connected);
        self.apply(effects).await;

        if let Err(e) = self.transport.disconnect().await {
            debug!(error = %e, "disconnect failed");
        }

        let effects = self.engine.finish_leave();
        self.apply(effects).await;
        self.set_status(ConnectionStatus::Disconnected);
        self.resolve_ready(Err(SessionError::Terminated));
        info!("left room");
    }

    async fn lose_connection(&mut self) {
        self.cancel_pending();
        let effects = self.engine.connection_lost();
        self.apply(effects).await;
        self.set_status(ConnectionStatus::Disconnected);
    }

    /// Abort the session after an unrecoverable error.
    async fn fail(&mut self, error: SessionError) {
        warn!(error = %error, "room session failed");
        self.emit(PresenceEvent::Error(error.to_string()));
        if let Err(e) = self.transport.disconnect().await {
            debug!(error = %e, "disconnect failed");
        }
        self.lose_connection().await;
        self.resolve_ready(Err(error));
    }

    fn cancel_pending(&mut self) {
        self.subscribing = None;
        self.settle = None;
        self.responses.abort_all();
    }

    fn resolve_ready(&mut self, result: Result<(), SessionError>) {
        if let Some(ready) = self.ready.take() {
            let _ = ready.send(result);
        }
    }

    fn publish_state(&self) {
        self.state_tx.send_replace(self.engine.state());
    }

    fn set_status(&mut self, next: ConnectionStatus) {
        if let Some(status) = self.status.transition(next) {
            self.emit(PresenceEvent::StatusChanged(status));
        }
    }

    /// Never waits on the front end, so a slow reader cannot stall commands.
    fn emit(&self, event: PresenceEvent) {
        if self.events.send(event).is_err() {
            debug!("event receiver dropped");
        }
    }
}
