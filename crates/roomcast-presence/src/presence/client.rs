//! Handle the front end holds for one room session at a time.

use std::sync::Arc;

use roomcast_common::SessionError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::roster::Participant;
use crate::session::{ConnectionStatus, Session};
use crate::transport::Connector;

use super::driver::{Command, Outputs, SessionTask};
use super::engine::PresenceEngine;
use super::types::{PresenceConfig, PresenceEvent, ProtocolState, Visibility};

const COMMAND_QUEUE: usize = 64;

struct ActiveSession {
    session: Session,
    commands: mpsc::Sender<Command>,
    task: JoinHandle<()>,
    state: watch::Receiver<ProtocolState>,
    roster: watch::Receiver<Vec<Participant>>,
}

impl ActiveSession {
    fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

/// Presence coordinator for a single room session.
///
/// Dropping the client ends the session: the background task sees its
/// command channel close and runs the same leave sequence as [`leave`].
///
/// [`leave`]: PresenceClient::leave
pub struct PresenceClient {
    connector: Arc<dyn Connector>,
    config: PresenceConfig,
    events: mpsc::UnboundedSender<PresenceEvent>,
    active: Option<ActiveSession>,
}

impl PresenceClient {
    /// Create a client. All notifications for every session it runs arrive
    /// on the returned receiver. The queue is unbounded: the session task
    /// never waits for the reader, so commands keep flowing while the front
    /// end is busy.
    pub fn new(
        connector: Arc<dyn Connector>,
        config: PresenceConfig,
    ) -> (Self, mpsc::UnboundedReceiver<PresenceEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        (
            Self {
                connector,
                config,
                events,
                active: None,
            },
            events_rx,
        )
    }

    /// Connect to `address` and join `room` as `identity`.
    ///
    /// Resolves once the join announcement went out, or with the first
    /// error on the way there. Inputs are validated before any connection
    /// is attempted.
    pub async fn join(
        &mut self,
        address: &str,
        identity: &str,
        room: &str,
    ) -> Result<Session, SessionError> {
        if self.active.as_ref().is_some_and(ActiveSession::is_running) {
            return Err(SessionError::AlreadyActive);
        }
        self.active = None;

        let session = Session::open(address, identity, room, &self.config.topic_prefix)?;
        let options = session.connect_options(&self.config)?;

        self.emit(PresenceEvent::StatusChanged(ConnectionStatus::Connecting));
        info!(address = %session.address(), room = %session.room(), "connecting");
        let connection = match self.connector.connect(session.address(), options).await {
            Ok(connection) => connection,
            Err(e) => {
                warn!(error = %e, "connect failed");
                self.emit(PresenceEvent::Error(e.to_string()));
                self.emit(PresenceEvent::StatusChanged(ConnectionStatus::Disconnected));
                return Err(SessionError::Connect(e.to_string()));
            }
        };

        let (commands, commands_rx) = mpsc::channel(COMMAND_QUEUE);
        let (state_tx, state) = watch::channel(ProtocolState::Idle);
        let (roster_tx, roster) = watch::channel(Vec::new());
        let (ready_tx, ready_rx) = oneshot::channel();

        let engine = PresenceEngine::new(&session, self.config.clone());
        let task = SessionTask::new(
            engine,
            connection,
            commands_rx,
            Outputs {
                events: self.events.clone(),
                state: state_tx,
                roster: roster_tx,
                ready: ready_tx,
            },
            self.config.settle_delay,
        );
        let task = tokio::spawn(task.run());

        self.active = Some(ActiveSession {
            session: session.clone(),
            commands,
            task,
            state,
            roster,
        });

        match ready_rx.await {
            Ok(Ok(())) => Ok(session),
            Ok(Err(e)) => {
                self.reap().await;
                Err(e)
            }
            Err(_) => {
                self.reap().await;
                Err(SessionError::Terminated)
            }
        }
    }

    /// Publish a chat message. `false` when not joined, when the body is
    /// empty or too long, or when the transport refused it.
    pub async fn send(&self, body: &str) -> bool {
        let Some(active) = &self.active else {
            return false;
        };
        let (reply, reply_rx) = oneshot::channel();
        let command = Command::Send {
            body: body.to_string(),
            reply,
        };
        if active.commands.send(command).await.is_err() {
            return false;
        }
        reply_rx.await.unwrap_or(false)
    }

    pub async fn set_visibility(&self, visibility: Visibility) {
        self.command(Command::SetVisibility(visibility)).await;
    }

    /// Ask the room to re-announce itself.
    pub async fn refresh(&self) {
        self.command(Command::Refresh).await;
    }

    /// Announce departure, disconnect and reset the roster. Safe to call
    /// when no session is active.
    pub async fn leave(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        let (done, done_rx) = oneshot::channel();
        if active.commands.send(Command::Leave { done }).await.is_ok() {
            let _ = done_rx.await;
        }
        let _ = active.task.await;
    }

    pub fn state(&self) -> ProtocolState {
        self.active
            .as_ref()
            .map(|active| *active.state.borrow())
            .unwrap_or_default()
    }

    /// Identity-sorted roster, local participant included.
    pub fn roster(&self) -> Vec<Participant> {
        self.active
            .as_ref()
            .map(|active| active.roster.borrow().clone())
            .unwrap_or_default()
    }

    pub fn session(&self) -> Option<&Session> {
        self.active.as_ref().map(|active| &active.session)
    }

    pub fn is_joined(&self) -> bool {
        self.state() == ProtocolState::Joined
    }

    async fn command(&self, command: Command) {
        if let Some(active) = &self.active {
            let _ = active.commands.send(command).await;
        }
    }

    async fn reap(&mut self) {
        if let Some(active) = self.active.take() {
            let _ = active.task.await;
        }
    }

    fn emit(&self, event: PresenceEvent) {
        let _ = self.events.send(event);
    }
}
