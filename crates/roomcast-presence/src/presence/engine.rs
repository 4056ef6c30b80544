//! The presence state machine.
//!
//! The engine performs no I/O. Each input returns the [`Effect`]s the
//! session task has to carry out, which keeps every protocol rule testable
//! with synthetic instants.

use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::chat::{self, Rejection};
use crate::protocol::{
    ChatMessage, PresenceAction, ProtocolEnvelope, RoomChannelSet, RoomTopic,
};
use crate::roster::Roster;
use crate::session::Session;
use crate::transport::QoS;

use super::types::{PresenceConfig, PresenceEvent, ProtocolState, Visibility};

/// Work requested by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Publish {
        topic: String,
        payload: Vec<u8>,
        qos: QoS,
    },
    /// Answer `target` with a `user_response` after `delay`.
    ScheduleResponse { target: String, delay: Duration },
    StartTimers { heartbeat: Duration, sweep: Duration },
    StopTimers,
    SetHeartbeatInterval(Duration),
    Notify(PresenceEvent),
}

pub struct PresenceEngine {
    identity: String,
    token: String,
    channels: RoomChannelSet,
    config: PresenceConfig,
    state: ProtocolState,
    visibility: Visibility,
    roster: Roster,
}

impl PresenceEngine {
    pub fn new(session: &Session, config: PresenceConfig) -> Self {
        Self {
            identity: session.identity().to_string(),
            token: session.token().as_str().to_string(),
            channels: session.channels().clone(),
            config,
            state: ProtocolState::Idle,
            visibility: Visibility::Visible,
            roster: Roster::new(),
        }
    }

    pub fn state(&self) -> ProtocolState {
        self.state
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn channels(&self) -> &RoomChannelSet {
        &self.channels
    }

    fn transition(&mut self, next: ProtocolState) {
        debug!(from = %self.state, to = %next, "presence state");
        self.state = next;
    }

    fn heartbeat_interval(&self) -> Duration {
        match self.visibility {
            Visibility::Visible => self.config.heartbeat_interval,
            Visibility::Hidden => self.config.background_heartbeat_interval,
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// `Idle → Subscribing`. Returns `false` from any other state.
    pub fn begin_subscribe(&mut self) -> bool {
        if self.state != ProtocolState::Idle {
            return false;
        }
        self.transition(ProtocolState::Subscribing);
        true
    }

    /// `Subscribing → Announcing`, once every topic is confirmed.
    pub fn subscriptions_confirmed(&mut self) -> bool {
        if self.state != ProtocolState::Subscribing {
            return false;
        }
        self.transition(ProtocolState::Announcing);
        true
    }

    /// `Announcing → Joined`: announce ourselves, start the timers and ask
    /// the room who is already here.
    pub fn announce(&mut self, now: Instant) -> Vec<Effect> {
        if self.state != ProtocolState::Announcing {
            return Vec::new();
        }
        let mut effects = Vec::new();
        effects.extend(self.publish_envelope(ProtocolEnvelope::new(
            PresenceAction::Join,
            &self.identity,
            &self.token,
        )));

        self.roster.set_local(&self.identity);
        self.roster.upsert(&self.identity, &self.token, now);
        effects.push(self.roster_changed());

        effects.push(Effect::StartTimers {
            heartbeat: self.heartbeat_interval(),
            sweep: self.config.sweep_interval,
        });
        effects.extend(self.query_effects());

        self.transition(ProtocolState::Joined);
        info!(identity = %self.identity, "joined room");
        effects
    }

    /// Any state `→ Leaving`: stop timers and, if the transport is still
    /// up, announce the departure.
    pub fn begin_leave(&mut self, connected: bool) -> Vec<Effect> {
        if self.state == ProtocolState::Idle && self.roster.is_empty() {
            return Vec::new();
        }
        let was = self.state;
        self.transition(ProtocolState::Leaving);
        let mut effects = vec![Effect::StopTimers];
        if connected && was != ProtocolState::Idle {
            effects.extend(self.publish_envelope(ProtocolEnvelope::new(
                PresenceAction::Leave,
                &self.identity,
                &self.token,
            )));
        }
        effects
    }

    /// `Leaving → Idle` with an empty roster.
    pub fn finish_leave(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if !self.roster.is_empty() {
            self.roster.clear();
            effects.push(self.roster_changed());
        }
        if self.state != ProtocolState::Idle {
            self.transition(ProtocolState::Idle);
        }
        effects
    }

    /// The transport dropped underneath us. Nothing can be published, so
    /// this is a silent `Leaving → Idle`.
    pub fn connection_lost(&mut self) -> Vec<Effect> {
        let mut effects = self.begin_leave(false);
        effects.extend(self.finish_leave());
        effects
    }

    // -----------------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------------

    pub fn heartbeat_tick(&mut self, now: Instant) -> Vec<Effect> {
        if self.state != ProtocolState::Joined {
            return Vec::new();
        }
        self.roster.upsert(&self.identity, &self.token, now);
        self.publish_envelope(ProtocolEnvelope::new(
            PresenceAction::Heartbeat,
            &self.identity,
            &self.token,
        ))
        .into_iter()
        .collect()
    }

    pub fn sweep_tick(&mut self, now: Instant) -> Vec<Effect> {
        if self.state != ProtocolState::Joined {
            return Vec::new();
        }
        let evicted = self.roster.sweep(now, self.config.timeout);
        if evicted.is_empty() {
            return Vec::new();
        }
        let mut effects: Vec<Effect> = evicted
            .into_iter()
            .map(|p| {
                info!(identity = %p.identity, "peer timed out");
                Effect::Notify(PresenceEvent::PeerTimedOut {
                    identity: p.identity,
                })
            })
            .collect();
        effects.push(self.roster_changed());
        effects
    }

    /// Foreground/background switch. Going to the background only slows the
    /// heartbeat; coming back restarts both timers and re-queries the room.
    pub fn set_visibility(&mut self, visibility: Visibility) -> Vec<Effect> {
        if self.visibility == visibility {
            return Vec::new();
        }
        self.visibility = visibility;
        if self.state != ProtocolState::Joined {
            return Vec::new();
        }
        match visibility {
            Visibility::Hidden => vec![Effect::SetHeartbeatInterval(self.heartbeat_interval())],
            Visibility::Visible => {
                let mut effects = vec![
                    Effect::StopTimers,
                    Effect::StartTimers {
                        heartbeat: self.heartbeat_interval(),
                        sweep: self.config.sweep_interval,
                    },
                ];
                effects.extend(self.query_effects());
                effects
            }
        }
    }

    // -----------------------------------------------------------------------
    // Outbound requests
    // -----------------------------------------------------------------------

    /// Broadcast a fresh `query_users` while joined.
    pub fn refresh(&self) -> Vec<Effect> {
        if self.state != ProtocolState::Joined {
            return Vec::new();
        }
        self.query_effects()
    }

    /// Publish a `user_response` for `target`, if still joined.
    pub fn respond_to(&self, target: &str) -> Vec<Effect> {
        if self.state != ProtocolState::Joined {
            return Vec::new();
        }
        debug!(target = %target, "answering presence query");
        self.publish_envelope(ProtocolEnvelope::response_to(
            &self.identity,
            &self.token,
            target,
        ))
        .into_iter()
        .collect()
    }

    /// Chat publish for `body`. Not echoed locally.
    pub fn send_chat(&self, body: &str) -> Result<Effect, Rejection> {
        if self.state != ProtocolState::Joined {
            return Err(Rejection::NotJoined);
        }
        let limit = self.config.max_message_chars.min(chat::MAX_MESSAGE_CHARS);
        let message = chat::compose(body, &self.identity, &self.token, limit)?;
        self.publish(RoomTopic::Messages, &message)
            .ok_or(Rejection::Empty)
    }

    // -----------------------------------------------------------------------
    // Inbound traffic
    // -----------------------------------------------------------------------

    pub fn handle_inbound(&mut self, topic: &str, payload: &[u8], now: Instant) -> Vec<Effect> {
        let Some(kind) = self.channels.classify(topic) else {
            debug!(topic = %topic, "ignoring message on foreign topic");
            return Vec::new();
        };

        if kind == RoomTopic::Messages {
            return match ChatMessage::decode(payload) {
                Ok(message) => vec![Effect::Notify(PresenceEvent::MessageReceived(message))],
                Err(e) => {
                    warn!(topic = %topic, error = %e, "dropping malformed chat message");
                    Vec::new()
                }
            };
        }

        match ProtocolEnvelope::decode(kind, payload) {
            Ok(envelope) => self.handle_envelope(envelope, now),
            Err(e) => {
                warn!(topic = %topic, error = %e, "dropping malformed presence envelope");
                Vec::new()
            }
        }
    }

    fn handle_envelope(&mut self, envelope: ProtocolEnvelope, now: Instant) -> Vec<Effect> {
        if self.state != ProtocolState::Joined {
            debug!(action = ?envelope.action, state = %self.state, "envelope before join ignored");
            return Vec::new();
        }
        if envelope.sender == self.identity {
            return Vec::new();
        }

        let sender = envelope.sender;
        let mut effects = Vec::new();
        match envelope.action {
            PresenceAction::Join => {
                info!(identity = %sender, "peer joined");
                let added = self.roster.upsert(&sender, &envelope.session_token, now);
                effects.push(Effect::Notify(PresenceEvent::PeerJoined {
                    identity: sender.clone(),
                }));
                if added {
                    effects.push(self.roster_changed());
                }
                effects.push(Effect::ScheduleResponse {
                    target: sender,
                    delay: self.response_delay(),
                });
            }
            PresenceAction::Leave => {
                if self.roster.remove(&sender).is_some() {
                    info!(identity = %sender, reason = ?envelope.reason, "peer left");
                    effects.push(Effect::Notify(PresenceEvent::PeerLeft {
                        identity: sender,
                        reason: envelope.reason,
                    }));
                    effects.push(self.roster_changed());
                }
            }
            PresenceAction::Heartbeat => {
                if self.roster.upsert(&sender, &envelope.session_token, now) {
                    effects.push(self.roster_changed());
                }
            }
            PresenceAction::QueryUsers => {
                effects.extend(self.respond_to(&sender));
            }
            PresenceAction::UserResponse => {
                if envelope.target.as_deref() == Some(self.identity.as_str())
                    && self.roster.upsert(&sender, &envelope.session_token, now)
                {
                    effects.push(self.roster_changed());
                }
            }
        }
        effects
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn response_delay(&self) -> Duration {
        let min = self.config.response_delay_min.as_millis() as u64;
        let max = (self.config.response_delay_max.as_millis() as u64).max(min);
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }

    fn roster_changed(&self) -> Effect {
        Effect::Notify(PresenceEvent::RosterChanged(self.roster.snapshot()))
    }

    fn query_effects(&self) -> Vec<Effect> {
        self.publish_envelope(ProtocolEnvelope::new(
            PresenceAction::QueryUsers,
            &self.identity,
            &self.token,
        ))
        .into_iter()
        .collect()
    }

    fn publish_envelope(&self, envelope: ProtocolEnvelope) -> Option<Effect> {
        self.publish(envelope.action.topic(), &envelope)
    }

    fn publish<T: Serialize>(&self, kind: RoomTopic, value: &T) -> Option<Effect> {
        match serde_json::to_vec(value) {
            Ok(payload) => Some(Effect::Publish {
                topic: self.channels.topic(kind),
                payload,
                qos: kind.qos(),
            }),
            Err(e) => {
                warn!(topic = ?kind, error = %e, "failed to encode outgoing payload");
                None
            }
        }
    }
}
