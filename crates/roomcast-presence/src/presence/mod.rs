//! Presence coordinator.
//!
//! [`PresenceClient`] is the handle the front end holds. It spawns one
//! session task per room session; the task drives the transport and feeds
//! a sans-IO [`PresenceEngine`] that decides what to publish, when the
//! roster changes and which notifications to emit.

mod client;
mod driver;
mod engine;
mod timers;
mod types;

#[cfg(test)]
mod tests;

pub use client::PresenceClient;
pub use engine::{Effect, PresenceEngine};
pub use types::{PresenceConfig, PresenceEvent, ProtocolState, Visibility};
