//! Local view of who is present in the room.
//!
//! Ordered by identity so enumeration is already sorted for display. Every
//! operation is total: unknown identities are ignored, repeated upserts
//! only move `last_seen` forward.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::Instant;

/// One known room member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub identity: String,
    pub session_token: String,
    pub last_seen: Instant,
}

#[derive(Debug, Default)]
pub struct Roster {
    /// Identity exempt from sweeping.
    local: Option<String>,
    entries: BTreeMap<String, Participant>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_local(&mut self, identity: &str) {
        self.local = Some(identity.to_string());
    }

    pub fn is_local(&self, identity: &str) -> bool {
        self.local.as_deref() == Some(identity)
    }

    /// Insert or refresh a participant. Returns `true` if it was not known.
    pub fn upsert(&mut self, identity: &str, session_token: &str, now: Instant) -> bool {
        match self.entries.get_mut(identity) {
            Some(entry) => {
                entry.last_seen = entry.last_seen.max(now);
                if !session_token.is_empty() {
                    entry.session_token = session_token.to_string();
                }
                false
            }
            None => {
                self.entries.insert(
                    identity.to_string(),
                    Participant {
                        identity: identity.to_string(),
                        session_token: session_token.to_string(),
                        last_seen: now,
                    },
                );
                true
            }
        }
    }

    pub fn remove(&mut self, identity: &str) -> Option<Participant> {
        self.entries.remove(identity)
    }

    /// Evict every non-local participant idle for longer than `timeout`.
    pub fn sweep(&mut self, now: Instant, timeout: Duration) -> Vec<Participant> {
        let stale: Vec<String> = self
            .entries
            .values()
            .filter(|p| !self.is_local(&p.identity))
            .filter(|p| now.saturating_duration_since(p.last_seen) > timeout)
            .map(|p| p.identity.clone())
            .collect();

        stale
            .iter()
            .filter_map(|identity| self.entries.remove(identity))
            .collect()
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, identity: &str) -> Option<&Participant> {
        self.entries.get(identity)
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.entries.contains_key(identity)
    }

    /// Participants sorted by identity.
    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.entries.values()
    }

    pub fn snapshot(&self) -> Vec<Participant> {
        self.entries.values().cloned().collect()
    }

    /// Drop all entries and forget the local identity.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.local = None;
    }
}
