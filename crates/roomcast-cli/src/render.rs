//! Turning presence events into transcript lines.

use chrono::Local;
use roomcast_presence::{ChatMessage, ConnectionStatus, Participant, PresenceEvent};

pub fn chat_line(message: &ChatMessage, local_identity: &str) -> String {
    let time = message.timestamp.with_timezone(&Local).format("%H:%M:%S");
    if message.sender == local_identity {
        format!("[{time}] {} (you): {}", message.sender, message.body)
    } else {
        format!("[{time}] {}: {}", message.sender, message.body)
    }
}

/// Online count followed by one identity per line, the local one marked.
pub fn roster_lines(roster: &[Participant], local_identity: &str) -> Vec<String> {
    let mut lines = vec![format!("online ({}):", roster.len())];
    lines.extend(roster.iter().map(|p| {
        if p.identity == local_identity {
            format!("  {} (you)", p.identity)
        } else {
            format!("  {}", p.identity)
        }
    }));
    lines
}

fn status_line(status: ConnectionStatus) -> String {
    match status {
        ConnectionStatus::Connecting => "* connecting...".to_string(),
        ConnectionStatus::Connected => "* connected".to_string(),
        ConnectionStatus::Disconnected => "* disconnected".to_string(),
    }
}

/// Line for a notification, or `None` for ones that are not shown.
pub fn event_line(event: &PresenceEvent, local_identity: &str) -> Option<String> {
    let line = match event {
        PresenceEvent::MessageReceived(message) => chat_line(message, local_identity),
        PresenceEvent::PeerJoined { identity } => format!("* {identity} joined"),
        PresenceEvent::PeerLeft {
            identity,
            reason: Some(reason),
        } => format!("* {identity} left ({})", reason.replace('_', " ")),
        PresenceEvent::PeerLeft { identity, .. } => format!("* {identity} left"),
        PresenceEvent::PeerTimedOut { identity } => format!("* {identity} timed out"),
        PresenceEvent::StatusChanged(status) => status_line(*status),
        PresenceEvent::Reconnecting => "* reconnecting...".to_string(),
        PresenceEvent::Error(message) => format!("! {message}"),
        PresenceEvent::RosterChanged(_) => return None,
    };
    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tokio::time::Instant;

    fn message(sender: &str, body: &str) -> ChatMessage {
        ChatMessage {
            sender: sender.into(),
            body: body.into(),
            timestamp: Utc::now(),
            id: "m1".into(),
            session_token: "tok".into(),
        }
    }

    fn participant(identity: &str) -> Participant {
        Participant {
            identity: identity.into(),
            session_token: format!("tok-{identity}"),
            last_seen: Instant::now(),
        }
    }

    #[test]
    fn own_messages_are_marked() {
        assert!(chat_line(&message("alice", "hi"), "alice").ends_with("alice (you): hi"));
        assert!(chat_line(&message("bob", "yo"), "alice").ends_with("] bob: yo"));
    }

    #[test]
    fn roster_lists_count_and_marks_local() {
        let roster = vec![participant("alice"), participant("bob")];
        assert_eq!(
            roster_lines(&roster, "bob"),
            vec!["online (2):", "  alice", "  bob (you)"]
        );
    }

    #[test]
    fn departures_show_reason() {
        let event = PresenceEvent::PeerLeft {
            identity: "bob".into(),
            reason: Some("connection_lost".into()),
        };
        assert_eq!(
            event_line(&event, "alice").as_deref(),
            Some("* bob left (connection lost)")
        );
        let event = PresenceEvent::PeerTimedOut {
            identity: "carol".into(),
        };
        assert_eq!(
            event_line(&event, "alice").as_deref(),
            Some("* carol timed out")
        );
    }

    #[test]
    fn roster_updates_are_silent() {
        assert_eq!(
            event_line(&PresenceEvent::RosterChanged(Vec::new()), "alice"),
            None
        );
    }
}
