//! Input line parsing.

/// Lines shown by `/history` without an explicit count.
pub const DEFAULT_HISTORY: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Chat(String),
    Who,
    History(usize),
    Refresh,
    Away,
    Back,
    Help,
    Quit,
    Unknown(String),
    Empty,
}

/// Classify one line typed by the user. A leading `//` sends a literal `/`.
pub fn parse(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    if let Some(escaped) = line.strip_prefix("//") {
        return Input::Chat(format!("/{escaped}"));
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Chat(line.to_string());
    };

    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or_default();
    match name {
        "who" | "users" => Input::Who,
        "history" => match parts.next() {
            None => Input::History(DEFAULT_HISTORY),
            Some(n) => match n.parse() {
                Ok(n) => Input::History(n),
                Err(_) => Input::Unknown(line.to_string()),
            },
        },
        "refresh" => Input::Refresh,
        "away" => Input::Away,
        "back" => Input::Back,
        "help" | "?" => Input::Help,
        "quit" | "exit" | "leave" => Input::Quit,
        _ => Input::Unknown(line.to_string()),
    }
}

pub const HELP: &str = "\
commands:
  /who            list who is online
  /history [n]    show the last n messages (default 20)
  /refresh        ask the room to re-announce itself
  /away, /back    slow down or resume heartbeats
  /quit           leave the room (Ctrl-D also works)
  //text          send a message starting with '/'";
