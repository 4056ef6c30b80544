//! Interactive session: join, then multiplex typed lines and presence events.

use std::io::Write;
use std::sync::Arc;

use roomcast_common::{RoomcastError, SessionError};
use roomcast_config::{RoomcastConfig, SavedSettings};
use roomcast_presence::chat::{self, ChatHistoryConfig};
use roomcast_presence::{
    ChatHistory, Connector, MemoryBroker, MqttConnector, PresenceClient, PresenceConfig,
    PresenceEvent, Visibility,
};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{info, warn};

use crate::args::{Args, Target};
use crate::commands::{self, Input, HELP};
use crate::render;

const LOOPBACK_ADDRESS: &str = "loopback://local";

type StdinLines = Lines<BufReader<Stdin>>;

/// Coordinator settings from the loaded config.
pub fn presence_config(config: &RoomcastConfig) -> PresenceConfig {
    PresenceConfig {
        topic_prefix: config.broker.topic_prefix.trim().to_string(),
        clean_start: config.broker.clean_start,
        reconnect_delay: config.broker.reconnect_delay(),
        keep_alive: config.broker.keep_alive(),
        connect_timeout: config.broker.connect_timeout(),
        settle_delay: config.presence.settle_delay(),
        heartbeat_interval: config.presence.heartbeat_interval(),
        background_heartbeat_interval: config.presence.background_heartbeat_interval(),
        sweep_interval: config.presence.sweep_interval(),
        timeout: config.presence.timeout(),
        response_delay_min: config.presence.response_delay_min(),
        response_delay_max: config.presence.response_delay_max(),
        max_message_chars: config.chat.max_message_chars,
    }
}

pub async fn run(args: Args, config: RoomcastConfig) -> Result<(), RoomcastError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let saved = if args.loopback {
        SavedSettings::default()
    } else {
        roomcast_config::load_settings().unwrap_or_else(|e| {
            warn!(error = %e, "ignoring saved settings");
            SavedSettings::default()
        })
    };
    let target = Target::resolve(&args, &saved, &config);

    let connector: Arc<dyn Connector> = if args.loopback {
        Arc::new(MemoryBroker::new().connector())
    } else {
        Arc::new(MqttConnector)
    };
    let address = match target.address {
        Some(address) => address,
        None if args.loopback => LOOPBACK_ADDRESS.to_string(),
        None => prompt(&mut lines, "broker address").await?,
    };
    let identity = match target.identity {
        Some(identity) => identity,
        None => prompt(&mut lines, "your name").await?,
    };
    let room = match target.room {
        Some(room) => room,
        None => prompt(&mut lines, "room").await?,
    };

    let (mut client, events) = PresenceClient::new(connector, presence_config(&config));
    let session = client.join(&address, &identity, &room).await?;
    println!(
        "joined '{}' as {} (type /help for commands)",
        session.room(),
        session.identity()
    );

    if !args.loopback {
        let settings = SavedSettings::new(session.address(), session.identity(), session.room());
        if let Err(e) = roomcast_config::save_settings(&settings) {
            warn!(error = %e, "could not save settings");
        }
    }

    let mut chat = ChatSession {
        identity: session.identity().to_string(),
        max_chars: config.chat.max_message_chars,
        history: ChatHistory::new(ChatHistoryConfig {
            max_messages: config.chat.history_limit,
        }),
        client,
    };
    chat.run(lines, events).await;
    Ok(())
}

/// Ask for a missing value on stdin.
async fn prompt(lines: &mut StdinLines, label: &str) -> Result<String, RoomcastError> {
    loop {
        print!("{label}: ");
        std::io::stdout().flush()?;
        match lines.next_line().await? {
            Some(line) if !line.trim().is_empty() => return Ok(line.trim().to_string()),
            Some(_) => continue,
            None => {
                return Err(SessionError::Validation {
                    field: "input",
                    reason: "ended before all values were entered",
                }
                .into())
            }
        }
    }
}

struct ChatSession {
    identity: String,
    max_chars: usize,
    history: ChatHistory,
    client: PresenceClient,
}

impl ChatSession {
    async fn run(
        &mut self,
        mut lines: StdinLines,
        mut events: tokio::sync::mpsc::UnboundedReceiver<PresenceEvent>,
    ) {
        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if !self.handle_line(&line).await {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "stdin read failed");
                        break;
                    }
                },
                event = events.recv() => match event {
                    Some(event) => self.show(event),
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => break,
            }
        }

        info!("leaving room");
        self.client.leave().await;
        while let Ok(event) = events.try_recv() {
            self.show(event);
        }
    }

    /// Returns `false` when the user asked to quit.
    async fn handle_line(&mut self, line: &str) -> bool {
        match commands::parse(line) {
            Input::Chat(body) => self.send(&body).await,
            Input::Who => {
                for line in render::roster_lines(&self.client.roster(), &self.identity) {
                    println!("{line}");
                }
            }
            Input::History(count) => {
                for message in self.history.recent(count) {
                    println!("{}", render::chat_line(message, &self.identity));
                }
            }
            Input::Refresh => self.client.refresh().await,
            Input::Away => {
                self.client.set_visibility(Visibility::Hidden).await;
                println!("* away");
            }
            Input::Back => {
                self.client.set_visibility(Visibility::Visible).await;
                println!("* back");
            }
            Input::Help => println!("{HELP}"),
            Input::Quit => return false,
            Input::Unknown(command) => println!("! unknown command {command}, try /help"),
            Input::Empty => {}
        }
        true
    }

    async fn send(&mut self, body: &str) {
        if !self.client.is_joined() {
            println!("! {}", chat::Rejection::NotJoined);
            return;
        }
        // Check locally first so the user learns why a line was refused.
        if let Err(rejection) = chat::compose(body, &self.identity, "", self.max_chars) {
            println!("! {rejection}");
            return;
        }
        if !self.client.send(body).await {
            println!("! message not sent");
        }
    }

    fn show(&mut self, event: PresenceEvent) {
        if let Some(line) = render::event_line(&event, &self.identity) {
            println!("{line}");
        }
        if let PresenceEvent::MessageReceived(message) = event {
            self.history.push(message);
        }
    }
}
