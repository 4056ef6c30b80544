pub mod chat;
pub mod presence;
pub mod protocol;
pub mod roster;
pub mod session;
pub mod transport;

pub use chat::{ChatHistory, ChatHistoryConfig, Rejection, MAX_MESSAGE_CHARS};
pub use presence::{PresenceClient, PresenceConfig, PresenceEvent, ProtocolState, Visibility};
pub use protocol::{ChatMessage, PresenceAction, ProtocolEnvelope, RoomChannelSet, RoomTopic};
pub use roster::{Participant, Roster};
pub use session::{ConnectionStatus, Session};
pub use transport::{
    BrokerAddress, ConnectOptions, Connection, Connector, MemoryBroker, MqttConnector, QoS,
    Transport, TransportEvent,
};
