pub mod errors;
pub mod id;

pub use errors::{ConfigError, DecodeError, RoomcastError, SessionError, TransportError};
pub use id::{new_id, SessionToken};

pub type Result<T> = std::result::Result<T, RoomcastError>;
