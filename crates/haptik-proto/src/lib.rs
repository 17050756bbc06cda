//! Message model for the haptik device-control protocol.
//!
//! The protocol is a closed, versioned set of JSON messages. Every message
//! carries a client-assigned correlation id; the server answers each message
//! with exactly one correlated response.

pub mod error;
pub mod message;

pub use error::ErrorCode;
pub use message::{
    DeviceMessageInfo, LogLevel, Message, MessageId, MessageKind, VibrateSubcommand,
    CURRENT_MESSAGE_VERSION, EVENT_ID,
};
