use haptik_proto::MessageKind;

use crate::transport::TransportError;

/// Errors that can occur in the device layer.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// A command carried an out-of-range feature index or bad arity.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// The adapter does not accept this message kind.
    #[error("message kind {0} not supported by this device")]
    UnsupportedMessage(MessageKind),

    /// Transport-level write failure.
    #[error("device transport error: {0}")]
    Io(#[from] TransportError),
}

pub type Result<T> = std::result::Result<T, DeviceError>;
