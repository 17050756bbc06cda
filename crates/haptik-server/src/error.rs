use haptik_device::DeviceError;
use haptik_proto::{ErrorCode, MessageKind};

use crate::scanning::ScanError;

/// Errors that can occur while handling a client message.
///
/// Every variant is per-message: it becomes the `Error` response for the
/// offending message and never tears down the session.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// A non-handshake message arrived before the handshake completed.
    #[error("handshake required before {0}")]
    HandshakeRequired(MessageKind),

    /// A second handshake request on an already-handshaked session.
    #[error("handshake already completed; version state cannot change mid-connection")]
    RepeatedHandshake,

    /// The client requested a newer protocol version than we speak.
    #[error("requested message version {requested} exceeds supported version {supported}")]
    VersionMismatch { requested: u32, supported: u32 },

    /// No handler is registered for this message kind.
    #[error("unhandled message kind {0}")]
    UnhandledMessage(MessageKind),

    /// The addressed device index is not connected.
    #[error("device {0} is not connected")]
    DeviceNotFound(u32),

    /// A subtype manager failed while scanning.
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// Device-layer failure (bad command, unsupported kind, transport I/O).
    #[error(transparent)]
    Device(#[from] DeviceError),
}

impl ServerError {
    /// Wire error code for the protocol `Error` response.
    pub fn code(&self) -> ErrorCode {
        match self {
            ServerError::HandshakeRequired(_) => ErrorCode::HandshakeRequired,
            ServerError::RepeatedHandshake => ErrorCode::RepeatedHandshake,
            ServerError::VersionMismatch { .. } => ErrorCode::VersionMismatch,
            ServerError::UnhandledMessage(_) => ErrorCode::UnhandledMessage,
            ServerError::DeviceNotFound(_) => ErrorCode::DeviceNotFound,
            ServerError::Scan(_) => ErrorCode::Scan,
            ServerError::Device(DeviceError::InvalidCommand(_)) => ErrorCode::InvalidCommand,
            ServerError::Device(DeviceError::UnsupportedMessage(_)) => ErrorCode::UnhandledMessage,
            ServerError::Device(DeviceError::Io(_)) => ErrorCode::DeviceIo,
        }
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_errors_map_to_distinct_codes() {
        let invalid = ServerError::Device(DeviceError::InvalidCommand("bad index".into()));
        assert_eq!(invalid.code(), ErrorCode::InvalidCommand);

        let unsupported =
            ServerError::Device(DeviceError::UnsupportedMessage(MessageKind::Ping));
        assert_eq!(unsupported.code(), ErrorCode::UnhandledMessage);
    }

    #[test]
    fn handshake_errors_keep_their_kinds() {
        assert_eq!(
            ServerError::HandshakeRequired(MessageKind::Ping).code(),
            ErrorCode::HandshakeRequired
        );
        assert_eq!(ServerError::RepeatedHandshake.code(), ErrorCode::RepeatedHandshake);
        assert_eq!(
            ServerError::VersionMismatch {
                requested: 9,
                supported: 1
            }
            .code(),
            ErrorCode::VersionMismatch
        );
    }
}
