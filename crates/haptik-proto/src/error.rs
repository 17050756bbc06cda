use serde::{Deserialize, Serialize};

/// Wire-visible error classification carried by [`Message::Error`].
///
/// One code per failure kind the server can report. Codes are part of the
/// protocol surface and must stay stable across releases.
///
/// [`Message::Error`]: crate::message::Message::Error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// A non-handshake message arrived before the handshake completed.
    HandshakeRequired,
    /// A second handshake request arrived on an already-handshaked session.
    RepeatedHandshake,
    /// The client requested a protocol version the server does not support.
    VersionMismatch,
    /// The message kind is not handled by this server.
    UnhandledMessage,
    /// A device command carried an out-of-range feature index or bad arity.
    InvalidCommand,
    /// The addressed device index is not connected.
    DeviceNotFound,
    /// A subtype manager failed to start or stop scanning.
    Scan,
    /// A device transport write failed.
    DeviceIo,
    /// Anything the server could not classify.
    Unknown,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCode::HandshakeRequired => "HandshakeRequired",
            ErrorCode::RepeatedHandshake => "RepeatedHandshake",
            ErrorCode::VersionMismatch => "VersionMismatch",
            ErrorCode::UnhandledMessage => "UnhandledMessage",
            ErrorCode::InvalidCommand => "InvalidCommand",
            ErrorCode::DeviceNotFound => "DeviceNotFound",
            ErrorCode::Scan => "Scan",
            ErrorCode::DeviceIo => "DeviceIo",
            ErrorCode::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_bare_string() {
        let json = serde_json::to_string(&ErrorCode::DeviceNotFound).expect("code should encode");
        assert_eq!(json, "\"DeviceNotFound\"");
    }

    #[test]
    fn display_matches_wire_name() {
        assert_eq!(ErrorCode::HandshakeRequired.to_string(), "HandshakeRequired");
        assert_eq!(ErrorCode::Scan.to_string(), "Scan");
    }
}
