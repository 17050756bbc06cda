use std::collections::HashMap;

use haptik_device::{DeviceError, ProtocolAdapter};
use haptik_proto::{Message, MessageKind};

use crate::error::{Result, ServerError};

/// Handler category a message kind resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    Ping,
    Test,
    RequestLog,
    StartScanning,
    StopScanning,
    RequestDeviceList,
    /// Routed by device index to that device's protocol adapter.
    DeviceCommand,
}

/// Maps an incoming message's kind to its registered handler.
///
/// Kinds without an entry (server-to-client kinds, or kinds unknown to this
/// server) fail resolution with `UnhandledMessageError` — a deliberate
/// illegal-input check, surfaced as a protocol error.
pub struct DispatchTable {
    entries: HashMap<MessageKind, Handler>,
}

impl DispatchTable {
    /// Table with the standard server-level and device-command entries.
    pub fn server_defaults() -> Self {
        let mut entries = HashMap::new();
        entries.insert(MessageKind::Ping, Handler::Ping);
        entries.insert(MessageKind::Test, Handler::Test);
        entries.insert(MessageKind::RequestLog, Handler::RequestLog);
        entries.insert(MessageKind::StartScanning, Handler::StartScanning);
        entries.insert(MessageKind::StopScanning, Handler::StopScanning);
        entries.insert(MessageKind::RequestDeviceList, Handler::RequestDeviceList);
        entries.insert(MessageKind::VibrateCmd, Handler::DeviceCommand);
        entries.insert(MessageKind::SingleMotorVibrateCmd, Handler::DeviceCommand);
        entries.insert(MessageKind::StopDeviceCmd, Handler::DeviceCommand);
        Self { entries }
    }

    /// Resolve the handler for a message kind.
    pub fn resolve(&self, kind: MessageKind) -> Result<Handler> {
        self.entries
            .get(&kind)
            .copied()
            .ok_or(ServerError::UnhandledMessage(kind))
    }
}

impl Default for DispatchTable {
    fn default() -> Self {
        Self::server_defaults()
    }
}

/// Validate a device command against the adapter's registered preconditions
/// before it reaches the adapter: the kind must be accepted, and per-feature
/// commands must not exceed the declared feature count.
pub fn check_device_preconditions(adapter: &dyn ProtocolAdapter, message: &Message) -> Result<()> {
    let kind = message.kind();
    let Some(precondition) = adapter.accepted_messages().get(&kind) else {
        return Err(ServerError::UnhandledMessage(kind));
    };

    if let (Some(feature_count), Message::VibrateCmd { speeds, .. }) =
        (precondition.feature_count, message)
    {
        if speeds.len() > feature_count {
            return Err(ServerError::Device(DeviceError::InvalidCommand(format!(
                "expected at most {feature_count} speed entries, got {}",
                speeds.len()
            ))));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_registered_kinds() {
        let table = DispatchTable::server_defaults();
        assert_eq!(
            table.resolve(MessageKind::StartScanning).expect("kind should resolve"),
            Handler::StartScanning
        );
        assert_eq!(
            table.resolve(MessageKind::VibrateCmd).expect("kind should resolve"),
            Handler::DeviceCommand
        );
    }

    #[test]
    fn server_to_client_kinds_are_unhandled() {
        let table = DispatchTable::server_defaults();
        for kind in [
            MessageKind::ServerInfo,
            MessageKind::Ok,
            MessageKind::Error,
            MessageKind::DeviceList,
            MessageKind::DeviceAdded,
            MessageKind::DeviceRemoved,
        ] {
            let err = table.resolve(kind).expect_err("kind should be unhandled");
            assert!(matches!(err, ServerError::UnhandledMessage(k) if k == kind));
        }
    }

    #[test]
    fn handshake_kind_is_not_in_the_table() {
        // The handshake is handled by the server state machine before
        // dispatch ever sees it.
        let table = DispatchTable::server_defaults();
        assert!(table.resolve(MessageKind::RequestServerInfo).is_err());
    }
}
