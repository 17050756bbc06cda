use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;

/// Client-assigned correlation token. Unique per in-flight request.
pub type MessageId = u32;

/// Correlation id reserved for unsolicited server-push events
/// (`DeviceAdded`, `DeviceRemoved`). Clients should use non-zero ids.
pub const EVENT_ID: MessageId = 0;

/// Protocol message version implemented by this crate.
pub const CURRENT_MESSAGE_VERSION: u32 = 1;

/// One per-feature speed entry of a `VibrateCmd`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VibrateSubcommand {
    /// Zero-based feature index.
    pub index: u32,
    /// Speed in `[0.0, 1.0]`.
    pub speed: f64,
}

impl VibrateSubcommand {
    pub fn new(index: u32, speed: f64) -> Self {
        Self { index, speed }
    }
}

/// Log verbosity levels a client may request via `RequestLog`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Off,
    Fatal,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Device summary carried by `DeviceList` and `DeviceAdded`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceMessageInfo {
    pub device_index: u32,
    pub device_name: String,
    /// Message kinds the device's adapter accepts.
    pub device_messages: Vec<MessageKind>,
}

/// The closed protocol message set.
///
/// JSON representation is externally tagged: one object keyed by the
/// message name, e.g. `{"Ok":{"Id":1}}`. Messages are immutable once
/// constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Handshake request. Must be the first message on a connection.
    #[serde(rename_all = "PascalCase")]
    RequestServerInfo {
        id: MessageId,
        client_name: String,
        /// Protocol version the client speaks. Absent means current.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_version: Option<u32>,
    },
    /// Handshake response.
    #[serde(rename_all = "PascalCase")]
    ServerInfo {
        id: MessageId,
        server_name: String,
        message_version: u32,
        major_version: u32,
        minor_version: u32,
        build_version: u32,
        /// Maximum allowed interval between client messages, in
        /// milliseconds. Zero disables the limit.
        max_ping_time: u32,
    },
    /// Generic success acknowledgement.
    #[serde(rename_all = "PascalCase")]
    Ok { id: MessageId },
    /// Generic failure response.
    #[serde(rename_all = "PascalCase")]
    Error {
        id: MessageId,
        error_code: ErrorCode,
        error_message: String,
    },
    /// Keep-alive probe.
    #[serde(rename_all = "PascalCase")]
    Ping { id: MessageId },
    /// Echo request/response for connection sanity checks.
    #[serde(rename_all = "PascalCase")]
    Test { id: MessageId, test_string: String },
    /// Adjust the session's log verbosity.
    #[serde(rename_all = "PascalCase")]
    RequestLog { id: MessageId, log_level: LogLevel },
    /// Ask every subtype manager to start scanning for devices.
    #[serde(rename_all = "PascalCase")]
    StartScanning { id: MessageId },
    /// Ask every subtype manager to stop scanning.
    #[serde(rename_all = "PascalCase")]
    StopScanning { id: MessageId },
    /// Request the list of connected devices.
    #[serde(rename_all = "PascalCase")]
    RequestDeviceList { id: MessageId },
    /// Response to `RequestDeviceList`.
    #[serde(rename_all = "PascalCase")]
    DeviceList {
        id: MessageId,
        devices: Vec<DeviceMessageInfo>,
    },
    /// Server-push: a device was connected.
    #[serde(rename_all = "PascalCase")]
    DeviceAdded {
        id: MessageId,
        device_index: u32,
        device_name: String,
        device_messages: Vec<MessageKind>,
    },
    /// Server-push: a device was disconnected.
    #[serde(rename_all = "PascalCase")]
    DeviceRemoved { id: MessageId, device_index: u32 },
    /// Set per-feature vibration speeds on one device.
    #[serde(rename_all = "PascalCase")]
    VibrateCmd {
        id: MessageId,
        device_index: u32,
        speeds: Vec<VibrateSubcommand>,
    },
    /// Set one speed uniformly across all of a device's features.
    #[serde(rename_all = "PascalCase")]
    SingleMotorVibrateCmd {
        id: MessageId,
        device_index: u32,
        speed: f64,
    },
    /// Stop all of a device's features.
    #[serde(rename_all = "PascalCase")]
    StopDeviceCmd { id: MessageId, device_index: u32 },
}

/// Message kind, used as the dispatch-table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    RequestServerInfo,
    ServerInfo,
    Ok,
    Error,
    Ping,
    Test,
    RequestLog,
    StartScanning,
    StopScanning,
    RequestDeviceList,
    DeviceList,
    DeviceAdded,
    DeviceRemoved,
    VibrateCmd,
    SingleMotorVibrateCmd,
    StopDeviceCmd,
}

impl Message {
    /// Correlation id of this message.
    pub fn id(&self) -> MessageId {
        match self {
            Message::RequestServerInfo { id, .. }
            | Message::ServerInfo { id, .. }
            | Message::Ok { id }
            | Message::Error { id, .. }
            | Message::Ping { id }
            | Message::Test { id, .. }
            | Message::RequestLog { id, .. }
            | Message::StartScanning { id }
            | Message::StopScanning { id }
            | Message::RequestDeviceList { id }
            | Message::DeviceList { id, .. }
            | Message::DeviceAdded { id, .. }
            | Message::DeviceRemoved { id, .. }
            | Message::VibrateCmd { id, .. }
            | Message::SingleMotorVibrateCmd { id, .. }
            | Message::StopDeviceCmd { id, .. } => *id,
        }
    }

    /// Kind tag of this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::RequestServerInfo { .. } => MessageKind::RequestServerInfo,
            Message::ServerInfo { .. } => MessageKind::ServerInfo,
            Message::Ok { .. } => MessageKind::Ok,
            Message::Error { .. } => MessageKind::Error,
            Message::Ping { .. } => MessageKind::Ping,
            Message::Test { .. } => MessageKind::Test,
            Message::RequestLog { .. } => MessageKind::RequestLog,
            Message::StartScanning { .. } => MessageKind::StartScanning,
            Message::StopScanning { .. } => MessageKind::StopScanning,
            Message::RequestDeviceList { .. } => MessageKind::RequestDeviceList,
            Message::DeviceList { .. } => MessageKind::DeviceList,
            Message::DeviceAdded { .. } => MessageKind::DeviceAdded,
            Message::DeviceRemoved { .. } => MessageKind::DeviceRemoved,
            Message::VibrateCmd { .. } => MessageKind::VibrateCmd,
            Message::SingleMotorVibrateCmd { .. } => MessageKind::SingleMotorVibrateCmd,
            Message::StopDeviceCmd { .. } => MessageKind::StopDeviceCmd,
        }
    }

    /// Build an `Ok` acknowledgement correlated with `id`.
    pub fn ok(id: MessageId) -> Self {
        Message::Ok { id }
    }

    /// Build an `Error` response correlated with `id`.
    pub fn error(id: MessageId, code: ErrorCode, message: impl Into<String>) -> Self {
        Message::Error {
            id,
            error_code: code,
            error_message: message.into(),
        }
    }

    /// Build a `DeviceAdded` push event.
    pub fn device_added(index: u32, name: impl Into<String>, kinds: Vec<MessageKind>) -> Self {
        Message::DeviceAdded {
            id: EVENT_ID,
            device_index: index,
            device_name: name.into(),
            device_messages: kinds,
        }
    }

    /// Build a `DeviceRemoved` push event.
    pub fn device_removed(index: u32) -> Self {
        Message::DeviceRemoved {
            id: EVENT_ID,
            device_index: index,
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}
