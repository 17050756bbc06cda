use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use haptik_device::{CuemeAdapter, DescriptorTable, DeviceTransport, ProtocolAdapter};
use haptik_proto::{
    LogLevel, Message, MessageId, MessageKind, CURRENT_MESSAGE_VERSION,
};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::dispatch::{self, DispatchTable, Handler};
use crate::error::{Result, ServerError};
use crate::scanning::{ManagerRegistry, SubtypeManager};

/// Builds a protocol adapter for a newly found device.
pub type AdapterFactory =
    Box<dyn Fn(&str, Arc<dyn DeviceTransport>) -> Arc<dyn ProtocolAdapter> + Send + Sync>;

/// Connection-level configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Name reported in `ServerInfo`.
    pub server_name: String,
    /// Maximum allowed interval between client messages, in milliseconds.
    /// Zero disables the limit.
    pub max_ping_time: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_name: "haptik server".to_string(),
            max_ping_time: 0,
        }
    }
}

enum HandshakeState {
    Unhandshaked,
    Handshaked { message_version: u32 },
}

#[derive(Clone)]
struct DeviceEntry {
    name: String,
    adapter: Arc<dyn ProtocolAdapter>,
}

type DeviceMap = Arc<Mutex<HashMap<u32, DeviceEntry>>>;

/// One connection session: handshake state machine, dispatch, and the set of
/// registered device handles. Created on connection open, destroyed on close;
/// no state persists across connections.
pub struct Server {
    config: ServerConfig,
    state: HandshakeState,
    log_level: LogLevel,
    dispatch: DispatchTable,
    devices: DeviceMap,
    managers: ManagerRegistry,
    adapter_factory: AdapterFactory,
    next_device_index: AtomicU32,
    events: broadcast::Sender<Message>,
}

impl Server {
    /// Create a session with the default Cueme adapter factory.
    pub fn new(config: ServerConfig) -> Self {
        let table = DescriptorTable::cueme();
        let factory: AdapterFactory = Box::new(move |name, transport| {
            Arc::new(CuemeAdapter::new(name, transport, &table))
        });
        Self::with_adapter_factory(config, factory)
    }

    /// Create a session with a custom adapter factory.
    pub fn with_adapter_factory(config: ServerConfig, adapter_factory: AdapterFactory) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            config,
            state: HandshakeState::Unhandshaked,
            log_level: LogLevel::Off,
            dispatch: DispatchTable::server_defaults(),
            devices: Arc::new(Mutex::new(HashMap::new())),
            managers: ManagerRegistry::default(),
            adapter_factory,
            next_device_index: AtomicU32::new(0),
            events,
        }
    }

    /// Register an external device-discovery provider.
    pub fn register_manager(&mut self, manager: Arc<dyn SubtypeManager>) {
        self.managers.register(manager);
    }

    /// Subscribe to server-push events (`DeviceAdded`, `DeviceRemoved`).
    pub fn subscribe_events(&self) -> broadcast::Receiver<Message> {
        self.events.subscribe()
    }

    /// Session log verbosity as last set by `RequestLog`.
    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    /// Register a found device: build its adapter, assign an index, and watch
    /// the transport for removal. Returns the device index.
    ///
    /// Must be called within a tokio runtime.
    pub fn add_device(&self, device_name: &str, transport: Arc<dyn DeviceTransport>) -> u32 {
        let index = self.next_device_index.fetch_add(1, Ordering::Relaxed);
        let removed = transport.subscribe_removed();
        let adapter = (self.adapter_factory)(device_name, transport);

        let mut kinds: Vec<MessageKind> =
            adapter.accepted_messages().keys().copied().collect();
        kinds.sort_by_key(|kind| kind.to_string());

        let display_name = adapter.display_name().to_string();
        lock_devices(&self.devices).insert(
            index,
            DeviceEntry {
                name: display_name.clone(),
                adapter,
            },
        );
        info!(index, device = %display_name, "device registered");

        spawn_registry_watcher(Arc::clone(&self.devices), self.events.clone(), index, removed);
        let _ = self
            .events
            .send(Message::device_added(index, display_name, kinds));
        index
    }

    /// Handle one client message. Total: every input maps to exactly one
    /// correlated response, either the typed success or an `Error`.
    pub async fn submit(&mut self, message: Message) -> Message {
        let id = message.id();
        match self.handle(message).await {
            Ok(response) => response,
            Err(err) => {
                debug!(error = %err, "request failed");
                Message::error(id, err.code(), err.to_string())
            }
        }
    }

    /// Tear down the session: cancel every device adapter's scope and drop
    /// the handles. Cancellation is owner-initiated and raises no client
    /// error.
    pub fn shutdown(&self) {
        let mut devices = lock_devices(&self.devices);
        for entry in devices.values() {
            entry.adapter.teardown();
        }
        devices.clear();
    }

    async fn handle(&mut self, message: Message) -> Result<Message> {
        if let Message::RequestServerInfo {
            id,
            client_name,
            message_version,
        } = &message
        {
            return match self.state {
                HandshakeState::Handshaked { .. } => Err(ServerError::RepeatedHandshake),
                HandshakeState::Unhandshaked => {
                    self.complete_handshake(*id, client_name, *message_version)
                }
            };
        }

        if matches!(self.state, HandshakeState::Unhandshaked) {
            return Err(ServerError::HandshakeRequired(message.kind()));
        }

        let handler = self.dispatch.resolve(message.kind())?;
        match (handler, message) {
            (Handler::Ping, Message::Ping { id }) => Ok(Message::ok(id)),
            (Handler::Test, Message::Test { id, test_string }) => {
                Ok(Message::Test { id, test_string })
            }
            (Handler::RequestLog, Message::RequestLog { id, log_level }) => {
                self.log_level = log_level;
                info!(?log_level, "session log level changed");
                Ok(Message::ok(id))
            }
            (Handler::StartScanning, Message::StartScanning { id }) => {
                self.managers.start_all().await?;
                Ok(Message::ok(id))
            }
            (Handler::StopScanning, Message::StopScanning { id }) => {
                self.managers.stop_all().await?;
                Ok(Message::ok(id))
            }
            (Handler::RequestDeviceList, Message::RequestDeviceList { id }) => {
                Ok(self.device_list(id))
            }
            (Handler::DeviceCommand, message) => self.route_device_command(message).await,
            // Table entry and message shape disagree; treat as unhandled.
            (_, message) => Err(ServerError::UnhandledMessage(message.kind())),
        }
    }

    fn complete_handshake(
        &mut self,
        id: MessageId,
        client_name: &str,
        requested: Option<u32>,
    ) -> Result<Message> {
        let requested = requested.unwrap_or(CURRENT_MESSAGE_VERSION);
        if requested > CURRENT_MESSAGE_VERSION {
            return Err(ServerError::VersionMismatch {
                requested,
                supported: CURRENT_MESSAGE_VERSION,
            });
        }

        self.state = HandshakeState::Handshaked {
            message_version: requested,
        };
        info!(client = client_name, version = requested, "handshake complete");

        Ok(Message::ServerInfo {
            id,
            server_name: self.config.server_name.clone(),
            message_version: requested,
            major_version: version_component(env!("CARGO_PKG_VERSION_MAJOR")),
            minor_version: version_component(env!("CARGO_PKG_VERSION_MINOR")),
            build_version: version_component(env!("CARGO_PKG_VERSION_PATCH")),
            max_ping_time: self.config.max_ping_time,
        })
    }

    fn device_list(&self, id: MessageId) -> Message {
        let devices = lock_devices(&self.devices);
        let mut entries: Vec<_> = devices.iter().collect();
        entries.sort_by_key(|(index, _)| **index);
        let devices = entries
            .into_iter()
            .map(|(index, entry)| {
                let mut kinds: Vec<MessageKind> =
                    entry.adapter.accepted_messages().keys().copied().collect();
                kinds.sort_by_key(|kind| kind.to_string());
                haptik_proto::DeviceMessageInfo {
                    device_index: *index,
                    device_name: entry.name.clone(),
                    device_messages: kinds,
                }
            })
            .collect();
        Message::DeviceList { id, devices }
    }

    async fn route_device_command(&self, message: Message) -> Result<Message> {
        let index = device_index(&message)?;
        let adapter = lock_devices(&self.devices)
            .get(&index)
            .map(|entry| Arc::clone(&entry.adapter))
            .ok_or(ServerError::DeviceNotFound(index))?;

        dispatch::check_device_preconditions(adapter.as_ref(), &message)?;
        Ok(adapter.handle_message(&message).await?)
    }
}

fn device_index(message: &Message) -> Result<u32> {
    match message {
        Message::VibrateCmd { device_index, .. }
        | Message::SingleMotorVibrateCmd { device_index, .. }
        | Message::StopDeviceCmd { device_index, .. } => Ok(*device_index),
        other => Err(ServerError::UnhandledMessage(other.kind())),
    }
}

fn version_component(raw: &str) -> u32 {
    raw.parse().unwrap_or(0)
}

fn lock_devices(devices: &DeviceMap) -> std::sync::MutexGuard<'_, HashMap<u32, DeviceEntry>> {
    // Never held across an await; recover from a poisoned lock rather than
    // wedging the session.
    devices.lock().unwrap_or_else(PoisonError::into_inner)
}

/// On the transport's removal notification, drop the registry entry, cancel
/// the adapter's scope, and push a `DeviceRemoved` event.
fn spawn_registry_watcher(
    devices: DeviceMap,
    events: broadcast::Sender<Message>,
    index: u32,
    mut removed: broadcast::Receiver<()>,
) {
    tokio::spawn(async move {
        if removed.recv().await.is_ok() {
            let entry = devices
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&index);
            if let Some(entry) = entry {
                entry.adapter.teardown();
                info!(index, device = %entry.name, "device removed");
                let _ = events.send(Message::device_removed(index));
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_components_parse_from_build_metadata() {
        assert_eq!(version_component("0"), 0);
        assert_eq!(version_component("12"), 12);
        assert_eq!(version_component("not-a-number"), 0);
    }

    #[tokio::test]
    async fn default_session_starts_unhandshaked_and_quiet() {
        let server = Server::new(ServerConfig::default());
        assert!(matches!(server.state, HandshakeState::Unhandshaked));
        assert_eq!(server.log_level(), LogLevel::Off);
        assert!(server.managers.is_empty());
    }
}
