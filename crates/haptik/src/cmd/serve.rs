use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use haptik_device::{DeviceTransport, TransportError};
use haptik_proto::{ErrorCode, Message, EVENT_ID};
use haptik_server::{Server, ServerConfig};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tokio_util::codec::{Framed, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cmd::ServeArgs;
use crate::exit::{io_error, CliError, CliResult, FAILURE, SUCCESS};

pub async fn run(args: ServeArgs) -> CliResult<i32> {
    let listener = UnixListener::bind(&args.path).map_err(|err| io_error("bind failed", err))?;
    info!(path = %args.path.display(), "listening");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|err| io_error("accept failed", err))?;
                // One session per connection; nothing persists across
                // connections.
                if let Err(err) = serve_connection(stream, &args).await {
                    warn!(error = %err, "connection ended with error");
                }
            }
        }
    }

    let _ = std::fs::remove_file(&args.path);
    Ok(SUCCESS)
}

async fn serve_connection(stream: UnixStream, args: &ServeArgs) -> CliResult<()> {
    let mut server = Server::new(ServerConfig {
        server_name: args.name.clone(),
        ..Default::default()
    });
    for name in &args.demo_devices {
        server.add_device(name, Arc::new(TracingTransport::new(name.clone())));
    }
    run_session(server, stream).await
}

async fn run_session(mut server: Server, stream: UnixStream) -> CliResult<()> {
    let mut events = server.subscribe_events();
    let mut framed = Framed::new(stream, LinesCodec::new());
    let result = connection_loop(&mut server, &mut events, &mut framed).await;
    // Device scopes die with the session, even when the link failed.
    server.shutdown();
    info!("connection closed");
    result
}

async fn connection_loop(
    server: &mut Server,
    events: &mut broadcast::Receiver<Message>,
    framed: &mut Framed<UnixStream, LinesCodec>,
) -> CliResult<()> {
    loop {
        tokio::select! {
            line = framed.next() => {
                let Some(line) = line else { break };
                let line = line.map_err(|err| CliError::new(FAILURE, format!("read failed: {err}")))?;
                let reply = match serde_json::from_str::<Message>(&line) {
                    Ok(message) => server.submit(message).await,
                    Err(err) => {
                        debug!(error = %err, "undecodable message");
                        Message::error(
                            EVENT_ID,
                            ErrorCode::UnhandledMessage,
                            format!("could not decode message: {err}"),
                        )
                    }
                };
                send_message(framed, &reply).await?;
            }
            event = events.recv() => {
                if let Ok(event) = event {
                    send_message(framed, &event).await?;
                }
            }
        }
    }
    Ok(())
}

async fn send_message(
    framed: &mut Framed<UnixStream, LinesCodec>,
    message: &Message,
) -> CliResult<()> {
    let json = serde_json::to_string(message)
        .map_err(|err| CliError::new(FAILURE, format!("encode failed: {err}")))?;
    framed
        .send(json)
        .await
        .map_err(|err| CliError::new(FAILURE, format!("write failed: {err}")))
}

/// Demo transport: logs writes instead of driving hardware. Never reports
/// removal.
struct TracingTransport {
    device_name: String,
    removed_tx: broadcast::Sender<()>,
}

impl TracingTransport {
    fn new(device_name: String) -> Self {
        let (removed_tx, _) = broadcast::channel(1);
        Self {
            device_name,
            removed_tx,
        }
    }
}

#[async_trait]
impl DeviceTransport for TracingTransport {
    async fn write(&self, bytes: &[u8], cancel: &CancellationToken) -> Result<(), TransportError> {
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        info!(device = %self.device_name, bytes = ?bytes, "device write");
        Ok(())
    }

    fn subscribe_removed(&self) -> broadcast::Receiver<()> {
        self.removed_tx.subscribe()
    }
}
