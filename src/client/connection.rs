use futures_util::{SinkExt, StreamExt};
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, Message},
};
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::error::{ClientError, Result};
use crate::protocol::{ClientInfo, ControlMessage, TOKEN_HEADER};

use super::kill_switch::DisconnectState;
use super::tunnel::TunnelSpawner;

/// Handle for queueing frames onto the control channel from any task
#[derive(Debug, Clone)]
pub struct ControlSender {
    tx: mpsc::Sender<Message>,
}

impl ControlSender {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    pub async fn send(&self, msg: &ControlMessage) -> Result<()> {
        self.send_raw(msg.to_ws()?).await
    }

    async fn send_raw(&self, msg: Message) -> Result<()> {
        self.tx.send(msg).await.map_err(|_| {
            ClientError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "control channel writer has stopped",
            ))
        })
    }
}

/// One control channel connection, from handshake to the first receive error.
pub struct ControlSession<'a> {
    settings: &'a Settings,
    disconnect: DisconnectState,
}

impl<'a> ControlSession<'a> {
    pub fn new(settings: &'a Settings, disconnect: DisconnectState) -> Self {
        Self {
            settings,
            disconnect,
        }
    }

    /// Run the session. It only ever ends in an error.
    pub async fn run(&self) -> ClientError {
        match self.connect_and_run().await {
            Ok(never) => match never {},
            Err(e) => e,
        }
    }

    async fn connect_and_run(&self) -> Result<Infallible> {
        let url = self.settings.control_url()?;
        info!("Connecting to {}...", url);

        let mut request = url.as_str().into_client_request()?;
        request
            .headers_mut()
            .insert(TOKEN_HEADER, self.settings.token_header()?);

        let (ws_stream, _) = connect_async(request).await.map_err(|e| {
            let e = ClientError::from_handshake(e);
            error!("Failed to connect to server ({}): {}", self.settings.server_addr, e);
            e
        })?;
        info!("Connected to server ({})", self.settings.server_addr);

        let (mut write, mut read) = ws_stream.split();

        let report = ControlMessage::Report(ClientInfo::current());
        if let Err(e) = write.send(report.to_ws()?).await {
            error!("Failed to send client report to {}: {}", self.settings.server_addr, e);
            return Err(e.into());
        }

        let (control, mut control_rx) = ControlSender::channel(256);

        // Tunnels hold clones of `control`; this task owns the write half
        let writer = tokio::spawn(async move {
            while let Some(msg) = control_rx.recv().await {
                if let Err(e) = write.send(msg).await {
                    debug!("Control channel send error: {}", e);
                    break;
                }
            }
        });

        let spawner = TunnelSpawner::new(
            &self.settings.local_addr,
            self.disconnect.clone(),
            control.clone(),
        );

        let result = loop {
            let msg = match read.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    error!("Failed to receive from server ({}): {}", self.settings.server_addr, e);
                    break ClientError::from(e);
                }
                None => {
                    error!("Control channel to {} ended", self.settings.server_addr);
                    break ClientError::StreamClosed(None);
                }
            };

            match msg {
                Message::Text(text) => self.dispatch(text.as_bytes(), &spawner),
                Message::Binary(data) => self.dispatch(&data, &spawner),
                Message::Ping(data) => {
                    debug!("Received ping, sending pong");
                    let _ = control.send_raw(Message::Pong(data)).await;
                }
                Message::Pong(_) => {
                    debug!("Received pong");
                }
                Message::Close(frame) => {
                    let reason = frame.map(|f| f.reason.to_string());
                    info!("Server closed connection: {:?}", reason);
                    break ClientError::StreamClosed(reason);
                }
                Message::Frame(_) => {}
            }
        };

        writer.abort();
        Err(result)
    }

    fn dispatch(&self, raw: &[u8], spawner: &TunnelSpawner) {
        let msg = match ControlMessage::decode(raw) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Ignoring undecodable message from server: {}", e);
                return;
            }
        };

        match msg {
            ControlMessage::Connect(target) => {
                info!("Server requested a new tunnel to {}", target);
                spawner.spawn(target);
            }
            ControlMessage::WanAddr(addr) => {
                info!("Public address allocated by server: {}", addr);
            }
            ControlMessage::Report(info) => {
                debug!("Server acknowledged client report ({})", info.version);
            }
            ControlMessage::Disconnect | ControlMessage::Unknown { .. } => {
                warn!(
                    "Message '{}' is not supported by this client version, please upgrade",
                    msg.kind()
                );
            }
        }
    }
}
