use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{ClientError, Result};
use crate::protocol::ControlMessage;

use super::connection::ControlSender;
use super::kill_switch::DisconnectState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelOutcome {
    /// Kill switch is on; the server was told to stop sending `Connect`
    Refused,
    /// Both sides were dialed and the bridge has ended
    Closed,
}

/// Opens one data-plane tunnel per `Connect` directive.
///
/// Each tunnel runs in its own task and owns both of its connections, so a
/// failing or slow tunnel never affects the control session or its siblings.
#[derive(Clone)]
pub struct TunnelSpawner {
    local_addr: Arc<str>,
    disconnect: DisconnectState,
    control: ControlSender,
}

impl TunnelSpawner {
    pub fn new(local_addr: &str, disconnect: DisconnectState, control: ControlSender) -> Self {
        Self {
            local_addr: Arc::from(local_addr),
            disconnect,
            control,
        }
    }

    /// Fire and forget: failures are logged inside the task.
    pub fn spawn(&self, target: String) -> JoinHandle<()> {
        let spawner = self.clone();
        tokio::spawn(async move {
            match spawner.open(&target).await {
                Ok(TunnelOutcome::Refused) => {
                    warn!("Server has disabled this client, refused tunnel to {}", target);
                }
                Ok(TunnelOutcome::Closed) => {
                    debug!("Tunnel {} <-> {} closed", target, spawner.local_addr);
                }
                Err(e) => {
                    error!("Tunnel to {} failed: {}", target, e);
                }
            }
        })
    }

    /// Run a single tunnel attempt to completion. No retries.
    pub async fn open(&self, target: &str) -> Result<TunnelOutcome> {
        if self.disconnect.is_set() {
            self.control.send(&ControlMessage::Disconnect).await?;
            return Ok(TunnelOutcome::Refused);
        }

        let remote = dial(target).await?;
        let local = dial(&self.local_addr).await?;
        info!("Tunnel open: {} <-> {}", target, self.local_addr);

        join(remote, local).await?;
        Ok(TunnelOutcome::Closed)
    }
}

async fn dial(addr: &str) -> Result<TcpStream> {
    TcpStream::connect(addr)
        .await
        .map_err(|source| ClientError::Dial {
            addr: addr.to_string(),
            source,
        })
}

/// Bridge two streams in both directions until either side closes or fails.
/// Both streams are dropped on return.
pub async fn join(a: TcpStream, b: TcpStream) -> std::io::Result<()> {
    let (mut a_read, mut a_write) = a.into_split();
    let (mut b_read, mut b_write) = b.into_split();

    tokio::select! {
        result = tokio::io::copy(&mut a_read, &mut b_write) => {
            let n = result?;
            debug!("Bridge: remote side finished after {} bytes", n);
        }
        result = tokio::io::copy(&mut b_read, &mut a_write) => {
            let n = result?;
            debug!("Bridge: local side finished after {} bytes", n);
        }
    }

    Ok(())
}
