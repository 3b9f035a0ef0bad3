//! Remote kill switch.
//!
//! The server can mark a token as disconnected. The client learns about it
//! by polling the status backend; while the flag is set no new tunnels are
//! opened, but the control channel stays up.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::backend::StatusBackend;

/// Owning side of the disconnect flag. Not `Clone`: there is exactly one writer.
#[derive(Debug)]
pub struct DisconnectFlag {
    tx: watch::Sender<bool>,
}

/// Read handle for the disconnect flag
#[derive(Debug, Clone)]
pub struct DisconnectState {
    rx: watch::Receiver<bool>,
}

impl DisconnectFlag {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn set(&self, disconnected: bool) {
        let previous = self.tx.send_replace(disconnected);
        if previous != disconnected {
            info!("Disconnect flag changed: {} -> {}", previous, disconnected);
        }
    }

    pub fn subscribe(&self) -> DisconnectState {
        DisconnectState {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for DisconnectFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl DisconnectState {
    pub fn is_set(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Periodically refreshes the disconnect flag from the backend
pub struct StatusPoller {
    backend: Arc<dyn StatusBackend>,
    token: String,
    interval: Duration,
    flag: DisconnectFlag,
}

impl StatusPoller {
    pub fn new(
        backend: Arc<dyn StatusBackend>,
        token: &str,
        interval: Duration,
        flag: DisconnectFlag,
    ) -> Self {
        Self {
            backend,
            token: token.to_string(),
            interval,
            flag,
        }
    }

    /// Query once. A failed query leaves the flag untouched.
    pub async fn poll_once(&self) {
        match self.backend.connection_status(&self.token).await {
            Ok(disconnected) => {
                debug!("Server reports token disconnected: {}", disconnected);
                self.flag.set(disconnected);
            }
            Err(e) => {
                warn!("Failed to query connection status: {}", e);
            }
        }
    }

    /// Poll forever: query immediately, then once per interval.
    pub async fn run(self) {
        loop {
            self.poll_once().await;
            tokio::time::sleep(self.interval).await;
        }
    }
}
