use std::sync::Arc;
use tokio::task::AbortHandle;
use tracing::{error, info, warn};

use crate::backend::StatusBackend;
use crate::config::Settings;
use crate::error::{ClientError, Result};

use super::announcement::check_announcement;
use super::connection::ControlSession;
use super::kill_switch::{DisconnectFlag, DisconnectState, StatusPoller};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Keep a control session up until the token is rejected
    Persistent,
    /// Ask the server to accept tunnels for this token again, then exit
    Connect,
    /// Ask the server to stop issuing tunnels for this token, then exit
    Disconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Fatal,
    Transient,
}

impl Failure {
    /// Matched on the error text: the server reports a bad token only in
    /// the close reason or the refused handshake body.
    pub fn classify(err: &ClientError, fatal_signature: &str) -> Self {
        if !fatal_signature.is_empty() && err.to_string().contains(fatal_signature) {
            Failure::Fatal
        } else {
            Failure::Transient
        }
    }
}

/// Stops the background pollers once the supervisor returns or is dropped
struct AbortOnDrop(Vec<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

pub struct Supervisor {
    settings: Settings,
    backend: Arc<dyn StatusBackend>,
}

impl Supervisor {
    pub fn new(settings: Settings, backend: Arc<dyn StatusBackend>) -> Self {
        Self { settings, backend }
    }

    pub async fn start(&self, mode: Mode) -> Result<()> {
        if let Err(e) = self.settings.validate() {
            error!("{}", e);
            return Err(e);
        }

        match mode {
            Mode::Connect => self.set_disconnected(false).await,
            Mode::Disconnect => self.set_disconnected(true).await,
            Mode::Persistent => {
                let flag = DisconnectFlag::new();
                let state = flag.subscribe();

                let poller = StatusPoller::new(
                    self.backend.clone(),
                    &self.settings.token,
                    self.settings.status_interval,
                    flag,
                );
                let _background = AbortOnDrop(vec![
                    tokio::spawn(poller.run()).abort_handle(),
                    tokio::spawn(check_announcement(self.backend.clone())).abort_handle(),
                ]);

                self.run_sessions(state).await
            }
        }
    }

    async fn set_disconnected(&self, disconnected: bool) -> Result<()> {
        let result = self
            .backend
            .set_disconnected(&self.settings.token, disconnected)
            .await;

        match &result {
            Ok(()) if disconnected => info!("Server will no longer open tunnels for this client"),
            Ok(()) => info!("Server will open tunnels for this client again"),
            Err(e) => error!("Failed to update connection status: {}", e),
        }
        result
    }

    async fn run_sessions(&self, state: DisconnectState) -> Result<()> {
        loop {
            let err = ControlSession::new(&self.settings, state.clone()).run().await;

            match Failure::classify(&err, &self.settings.fatal_signature) {
                Failure::Fatal => {
                    error!("Server rejected the token: {}", err);
                    error!(
                        "Check that the token is correct: pass --token, set RTUN_TOKEN, \
                         or run `rtun login` to store it in the config file"
                    );
                    return Err(err);
                }
                Failure::Transient => {
                    warn!(
                        "Control session ended: {}. Reconnecting in {:?}...",
                        err, self.settings.retry_delay
                    );
                    tokio::time::sleep(self.settings.retry_delay).await;
                }
            }
        }
    }
}
