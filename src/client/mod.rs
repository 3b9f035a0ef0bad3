//! Tunnel client implementation.
//!
//! This module provides the client's session engine:
//! - [`Supervisor`] - runs control sessions and decides when to reconnect
//! - `ControlSession` - one control channel connection and its dispatch loop
//! - `TunnelSpawner` - per-directive data-plane tunnels
//! - `StatusPoller` - keeps the remote kill switch up to date

mod announcement;
mod connection;
mod kill_switch;
mod supervisor;
#[cfg(test)]
mod testing;
mod tunnel;

pub use supervisor::{Mode, Supervisor};
