//! rtun Tunnel Client
//!
//! Exposes a service on a private network through a public relay server,
//! without inbound firewall rules on this side.
//!
//! The client keeps a control channel open to the relay. Whenever the relay
//! asks for a new connection, the client dials the address it was given and
//! bridges it to the local service.
//!
//! The client authenticates using a token issued by the relay operator.

#![deny(clippy::correctness)]
#![warn(clippy::suspicious)]
#![warn(clippy::style)]
#![warn(clippy::complexity)]
#![warn(clippy::perf)]

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod backend;
mod client;
mod config;
mod error;
mod protocol;

use backend::HttpBackend;
use client::{Mode, Supervisor};
use config::{
    default_api_url, Config, Settings, DEFAULT_FATAL_SIGNATURE, DEFAULT_LOCAL_ADDR,
    DEFAULT_RETRY_DELAY, DEFAULT_SERVER_ADDR, DEFAULT_STATUS_INTERVAL,
};

#[derive(Parser, Debug)]
#[command(name = "rtun")]
#[command(author, version, about = "Reach a private service through a public relay")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Relay server address (host:port)
    #[arg(short, long, global = true, env = "RTUN_SERVER")]
    server: Option<String>,

    /// Token for authentication
    #[arg(short = 'k', long, global = true, env = "RTUN_TOKEN")]
    token: Option<String>,

    /// Base URL of the status API (defaults to https://<server host>)
    #[arg(long, global = true, env = "RTUN_API")]
    api: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Keep a control channel open and serve tunnels (default)
    Start(StartArgs),

    /// Ask the server to open tunnels for this client again, then exit
    Connect,

    /// Ask the server to stop opening tunnels for this client, then exit
    Disconnect,

    /// Save your token to the config file
    Login,
}

#[derive(Parser, Debug, Default)]
struct StartArgs {
    /// Local address to forward tunnels to
    #[arg(short, long)]
    local: Option<String>,

    /// Encrypt the control channel (overrides the config file)
    #[arg(long, conflicts_with = "no_tls")]
    tls: bool,

    /// Use a plain (unencrypted) control channel
    #[arg(long)]
    no_tls: bool,

    /// Seconds to wait before reconnecting after a lost session
    #[arg(long)]
    retry_delay_secs: Option<u64>,

    /// Seconds between kill switch status checks
    #[arg(long)]
    status_interval_secs: Option<u64>,

    /// Error text that means the token was rejected
    #[arg(long)]
    fatal_signature: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load().unwrap_or_else(|e| {
        warn!("Ignoring config file: {:#}", e);
        Config::default()
    });

    // Resolve server from CLI > config > default
    let server = cli
        .server
        .clone()
        .or(config.auth.server.clone())
        .unwrap_or_else(|| DEFAULT_SERVER_ADDR.to_string());

    let (mode, args) = match cli.command {
        Some(Commands::Login) => return run_login(&server),
        Some(Commands::Start(args)) => (Mode::Persistent, args),
        Some(Commands::Connect) => (Mode::Connect, StartArgs::default()),
        Some(Commands::Disconnect) => (Mode::Disconnect, StartArgs::default()),
        None => (Mode::Persistent, StartArgs::default()),
    };

    let token = cli
        .token
        .or(config.auth.token.clone())
        .unwrap_or_default();

    let mut settings = Settings::new(&server, &token);
    settings.local_addr = args
        .local
        .clone()
        .or(config.client.local.clone())
        .unwrap_or_else(|| DEFAULT_LOCAL_ADDR.to_string());
    settings.tls = resolve_tls(&args, config.client.tls);
    settings.api_url = cli
        .api
        .or(config.auth.api.clone())
        .unwrap_or_else(|| default_api_url(&server));
    settings.retry_delay = args
        .retry_delay_secs
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_DELAY);
    settings.status_interval = args
        .status_interval_secs
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_STATUS_INTERVAL);
    settings.fatal_signature = args
        .fatal_signature
        .unwrap_or_else(|| DEFAULT_FATAL_SIGNATURE.to_string());

    let backend = Arc::new(HttpBackend::new(&settings.api_url)?);
    let supervisor = Supervisor::new(settings, backend);
    supervisor.start(mode).await?;

    Ok(())
}

/// CLI flag > config file > on
fn resolve_tls(args: &StartArgs, config_tls: Option<bool>) -> bool {
    if args.tls {
        true
    } else if args.no_tls {
        false
    } else {
        config_tls.unwrap_or(true)
    }
}

fn run_login(server: &str) -> Result<()> {
    println!("Paste the token issued for this client by the operator of {}.", server);
    println!();

    print!("Token: ");
    use std::io::{self, Write};
    io::stdout().flush()?;

    let mut token = String::new();
    io::stdin().read_line(&mut token)?;
    let token = token.trim().to_string();

    if token.is_empty() {
        anyhow::bail!("No token provided");
    }

    // Save to config
    let mut config = Config::load().unwrap_or_default();
    config.auth.token = Some(token);
    config.auth.server = Some(server.to_string());
    config.save()?;

    println!();
    println!(
        "Token saved to {:?}",
        Config::config_path().unwrap_or_default()
    );
    println!("You can now run: rtun start -l <local address>");

    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
