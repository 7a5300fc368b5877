//! `refresh-em-all` host binary.
//!
//! Binds the WebSocket server, waits for the extension, and serves refresh
//! requests until Ctrl+C. A dropped extension connection, or a client that
//! fails the handshake, is followed by a fresh bind on the same port. Only
//! bind failures are fatal.
//!
//! ```text
//! refresh-em-all [--port 9226] [--config path.json] [--debug]
//! refresh-em-all --stress [--iterations 50]
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use refresh_em_all::stress::{DEFAULT_ITERATIONS, DEFAULT_PAUSE};
use refresh_em_all::{
    Connection, Host, PendingServer, RefreshConfig, RemoteInfo, Result, run_stress,
};

// ============================================================================
// Constants
// ============================================================================

/// Default port the extension connects to.
const DEFAULT_PORT: u16 = 9226;

/// Config file name under the user config directory.
const CONFIG_FILE: &str = "refresh-em-all/config.json";

// ============================================================================
// Cli
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "refresh-em-all",
    about = "Reload every open browser tab, in paced batches with retries",
    version,
    long_about = None
)]
struct Cli {
    /// Port to listen on for the extension
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Path to a JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Run back-to-back refreshes once the extension connects, then exit
    #[arg(long)]
    stress: bool,

    /// Number of stress runs
    #[arg(long, default_value_t = DEFAULT_ITERATIONS)]
    iterations: u32,
}

// ============================================================================
// Setup
// ============================================================================

fn init_logging(debug: bool) {
    let default = if debug {
        "refresh_em_all=debug"
    } else {
        "refresh_em_all=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(explicit: Option<PathBuf>) -> Result<RefreshConfig> {
    if let Some(path) = explicit {
        info!(path = %path.display(), "Loading config");
        return RefreshConfig::from_file(path);
    }

    match dirs::config_dir().map(|dir| dir.join(CONFIG_FILE)) {
        Some(path) if path.is_file() => {
            info!(path = %path.display(), "Loading config");
            RefreshConfig::from_file(path)
        }
        _ => Ok(RefreshConfig::default()),
    }
}

/// Waits for one extension to connect and complete its handshake.
///
/// A failed upgrade or handshake is logged and yields `None`.
async fn accept_extension(server: PendingServer) -> Option<(Connection, RemoteInfo)> {
    match server.accept().await {
        Ok(accepted) => Some(accepted),
        Err(e) => {
            warn!(error = %e, "Client failed to connect, waiting for the extension");
            None
        }
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug);

    if let Err(e) = run(cli).await {
        error!(error = %e, "Fatal error");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config)?;
    config.validate()?;

    loop {
        let server = PendingServer::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), cli.port)
            .await?
            .with_accept_timeout(None);
        info!(url = %server.ws_url(), "Waiting for extension");

        let accepted = tokio::select! {
            accepted = accept_extension(server) => accepted,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                return Ok(());
            }
        };
        let Some((connection, remote)) = accepted else {
            continue;
        };

        let host = Host::new(connection.clone(), remote, config.clone())?;

        if cli.stress {
            let controller = host.controller().clone();
            let serving = tokio::spawn(host.run());

            let report = run_stress(&controller, cli.iterations, DEFAULT_PAUSE).await;
            info!(
                completed = report.completed,
                stopped_early = report.stopped_early,
                "Stress run finished"
            );

            connection.shutdown();
            let _ = serving.await;
            return Ok(());
        }

        tokio::select! {
            () = host.run() => {
                warn!("Extension connection lost, rebinding");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                connection.shutdown();
                return Ok(());
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
