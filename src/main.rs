//! hil-vpnd: the unprivileged HIL VPN daemon
//!
//! Serves the REST API that creates and deletes vpns. Everything that needs
//! root is delegated to `hil-vpn-privop`, run through sudo.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hil_vpn_api::{ApiServer, ApiServerConfig};
use hil_vpn_control::{
    privops_cmd::{DEFAULT_HELPER_PATH, DEFAULT_SUDO_PATH},
    InMemoryPrivOps, PortRange, PrivOps, PrivOpsCmd, VpnManager,
};

/// HIL VPN daemon
#[derive(Parser, Debug)]
#[command(name = "hil-vpnd")]
#[command(about = "Provision OpenVPN endpoints onto HIL networks", long_about = None)]
#[command(version = env!("GIT_TAG"))]
#[command(long_version = concat!(env!("GIT_TAG"), "\nCommit: ", env!("GIT_HASH"), "\nBuilt: ", env!("BUILD_TIME")))]
struct Cli {
    /// Lowest port that may be given to a vpn
    #[arg(long, env = "MIN_VPN_PORT")]
    min_port: u32,

    /// Highest port that may be given to a vpn
    #[arg(long, env = "MAX_VPN_PORT")]
    max_port: u32,

    /// REST API bind address
    #[arg(long, env = "HIL_VPND_LISTEN", default_value = "0.0.0.0:8080")]
    listen: SocketAddr,

    /// Path of the privileged helper
    #[arg(long, env = "HIL_VPN_PRIVOP", default_value = DEFAULT_HELPER_PATH)]
    privop: PathBuf,

    /// Privilege-escalation program the helper is run through
    #[arg(long, env = "HIL_VPN_SUDO", default_value = DEFAULT_SUDO_PATH)]
    sudo: PathBuf,

    /// Run the helper directly instead of through sudo
    #[arg(long)]
    no_sudo: bool,

    /// Keep all vpns in memory; nothing on the host is touched
    #[arg(long)]
    dry_run: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Setup logging with the specified log level
fn setup_logging(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();
}

fn privops_backend(cli: &Cli) -> Arc<dyn PrivOps> {
    if cli.dry_run {
        warn!("Dry run: vpns are kept in memory only and nothing is provisioned");
        return Arc::new(InMemoryPrivOps::new());
    }
    if cli.no_sudo {
        info!("Privileged helper: {}", cli.privop.display());
        Arc::new(PrivOpsCmd::direct(&cli.privop))
    } else {
        info!(
            "Privileged helper: {} (via {})",
            cli.privop.display(),
            cli.sudo.display()
        );
        Arc::new(PrivOpsCmd::new(&cli.sudo, &cli.privop))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli.log_level);

    info!("hil-vpnd starting...");

    let range = PortRange::new(cli.min_port, cli.max_port)
        .context("invalid MIN_VPN_PORT/MAX_VPN_PORT")?;
    info!("Port range: {}-{}", range.min(), range.max());

    let privops = privops_backend(&cli);
    let manager = VpnManager::recover(range, privops)
        .await
        .context("listing existing vpns")?;

    let summary = manager.summary();
    info!(
        used = summary.used,
        free = summary.free,
        "Recovered {} existing vpn(s)",
        summary.used
    );

    let server = ApiServer::new(
        ApiServerConfig {
            bind_addr: cli.listen,
        },
        Arc::new(manager),
    );
    let mut api_handle = tokio::spawn(server.start());

    info!("API listening on {} (OpenAPI at /openapi.json)", cli.listen);

    tokio::select! {
        result = signal::ctrl_c() => {
            match result {
                Ok(()) => info!("Shutdown signal received, stopping..."),
                Err(err) => error!("Error listening for shutdown signal: {}", err),
            }
            api_handle.abort();
        }
        result = &mut api_handle => {
            match result {
                Ok(Ok(())) => info!("API server exited"),
                Ok(Err(e)) => return Err(e.context("API server failed")),
                Err(e) => return Err(anyhow::anyhow!("API server task failed: {}", e)),
            }
        }
    }

    Ok(())
}
