//! hil-vpn-privop
//!
//! Usage:
//!
//!     hil-vpn-privop create <name> <vlan> <port>
//!     hil-vpn-privop start <name>
//!     hil-vpn-privop stop <name>
//!     hil-vpn-privop delete <name>
//!     hil-vpn-privop list
//!
//! `create` prints the generated static key and `list` prints one vpn name
//! per line; nothing else is ever written to stdout. Diagnostics go to
//! stderr and any failure exits non-zero.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::process::ExitCode;
use tracing::{debug, error};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hil_vpn_privop::{Helper, InstanceLock, Request, LOCK_PATH, SAFE_PATH};

#[derive(Parser, Debug)]
#[command(name = "hil-vpn-privop")]
#[command(about = "Privileged helper for hil-vpnd")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate the key and config for a vpn; prints the key
    Create {
        name: String,
        vlan: u16,
        port: u16,
    },
    /// Enable and start a vpn's service
    Start { name: String },
    /// Disable and stop a vpn's service
    Stop { name: String },
    /// Remove a stopped vpn's key and config
    Delete { name: String },
    /// Print the names of all vpns
    List,
}

impl Commands {
    fn into_request(self) -> Result<Request, hil_vpn_privop::HelperError> {
        match self {
            Commands::Create { name, vlan, port } => Request::create(&name, vlan, port),
            Commands::Start { name } => Request::start(&name),
            Commands::Stop { name } => Request::stop(&name),
            Commands::Delete { name } => Request::delete(&name),
            Commands::List => Ok(Request::List),
        }
    }
}

/// Log to stderr only. The filter is fixed: the caller's environment is not
/// consulted.
fn setup_logging() {
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_ansi(false),
        )
        .with(EnvFilter::new("info"))
        .init();
}

fn run(cli: Cli) -> Result<String> {
    let request = cli.command.into_request().context("invalid arguments")?;

    let lock = InstanceLock::acquire(LOCK_PATH)?;
    debug!(lock = %lock.path().display(), ?request, "Running request");

    let output = Helper::new().run(&request)?;
    drop(lock);
    Ok(output)
}

fn main() -> ExitCode {
    // Never search a caller-supplied PATH, even before anything is resolved.
    std::env::set_var("PATH", SAFE_PATH);

    let cli = Cli::parse();
    setup_logging();

    match run(cli) {
        Ok(output) => {
            let mut stdout = std::io::stdout().lock();
            if let Err(e) = stdout
                .write_all(output.as_bytes())
                .and_then(|()| stdout.flush())
            {
                error!(error = %e, "Writing output failed");
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
