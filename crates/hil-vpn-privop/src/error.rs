use std::path::PathBuf;
use thiserror::Error;

use hil_vpn_proto::{NameError, ValidationError};

use crate::lock::LockError;
use crate::resolver::ResolveError;

#[derive(Debug, Error)]
pub enum HelperError {
    #[error(transparent)]
    InvalidName(#[from] NameError),

    #[error(transparent)]
    InvalidArgument(#[from] ValidationError),

    #[error("port {port} does not match vpn name {name}")]
    PortMismatch { name: String, port: u16 },

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("running {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} exited with {status}: {stderr}", .program.display())]
    CommandFailed {
        program: PathBuf,
        status: String,
        stderr: String,
    },

    #[error("openvpn produced a key that is not UTF-8")]
    InvalidKey,

    #[error("no such vpn {0}")]
    NoSuchVpn(String),

    #[error("port {port} is already used by vpn {other}")]
    PortInUse { port: u16, other: String },

    #[error("cannot delete vpn {0}; it is still running")]
    StillRunning(String),

    #[error("{action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
