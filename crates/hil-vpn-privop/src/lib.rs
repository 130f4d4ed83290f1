//! hil-vpn-privop: the privileged half of hil-vpn
//!
//! A short-lived helper run through sudo by `hil-vpnd`. It validates its
//! arguments, serializes itself host-wide, and then creates, starts, stops,
//! deletes or lists OpenVPN server instances under `/etc/openvpn/server`.

pub mod commands;
pub mod error;
pub mod lock;
pub mod openvpn;
pub mod request;
pub mod resolver;

pub use commands::{unit_name, Helper};
pub use error::HelperError;
pub use lock::{InstanceLock, LockError, LOCK_PATH};
pub use request::Request;
pub use resolver::{resolve, ResolveError, ALLOWED_DIRS, SAFE_PATH};
