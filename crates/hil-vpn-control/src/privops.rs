//! The privileged operations hil-vpnd needs performed on its behalf
//!
//! In production these are always carried out by the `hil-vpn-privop` helper
//! (see [`crate::PrivOpsCmd`]); the trait exists so the lifecycle logic can
//! be exercised against [`crate::InMemoryPrivOps`].

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

use hil_vpn_proto::{NameError, Vlan, VpnName};

/// One of the helper's subcommands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrivOp {
    Create,
    Start,
    Stop,
    Delete,
    List,
}

impl PrivOp {
    pub fn as_str(self) -> &'static str {
        match self {
            PrivOp::Create => "create",
            PrivOp::Start => "start",
            PrivOp::Stop => "stop",
            PrivOp::Delete => "delete",
            PrivOp::List => "list",
        }
    }
}

impl fmt::Display for PrivOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum PrivOpsError {
    #[error("refusing privileged operation: {0}")]
    InvalidName(#[from] NameError),

    #[error("failed to run privileged helper for `{op}`: {source}")]
    Spawn {
        op: PrivOp,
        #[source]
        source: std::io::Error,
    },

    #[error("privileged helper `{op}` failed ({status}): {stderr}")]
    Failed {
        op: PrivOp,
        status: String,
        stderr: String,
    },

    #[error("privileged helper `{op}` produced output that is not UTF-8")]
    InvalidOutput { op: PrivOp },

    #[error("privileged `{op}` refused: {reason}")]
    Refused { op: PrivOp, reason: String },
}

/// The privileged operations: create, start, stop, delete and list vpns.
///
/// Arguments are always validated values, never free-form request text.
/// Implementations re-check the name with [`checked_name`] before use.
#[async_trait]
pub trait PrivOps: Send + Sync {
    /// Generate a key and configuration for a vpn, returning the key
    async fn create_vpn(&self, name: &VpnName, vlan: Vlan, port: u16)
        -> Result<String, PrivOpsError>;

    async fn start_vpn(&self, name: &VpnName) -> Result<(), PrivOpsError>;

    async fn stop_vpn(&self, name: &VpnName) -> Result<(), PrivOpsError>;

    /// Remove a stopped vpn's key and configuration
    async fn delete_vpn(&self, name: &VpnName) -> Result<(), PrivOpsError>;

    /// Names of the vpns that exist on this host
    async fn list_vpns(&self) -> Result<Vec<String>, PrivOpsError>;
}

/// Re-validate a name against the strict grammar before it crosses the
/// privilege boundary.
pub fn checked_name(name: &VpnName) -> Result<&str, PrivOpsError> {
    let reparsed = VpnName::parse(name.as_str())?;
    if reparsed != *name {
        return Err(NameError::InvalidName(name.to_string()).into());
    }
    Ok(name.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hil_vpn_proto::UniqueId;

    #[test]
    fn test_checked_name_accepts_encoded_names() {
        let name = VpnName::new(UniqueId::generate(), 5000);
        assert_eq!(checked_name(&name).unwrap(), name.as_str());
    }

    #[test]
    fn test_op_names_match_helper_subcommands() {
        let ops = [
            (PrivOp::Create, "create"),
            (PrivOp::Start, "start"),
            (PrivOp::Stop, "stop"),
            (PrivOp::Delete, "delete"),
            (PrivOp::List, "list"),
        ];
        for (op, expected) in ops {
            assert_eq!(op.to_string(), expected);
        }
    }
}
