//! [`PrivOps`] backed by the `hil-vpn-privop` helper
//!
//! One helper process per operation, started through a privilege-escalation
//! program (sudo by default). Arguments are passed as discrete argv entries;
//! no shell is ever involved.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

use hil_vpn_proto::{Vlan, VpnName};

use crate::privops::{checked_name, PrivOp, PrivOps, PrivOpsError};

/// Default install location of the helper
pub const DEFAULT_HELPER_PATH: &str = "/usr/local/bin/hil-vpn-privop";
/// Default privilege-escalation program
pub const DEFAULT_SUDO_PATH: &str = "/usr/bin/sudo";

/// Runs the privileged helper as a subprocess
#[derive(Debug, Clone)]
pub struct PrivOpsCmd {
    /// Escalation program; `None` runs the helper directly
    sudo: Option<PathBuf>,
    helper: PathBuf,
}

impl PrivOpsCmd {
    /// Invoke `helper` through `sudo -n`
    pub fn new(sudo: impl Into<PathBuf>, helper: impl Into<PathBuf>) -> Self {
        Self {
            sudo: Some(sudo.into()),
            helper: helper.into(),
        }
    }

    /// Invoke `helper` directly, e.g. when it is installed setuid
    pub fn direct(helper: impl Into<PathBuf>) -> Self {
        Self {
            sudo: None,
            helper: helper.into(),
        }
    }

    fn command(&self, op: PrivOp) -> Command {
        let mut cmd = match &self.sudo {
            Some(sudo) => {
                let mut cmd = Command::new(sudo);
                // Never prompt: a missing sudoers rule is a failure, not a hang.
                cmd.arg("-n").arg(&self.helper);
                cmd
            }
            None => Command::new(&self.helper),
        };
        cmd.arg(op.as_str())
            .env_clear()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    /// Run one helper invocation, returning its stdout
    async fn run(&self, op: PrivOp, args: &[&str]) -> Result<String, PrivOpsError> {
        let mut cmd = self.command(op);
        cmd.args(args);

        debug!(op = %op, ?args, helper = %self.helper.display(), "Invoking privileged helper");

        let output = cmd
            .output()
            .await
            .map_err(|source| PrivOpsError::Spawn { op, source })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(op = %op, status = %output.status, %stderr, "Privileged helper failed");
            return Err(PrivOpsError::Failed {
                op,
                status: output.status.to_string(),
                stderr,
            });
        }

        String::from_utf8(output.stdout).map_err(|_| PrivOpsError::InvalidOutput { op })
    }
}

impl Default for PrivOpsCmd {
    fn default() -> Self {
        Self::new(DEFAULT_SUDO_PATH, DEFAULT_HELPER_PATH)
    }
}

#[async_trait]
impl PrivOps for PrivOpsCmd {
    async fn create_vpn(
        &self,
        name: &VpnName,
        vlan: Vlan,
        port: u16,
    ) -> Result<String, PrivOpsError> {
        let name = checked_name(name)?;
        let vlan = vlan.to_string();
        let port = port.to_string();
        self.run(PrivOp::Create, &[name, &vlan, &port]).await
    }

    async fn start_vpn(&self, name: &VpnName) -> Result<(), PrivOpsError> {
        let name = checked_name(name)?;
        self.run(PrivOp::Start, &[name]).await.map(drop)
    }

    async fn stop_vpn(&self, name: &VpnName) -> Result<(), PrivOpsError> {
        let name = checked_name(name)?;
        self.run(PrivOp::Stop, &[name]).await.map(drop)
    }

    async fn delete_vpn(&self, name: &VpnName) -> Result<(), PrivOpsError> {
        let name = checked_name(name)?;
        self.run(PrivOp::Delete, &[name]).await.map(drop)
    }

    async fn list_vpns(&self) -> Result<Vec<String>, PrivOpsError> {
        let stdout = self.run(PrivOp::List, &[]).await?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}
