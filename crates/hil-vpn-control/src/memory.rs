//! In-process [`PrivOps`] that touches nothing on the host
//!
//! Used by `hil-vpnd --dry-run` and by the test suites. It holds itself to the
//! same rules as the real helper: names must pass strict validation, a name
//! or a port can only be provisioned once, and a running vpn cannot be
//! deleted. A failure can be injected for the next call of any operation.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use hil_vpn_proto::{Vlan, VpnName};

use crate::privops::{checked_name, PrivOp, PrivOps, PrivOpsError};

/// A vpn as the in-memory backend sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryVpn {
    pub vlan: u16,
    pub port: u16,
    /// Stand-in for the OpenVPN static key
    pub key: String,
    pub running: bool,
}

#[derive(Default)]
pub struct InMemoryPrivOps {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    vpns: HashMap<String, MemoryVpn>,
    fail_next: HashSet<PrivOp>,
}

impl InMemoryPrivOps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of `op` fail without changing any state
    pub fn fail_next(&self, op: PrivOp) {
        self.lock().fail_next.insert(op);
    }

    pub fn vpn(&self, name: &str) -> Option<MemoryVpn> {
        self.lock().vpns.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.lock().vpns.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().vpns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().vpns.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the lock for one operation, consuming an injected failure if set
    fn begin(&self, op: PrivOp) -> Result<MutexGuard<'_, MemoryState>, PrivOpsError> {
        let mut state = self.lock();
        if state.fail_next.remove(&op) {
            debug!(op = %op, "Injected privileged operation failure");
            return Err(PrivOpsError::Failed {
                op,
                status: "exit status: 1".to_string(),
                stderr: "injected failure".to_string(),
            });
        }
        Ok(state)
    }
}

fn refused(op: PrivOp, reason: impl Into<String>) -> PrivOpsError {
    PrivOpsError::Refused {
        op,
        reason: reason.into(),
    }
}

fn generate_key() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

#[async_trait]
impl PrivOps for InMemoryPrivOps {
    async fn create_vpn(
        &self,
        name: &VpnName,
        vlan: Vlan,
        port: u16,
    ) -> Result<String, PrivOpsError> {
        let op = PrivOp::Create;
        let name = checked_name(name)?;
        let mut state = self.begin(op)?;

        if state.vpns.contains_key(name) {
            return Err(refused(op, format!("vpn {} already exists", name)));
        }
        if let Some((other, _)) = state.vpns.iter().find(|(_, vpn)| vpn.port == port) {
            return Err(refused(
                op,
                format!("port {} is already used by vpn {}", port, other),
            ));
        }

        let key = generate_key();
        state.vpns.insert(
            name.to_string(),
            MemoryVpn {
                vlan: vlan.get(),
                port,
                key: key.clone(),
                running: false,
            },
        );
        Ok(key)
    }

    async fn start_vpn(&self, name: &VpnName) -> Result<(), PrivOpsError> {
        let op = PrivOp::Start;
        let name = checked_name(name)?;
        let mut state = self.begin(op)?;

        let vpn = state
            .vpns
            .get_mut(name)
            .ok_or_else(|| refused(op, format!("no such vpn {}", name)))?;
        if vpn.running {
            return Err(refused(op, format!("vpn {} is already running", name)));
        }
        vpn.running = true;
        Ok(())
    }

    async fn stop_vpn(&self, name: &VpnName) -> Result<(), PrivOpsError> {
        let op = PrivOp::Stop;
        let name = checked_name(name)?;
        let mut state = self.begin(op)?;

        let vpn = state
            .vpns
            .get_mut(name)
            .ok_or_else(|| refused(op, format!("no such vpn {}", name)))?;
        if !vpn.running {
            return Err(refused(op, format!("vpn {} is not running", name)));
        }
        vpn.running = false;
        Ok(())
    }

    async fn delete_vpn(&self, name: &VpnName) -> Result<(), PrivOpsError> {
        let op = PrivOp::Delete;
        let name = checked_name(name)?;
        let mut state = self.begin(op)?;

        match state.vpns.get(name) {
            None => Err(refused(op, format!("no such vpn {}", name))),
            Some(vpn) if vpn.running => Err(refused(
                op,
                format!("cannot delete vpn {}; it is still running", name),
            )),
            Some(_) => {
                state.vpns.remove(name);
                Ok(())
            }
        }
    }

    async fn list_vpns(&self) -> Result<Vec<String>, PrivOpsError> {
        let state = self.begin(PrivOp::List)?;
        Ok(state.vpns.keys().cloned().collect())
    }
}
