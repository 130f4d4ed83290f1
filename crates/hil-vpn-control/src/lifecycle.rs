//! Create and delete flows for vpns
//!
//! Creating a vpn is a three step saga: allocate an identity and port,
//! provision the helper's key and config (`create`), then activate the
//! service (`start`). Each failure point has a fixed compensation:
//!
//! | failed step | compensation                                             |
//! |-------------|----------------------------------------------------------|
//! | allocate    | none                                                     |
//! | create      | release the identity, retire the port                    |
//! | start       | helper `delete`; on success release identity and return  |
//! |             | the port, otherwise release identity and retire the port |
//!
//! Deleting releases the identity first, then `stop` and `delete`; the port
//! returns to the pool only if both succeed.
//!
//! A port goes back into the free pool only once the helper has confirmed
//! that nothing on disk still refers to it. Anything less leaves the port
//! retired until the daemon is restarted and re-reads the helper's inventory.

use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use hil_vpn_proto::{UniqueId, ValidationError, Vlan, VpnName};

use crate::port_range::PortRange;
use crate::privops::{PrivOps, PrivOpsError};
use crate::states::{StatesSummary, VpnStates};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    InvalidVlan(#[from] ValidationError),

    #[error("there are no free port numbers; cannot allocate a new network")]
    NoFreePorts,

    #[error("no such vpn {0}")]
    NotFound(UniqueId),

    #[error("privileged `{step}` of vpn {name} failed: {source}")]
    Privileged {
        step: &'static str,
        name: VpnName,
        #[source]
        source: PrivOpsError,
    },
}

/// A vpn that was created and started
#[derive(Debug, Clone)]
pub struct CreatedVpn {
    pub id: UniqueId,
    pub port: u16,
    pub name: VpnName,
    /// Static key generated by the helper
    pub key: String,
}

/// The step of a create that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CreateFailure {
    /// Helper `create` failed; whatever it left on disk is unknown.
    Provision,
    /// Helper `create` succeeded, `start` did not.
    Activate,
}

/// Sequences allocation and privileged operations for vpn create and delete
pub struct VpnManager {
    states: VpnStates,
    privops: Arc<dyn PrivOps>,
}

impl VpnManager {
    pub fn new(states: VpnStates, privops: Arc<dyn PrivOps>) -> Self {
        Self { states, privops }
    }

    /// Build a manager whose bookkeeping reflects the vpns that already exist
    /// according to the privileged helper.
    pub async fn recover(
        range: PortRange,
        privops: Arc<dyn PrivOps>,
    ) -> Result<Self, PrivOpsError> {
        let names = privops.list_vpns().await?;
        let states = VpnStates::reconstruct(range, &names);
        Ok(Self::new(states, privops))
    }

    pub fn states(&self) -> &VpnStates {
        &self.states
    }

    pub fn summary(&self) -> StatesSummary {
        self.states.summary()
    }

    /// Create and start a new vpn on `vlan`
    pub async fn create_vpn(&self, vlan: u16) -> Result<CreatedVpn, LifecycleError> {
        // Nothing is allocated for a request known to be invalid.
        let vlan = Vlan::new(vlan)?;

        let (id, port) = self
            .states
            .allocate()
            .map_err(|_| LifecycleError::NoFreePorts)?;
        let name = VpnName::new(id, port);
        info!(vpn = %name, %vlan, port, "Creating vpn");

        let key = match self.privops.create_vpn(&name, vlan, port).await {
            Ok(key) => key,
            Err(source) => {
                self.roll_back_create(&name, CreateFailure::Provision).await;
                return Err(LifecycleError::Privileged {
                    step: "create",
                    name,
                    source,
                });
            }
        };

        if let Err(source) = self.privops.start_vpn(&name).await {
            self.roll_back_create(&name, CreateFailure::Activate).await;
            return Err(LifecycleError::Privileged {
                step: "start",
                name,
                source,
            });
        }

        info!(vpn = %name, %vlan, port, "Vpn created and started");
        Ok(CreatedVpn {
            id,
            port,
            name,
            key,
        })
    }

    /// Stop and delete the vpn with identity `id`
    pub async fn delete_vpn(&self, id: UniqueId) -> Result<(), LifecycleError> {
        let port = self
            .states
            .release(&id)
            .map_err(|_| LifecycleError::NotFound(id))?;
        let name = VpnName::new(id, port);
        info!(vpn = %name, port, "Deleting vpn");

        let teardown = match self.privops.stop_vpn(&name).await {
            Ok(()) => self
                .privops
                .delete_vpn(&name)
                .await
                .map_err(|source| ("delete", source)),
            Err(source) => Err(("stop", source)),
        };

        match teardown {
            Ok(()) => {
                self.states.return_port(port);
                info!(vpn = %name, port, "Vpn deleted");
                Ok(())
            }
            Err((step, source)) => {
                error!(
                    vpn = %name,
                    port,
                    step,
                    error = %source,
                    "Vpn teardown failed; its files may still exist, operator attention required"
                );
                self.states.retire_port(port);
                Err(LifecycleError::Privileged { step, name, source })
            }
        }
    }

    /// Undo a partially completed create
    async fn roll_back_create(&self, name: &VpnName, failure: CreateFailure) {
        let port_reusable = match failure {
            CreateFailure::Provision => false,
            CreateFailure::Activate => match self.privops.delete_vpn(name).await {
                Ok(()) => true,
                Err(e) => {
                    error!(
                        vpn = %name,
                        port = name.port(),
                        error = %e,
                        "Could not delete vpn after failed start; operator attention required"
                    );
                    false
                }
            },
        };

        if let Err(e) = self.states.release(&name.id()) {
            warn!(vpn = %name, error = %e, "Vpn vanished from bookkeeping during rollback");
            return;
        }
        if port_reusable {
            self.states.return_port(name.port());
        } else {
            self.states.retire_port(name.port());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryPrivOps;
    use crate::privops::PrivOp;

    fn manager(min: u32, max: u32) -> (VpnManager, Arc<InMemoryPrivOps>) {
        let ops = Arc::new(InMemoryPrivOps::new());
        let states = VpnStates::new(PortRange::new(min, max).unwrap());
        (VpnManager::new(states, ops.clone()), ops)
    }

    #[tokio::test]
    async fn test_create_success() {
        let (manager, ops) = manager(5000, 5009);
        let created = manager.create_vpn(232).await.unwrap();

        let vpn = ops.vpn(created.name.as_str()).unwrap();
        assert_eq!(vpn.key, created.key);
        assert_eq!(vpn.port, created.port);
        assert_eq!(vpn.vlan, 232);
        assert!(vpn.running);
        assert_eq!(manager.states().port_of(&created.id), Some(created.port));
    }

    #[tokio::test]
    async fn test_invalid_vlan_allocates_nothing() {
        let (manager, ops) = manager(5000, 5009);
        for vlan in [0, 4095, 4096, 10000] {
            assert!(matches!(
                manager.create_vpn(vlan).await,
                Err(LifecycleError::InvalidVlan(_))
            ));
        }
        assert!(ops.is_empty());
        assert_eq!(manager.summary().free, 10);
    }

    #[tokio::test]
    async fn test_pool_exhaustion() {
        let (manager, ops) = manager(5000, 5000);
        manager.create_vpn(1).await.unwrap();
        assert!(matches!(
            manager.create_vpn(1).await,
            Err(LifecycleError::NoFreePorts)
        ));
        assert_eq!(ops.len(), 1);
    }

    #[tokio::test]
    async fn test_create_failure_retires_port() {
        let (manager, ops) = manager(5000, 5001);
        ops.fail_next(PrivOp::Create);

        let err = manager.create_vpn(10).await.unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Privileged { step: "create", .. }
        ));

        let summary = manager.summary();
        assert_eq!(summary.used, 0);
        assert_eq!(summary.free, 1);
        assert_eq!(summary.retired, 1);

        // The retired port (5001) is never handed out again.
        let created = manager.create_vpn(10).await.unwrap();
        assert_eq!(created.port, 5000);
    }

    #[tokio::test]
    async fn test_start_failure_with_clean_rollback_returns_port() {
        let (manager, ops) = manager(5000, 5001);
        ops.fail_next(PrivOp::Start);

        let err = manager.create_vpn(10).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Privileged { step: "start", .. }));
        assert!(ops.is_empty());

        let summary = manager.summary();
        assert_eq!(summary.used, 0);
        assert_eq!(summary.free, 2);
        assert_eq!(summary.retired, 0);

        // LIFO: the port that was just returned is reused first.
        let created = manager.create_vpn(10).await.unwrap();
        assert_eq!(created.port, 5001);
    }

    #[tokio::test]
    async fn test_start_failure_with_failed_rollback_retires_port() {
        let (manager, ops) = manager(5000, 5001);
        ops.fail_next(PrivOp::Start);
        ops.fail_next(PrivOp::Delete);

        assert!(manager.create_vpn(10).await.is_err());

        // The orphaned config is still there, so its port must stay unused.
        assert_eq!(ops.len(), 1);
        let summary = manager.summary();
        assert_eq!(summary.used, 0);
        assert_eq!(summary.free, 1);
        assert_eq!(summary.retired, 1);

        let created = manager.create_vpn(10).await.unwrap();
        assert_eq!(created.port, 5000);
    }

    #[tokio::test]
    async fn test_delete_success_returns_port() {
        let (manager, ops) = manager(5000, 5009);
        let created = manager.create_vpn(232).await.unwrap();

        manager.delete_vpn(created.id).await.unwrap();
        assert!(ops.is_empty());
        assert_eq!(manager.states().port_of(&created.id), None);

        let again = manager.create_vpn(232).await.unwrap();
        assert_eq!(again.port, created.port);
        assert_ne!(again.id, created.id);
    }

    #[tokio::test]
    async fn test_delete_unknown_id() {
        let (manager, ops) = manager(5000, 5009);
        manager.create_vpn(232).await.unwrap();
        let before = manager.summary();

        let stranger = UniqueId::generate();
        assert!(matches!(
            manager.delete_vpn(stranger).await,
            Err(LifecycleError::NotFound(id)) if id == stranger
        ));
        assert_eq!(manager.summary(), before);
        assert_eq!(ops.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_failures_retire_port() {
        for failing in [PrivOp::Stop, PrivOp::Delete] {
            let (manager, ops) = manager(5000, 5000);
            let created = manager.create_vpn(232).await.unwrap();
            ops.fail_next(failing);

            assert!(matches!(
                manager.delete_vpn(created.id).await,
                Err(LifecycleError::Privileged { .. })
            ));

            // Identity is gone, the port is not reusable.
            assert_eq!(manager.states().port_of(&created.id), None);
            assert_eq!(manager.summary().retired, 1);
            assert!(matches!(
                manager.create_vpn(232).await,
                Err(LifecycleError::NoFreePorts)
            ));
            // A second delete of the same id is now an unknown id.
            assert!(matches!(
                manager.delete_vpn(created.id).await,
                Err(LifecycleError::NotFound(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_recover_from_inventory() {
        let ops = Arc::new(InMemoryPrivOps::new());
        let range = PortRange::new(5000, 5009).unwrap();

        let first = VpnManager::recover(range, ops.clone()).await.unwrap();
        let a = first.create_vpn(232).await.unwrap();
        let b = first.create_vpn(300).await.unwrap();
        drop(first);

        let second = VpnManager::recover(range, ops.clone()).await.unwrap();
        assert_eq!(second.summary().used, 2);
        assert_eq!(second.summary().free, 8);

        while let Ok(created) = second.create_vpn(400).await {
            assert_ne!(created.port, a.port);
            assert_ne!(created.port, b.port);
        }
        assert_eq!(ops.len(), 10);

        // Recovered vpns can be deleted.
        second.delete_vpn(a.id).await.unwrap();
        assert_eq!(ops.len(), 9);
    }

    #[tokio::test]
    async fn test_recover_propagates_listing_failure() {
        let ops = Arc::new(InMemoryPrivOps::new());
        ops.fail_next(PrivOp::List);
        let range = PortRange::new(5000, 5009).unwrap();

        assert!(VpnManager::recover(range, ops).await.is_err());
    }
}
