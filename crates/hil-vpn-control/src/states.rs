//! Port and identity bookkeeping for live VPNs
//!
//! `VpnStates` maps every VPN identity to the port it was given, and keeps a
//! stack of ports that may be handed out next. A port leaves the used map and
//! re-enters the free stack in two separate steps (`release`, then
//! `return_port`) so that callers can hold a port back until they know the
//! privileged resources behind it are gone.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, info, warn};

use hil_vpn_proto::{decode, UniqueId};

use crate::port_range::PortRange;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
    #[error("there are no free OpenVPN ports")]
    NoFreePorts,

    #[error("no such vpn")]
    NoSuchVpn,
}

/// Point-in-time counts, for logging and diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatesSummary {
    pub used: usize,
    pub free: usize,
    pub retired: usize,
}

/// Tracks the currently existing vpns and the available port numbers
pub struct VpnStates {
    range: PortRange,
    inner: Mutex<StatesInner>,
}

struct StatesInner {
    /// The port used by each vpn
    used_ports: HashMap<UniqueId, u16>,
    /// Ports that may be given to new vpns; the last entry is handed out first
    free_ports: Vec<u16>,
    /// Ports withheld from reuse after an unconfirmed teardown
    retired: usize,
}

impl VpnStates {
    /// Bookkeeping for a host with no existing vpns
    pub fn new(range: PortRange) -> Self {
        Self::reconstruct(range, std::iter::empty::<&str>())
    }

    /// Rebuild bookkeeping from the names of vpns that already exist.
    ///
    /// Names that do not decode are ignored. Ports claimed by a decoded name
    /// are never placed in the free pool.
    pub fn reconstruct<I, S>(range: PortRange, existing_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut used_ports = HashMap::new();
        // Every decoded port, including ones shadowed by a repeated id
        let mut claimed = HashSet::new();

        for name in existing_names {
            let name = name.as_ref();
            let (id, port) = match decode(name) {
                Ok(decoded) => decoded,
                Err(_) => {
                    debug!(name, "Ignoring unrelated entry in vpn inventory");
                    continue;
                }
            };
            if !range.contains(port) {
                warn!(
                    vpn = name,
                    port, "Existing vpn uses a port outside the configured range"
                );
            }
            claimed.insert(port);
            if let Some(previous) = used_ports.insert(id, port) {
                warn!(
                    %id,
                    port,
                    previous, "Vpn id appears more than once in inventory; keeping the last"
                );
            }
        }

        let free_ports: Vec<u16> = range
            .ports()
            .filter(|port| !claimed.contains(port))
            .collect();

        info!(
            recovered = used_ports.len(),
            free = free_ports.len(),
            min_port = range.min(),
            max_port = range.max(),
            "Rebuilt vpn port bookkeeping"
        );

        Self {
            range,
            inner: Mutex::new(StatesInner {
                used_ports,
                free_ports,
                retired: 0,
            }),
        }
    }

    /// Allocate a new vpn, returning its identity and port
    pub fn allocate(&self) -> Result<(UniqueId, u16), AllocError> {
        let id = UniqueId::generate();

        let mut inner = self.lock();
        let port = inner.free_ports.pop().ok_or(AllocError::NoFreePorts)?;
        inner.used_ports.insert(id, port);

        Ok((id, port))
    }

    /// Forget a vpn, returning the port it held.
    ///
    /// The port is *not* made available again; see [`VpnStates::return_port`].
    pub fn release(&self, id: &UniqueId) -> Result<u16, AllocError> {
        self.lock()
            .used_ports
            .remove(id)
            .ok_or(AllocError::NoSuchVpn)
    }

    /// Put a port back in the free pool. Callers must not return a port twice.
    ///
    /// Ports outside the configured range (held by vpns found at startup) are
    /// dropped rather than added to the pool.
    pub fn return_port(&self, port: u16) {
        if !self.range.contains(port) {
            debug!(port, "Not returning out-of-range port to the free pool");
            return;
        }
        self.lock().free_ports.push(port);
    }

    /// Record that a released port is being withheld from reuse
    pub fn retire_port(&self, port: u16) {
        let retired = {
            let mut inner = self.lock();
            inner.retired += 1;
            inner.retired
        };
        warn!(port, retired, "Port retired; it will not be reused until restart");
    }

    pub fn port_of(&self, id: &UniqueId) -> Option<u16> {
        self.lock().used_ports.get(id).copied()
    }

    pub fn summary(&self) -> StatesSummary {
        let inner = self.lock();
        StatesSummary {
            used: inner.used_ports.len(),
            free: inner.free_ports.len(),
            retired: inner.retired,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StatesInner> {
        // Critical sections never panic part way through an update.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hil_vpn_proto::encode;

    fn range(min: u32, max: u32) -> PortRange {
        PortRange::new(min, max).unwrap()
    }

    #[test]
    fn test_allocation_order_and_exhaustion() {
        let states = VpnStates::new(range(4000, 4003));

        let mut ids = Vec::new();
        for expected_port in [4003, 4002, 4001, 4000] {
            let (id, port) = states.allocate().unwrap();
            assert_eq!(port, expected_port);
            ids.push(id);
        }

        for i in 0..ids.len() {
            for j in 0..i {
                assert_ne!(ids[i], ids[j], "vpn id {} is not unique", ids[i]);
            }
        }

        assert_eq!(states.allocate(), Err(AllocError::NoFreePorts));
        assert_eq!(
            states.summary(),
            StatesSummary {
                used: 4,
                free: 0,
                retired: 0
            }
        );

        // Release the vpn on 4001 and hand its port back: it comes out next.
        let port = states.release(&ids[2]).unwrap();
        assert_eq!(port, 4001);
        states.return_port(port);

        let (_, port) = states.allocate().unwrap();
        assert_eq!(port, 4001);
    }

    #[test]
    fn test_release_without_return_keeps_port_out_of_pool() {
        let states = VpnStates::new(range(4000, 4000));
        let (id, port) = states.allocate().unwrap();

        assert_eq!(states.release(&id), Ok(port));
        assert_eq!(states.port_of(&id), None);
        assert_eq!(states.allocate(), Err(AllocError::NoFreePorts));
    }

    #[test]
    fn test_release_unknown_id() {
        let states = VpnStates::new(range(4000, 4003));
        let (id, _) = states.allocate().unwrap();
        let before = states.summary();

        let stranger = UniqueId::from_bytes([7u8; 16]);
        assert_eq!(states.release(&stranger), Err(AllocError::NoSuchVpn));

        assert_eq!(states.summary(), before);
        assert_eq!(states.port_of(&id), Some(4003));
    }

    #[test]
    fn test_release_twice() {
        let states = VpnStates::new(range(4000, 4003));
        let (id, _) = states.allocate().unwrap();
        assert!(states.release(&id).is_ok());
        assert_eq!(states.release(&id), Err(AllocError::NoSuchVpn));
    }

    #[test]
    fn test_reconstruct_excludes_existing_ports() {
        let a = UniqueId::from_bytes([1u8; 16]);
        let b = UniqueId::from_bytes([2u8; 16]);
        let names = vec![
            encode(&a, 5003),
            encode(&b, 5007),
            "hil_vpn_id_not_a_vpn".to_string(),
            "server.conf".to_string(),
        ];

        let states = VpnStates::reconstruct(range(5000, 5009), &names);
        assert_eq!(
            states.summary(),
            StatesSummary {
                used: 2,
                free: 8,
                retired: 0
            }
        );
        assert_eq!(states.port_of(&a), Some(5003));
        assert_eq!(states.port_of(&b), Some(5007));

        let mut handed_out = Vec::new();
        while let Ok((_, port)) = states.allocate() {
            handed_out.push(port);
        }
        assert_eq!(handed_out.len(), 8);
        assert!(!handed_out.contains(&5003));
        assert!(!handed_out.contains(&5007));
    }

    #[test]
    fn test_reconstruct_repeated_id_keeps_both_ports_out_of_pool() {
        let a = UniqueId::from_bytes([1u8; 16]);
        let names = [encode(&a, 5001), encode(&a, 5002)];

        let states = VpnStates::reconstruct(range(5000, 5003), names);
        assert_eq!(states.port_of(&a), Some(5002));
        assert_eq!(
            states.summary(),
            StatesSummary {
                used: 1,
                free: 2,
                retired: 0
            }
        );

        let mut handed_out = Vec::new();
        while let Ok((_, port)) = states.allocate() {
            handed_out.push(port);
        }
        handed_out.sort_unstable();
        assert_eq!(handed_out, vec![5000, 5003]);
    }

    #[test]
    fn test_reconstruct_out_of_range_vpn() {
        let a = UniqueId::from_bytes([1u8; 16]);
        let states = VpnStates::reconstruct(range(5000, 5001), [encode(&a, 6000)]);

        assert_eq!(states.port_of(&a), Some(6000));
        assert_eq!(states.summary().free, 2);

        let port = states.release(&a).unwrap();
        states.return_port(port);
        assert_eq!(states.summary().free, 2);
    }

    #[test]
    fn test_retire_port_counts() {
        let states = VpnStates::new(range(4000, 4001));
        let (id, _) = states.allocate().unwrap();
        let port = states.release(&id).unwrap();
        states.retire_port(port);

        assert_eq!(
            states.summary(),
            StatesSummary {
                used: 0,
                free: 1,
                retired: 1
            }
        );
    }
}
