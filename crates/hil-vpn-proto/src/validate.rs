//! Range checks for the numeric arguments of a VPN

use std::fmt;
use thiserror::Error;

/// Lowest usable 802.1Q VLAN tag
pub const MIN_VLAN: u16 = 1;
/// Highest usable 802.1Q VLAN tag (4095 is reserved)
pub const MAX_VLAN: u16 = 4094;
/// Ports below this require privileges to bind
pub const MIN_UNPRIVILEGED_PORT: u16 = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("vlan {0} is out of range; must be between 1 and 4094")]
    InvalidVlan(u16),

    #[error("port {0} is a privileged port; must be at least 1024")]
    PrivilegedPort(u16),
}

/// A VLAN tag known to be in `[MIN_VLAN, MAX_VLAN]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Vlan(u16);

impl Vlan {
    pub fn new(tag: u16) -> Result<Self, ValidationError> {
        if (MIN_VLAN..=MAX_VLAN).contains(&tag) {
            Ok(Self(tag))
        } else {
            Err(ValidationError::InvalidVlan(tag))
        }
    }

    pub fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for Vlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Check that an OpenVPN listening port is not a privileged port
pub fn check_port(port: u16) -> Result<u16, ValidationError> {
    if port >= MIN_UNPRIVILEGED_PORT {
        Ok(port)
    } else {
        Err(ValidationError::PrivilegedPort(port))
    }
}
