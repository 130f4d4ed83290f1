//! The configured pool of OpenVPN listening ports

use hil_vpn_proto::MIN_UNPRIVILEGED_PORT;
use std::ops::RangeInclusive;
use thiserror::Error;

/// Configuration errors; these are fatal at startup
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("MIN_VPN_PORT ({min}) is greater than MAX_VPN_PORT ({max})")]
    InvertedRange { min: u32, max: u32 },

    #[error("MIN_VPN_PORT specifies a privileged port ({0})")]
    PrivilegedPort(u32),

    #[error("MAX_VPN_PORT is out of range ({0})")]
    PortOutOfRange(u32),
}

/// An inclusive, non-empty range of unprivileged ports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    min: u16,
    max: u16,
}

impl PortRange {
    /// Validate a port range read from configuration.
    ///
    /// Takes wide integers so that values past the 16-bit port space are
    /// reported as configuration errors instead of being truncated.
    pub fn new(min: u32, max: u32) -> Result<Self, ConfigError> {
        if min > max {
            return Err(ConfigError::InvertedRange { min, max });
        }
        if min < u32::from(MIN_UNPRIVILEGED_PORT) {
            return Err(ConfigError::PrivilegedPort(min));
        }
        let max = u16::try_from(max).map_err(|_| ConfigError::PortOutOfRange(max))?;

        // min <= max <= u16::MAX here
        Ok(Self {
            min: min as u16,
            max,
        })
    }

    pub fn min(&self) -> u16 {
        self.min
    }

    pub fn max(&self) -> u16 {
        self.max
    }

    pub fn contains(&self, port: u16) -> bool {
        self.ports().contains(&port)
    }

    pub fn len(&self) -> usize {
        usize::from(self.max - self.min) + 1
    }

    /// A range always holds at least one port
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn ports(&self) -> RangeInclusive<u16> {
        self.min..=self.max
    }
}
