//! External VPN names
//!
//! A VPN is known to the privileged helper, systemd and the filesystem only by
//! its external name, `hil_vpn_id_<32 hex digits>_port_<decimal port>`. The
//! daemon rebuilds its port bookkeeping after a restart by decoding the names
//! found on disk, so decoding has to be exact: anything that does not match
//! the grammar belongs to someone else and is rejected.

use regex_lite::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

use crate::unique_id::UniqueId;

const NAME_PREFIX: &str = "hil_vpn_id_";
const PORT_SEPARATOR: &str = "_port_";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("invalid vpn name {0:?}")]
    InvalidName(String),
}

fn name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Port is decimal without leading zeros; range is checked on parse.
        Regex::new(r"^hil_vpn_id_([0-9a-f]{32})_port_(0|[1-9][0-9]{0,4})$").unwrap()
    })
}

/// Encode an identity and a port as an external name
pub fn encode(id: &UniqueId, port: u16) -> String {
    format!("{}{}{}{}", NAME_PREFIX, id, PORT_SEPARATOR, port)
}

/// Decode an external name produced by [`encode`]
pub fn decode(name: &str) -> Result<(UniqueId, u16), NameError> {
    let invalid = || NameError::InvalidName(name.to_string());

    let caps = name_regex().captures(name).ok_or_else(invalid)?;
    let id: UniqueId = caps[1].parse().map_err(|_| invalid())?;
    let port: u16 = caps[2].parse().map_err(|_| invalid())?;

    Ok((id, port))
}

/// A validated external VPN name
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct VpnName {
    id: UniqueId,
    port: u16,
    text: String,
}

impl VpnName {
    pub fn new(id: UniqueId, port: u16) -> Self {
        Self {
            text: encode(&id, port),
            id,
            port,
        }
    }

    pub fn parse(name: &str) -> Result<Self, NameError> {
        let (id, port) = decode(name)?;
        Ok(Self {
            id,
            port,
            text: name.to_string(),
        })
    }

    pub fn id(&self) -> UniqueId {
        self.id
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl FromStr for VpnName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for VpnName {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for VpnName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl fmt::Debug for VpnName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VpnName({:?})", self.text)
    }
}
