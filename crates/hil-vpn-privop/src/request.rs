//! Checked helper invocations
//!
//! Every argument is validated here, before the lock is taken and before
//! anything on the host is touched.

use hil_vpn_proto::{check_port, Vlan, VpnName};

use crate::error::HelperError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Create {
        name: VpnName,
        vlan: Vlan,
        port: u16,
    },
    Start(VpnName),
    Stop(VpnName),
    Delete(VpnName),
    List,
}

impl Request {
    pub fn create(name: &str, vlan: u16, port: u16) -> Result<Self, HelperError> {
        let name = VpnName::parse(name)?;
        let vlan = Vlan::new(vlan)?;
        let port = check_port(port)?;
        if name.port() != port {
            return Err(HelperError::PortMismatch {
                name: name.to_string(),
                port,
            });
        }
        Ok(Request::Create { name, vlan, port })
    }

    pub fn start(name: &str) -> Result<Self, HelperError> {
        Ok(Request::Start(VpnName::parse(name)?))
    }

    pub fn stop(name: &str) -> Result<Self, HelperError> {
        Ok(Request::Stop(VpnName::parse(name)?))
    }

    pub fn delete(name: &str) -> Result<Self, HelperError> {
        Ok(Request::Delete(VpnName::parse(name)?))
    }
}
