//! HIL VPN shared definitions
//!
//! Types shared by the unprivileged daemon (`hil-vpnd`) and the privileged
//! helper (`hil-vpn-privop`): VPN identities, the external VPN name codec and
//! the argument validation both sides apply before acting on a request.

pub mod name;
pub mod unique_id;
pub mod validate;

pub use name::{decode, encode, NameError, VpnName};
pub use unique_id::{ParseIdError, UniqueId, UNIQUE_ID_LEN};
pub use validate::{check_port, ValidationError, Vlan, MAX_VLAN, MIN_UNPRIVILEGED_PORT, MIN_VLAN};
