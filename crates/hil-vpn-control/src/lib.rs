//! VPN lifecycle control for hil-vpnd
//!
//! Port and identity bookkeeping, the privileged-operation boundary, and the
//! create/delete flows that tie the two together.

pub mod lifecycle;
pub mod memory;
pub mod port_range;
pub mod privops;
pub mod privops_cmd;
pub mod states;

pub use lifecycle::{CreatedVpn, LifecycleError, VpnManager};
pub use memory::{InMemoryPrivOps, MemoryVpn};
pub use port_range::{ConfigError, PortRange};
pub use privops::{PrivOp, PrivOps, PrivOpsError};
pub use privops_cmd::PrivOpsCmd;
pub use states::{AllocError, StatesSummary, VpnStates};
