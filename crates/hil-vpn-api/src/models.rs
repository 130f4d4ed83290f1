use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Request to create a vpn
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateVpnRequest {
    /// 802.1Q tag of the network to bridge (1-4094)
    pub vlan: u16,
}

/// A newly created vpn
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateVpnResponse {
    /// OpenVPN static key for the client side
    pub key: String,
    /// Hex-encoded identity, used to delete the vpn
    pub id: String,
    /// UDP port the vpn listens on
    pub port: u16,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service version
    pub version: String,
    /// Ports bound to live vpns
    pub used_ports: usize,
    /// Ports available for new vpns
    pub free_ports: usize,
    /// Ports withheld after an unconfirmed teardown
    pub retired_ports: usize,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// Error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: &str) -> Self {
        Self {
            error: error.into(),
            code: Some(code.to_string()),
        }
    }
}
