//! VPN declaration.

use serde::{Deserialize, Serialize};
use std::error::Error;

use super::{AddressFamily, CidrBlock};

fn default_prefixlen_v4() -> u8 {
    32
}

fn default_prefixlen_v6() -> u8 {
    128
}

/// The declared shape of one VPN: its name and network blocks.
///
/// Network strings follow the WireGuard convention and may carry host
/// bits (`10.1.1.1/24` declares network `10.1.1.0/24` with gateway host
/// `10.1.1.1`).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VpnDeclaration {
    pub name: String,
    pub networks: Vec<String>,

    /// When set, AllowedIPs use whole VPN networks instead of single
    /// peer addresses, letting all peers reach one another.
    #[serde(default)]
    pub peer_to_peer: bool,

    #[serde(default)]
    pub dns: Vec<String>,
    #[serde(default)]
    pub dns_search: Vec<String>,

    /// Prefix length handed out per new v4 address.
    #[serde(default = "default_prefixlen_v4")]
    pub prefixlen_v4: u8,
    /// Prefix length handed out per new v6 address.
    #[serde(default = "default_prefixlen_v6")]
    pub prefixlen_v6: u8,
}

impl VpnDeclaration {
    /// Check the declaration is usable. Fails closed on the first problem.
    pub fn validate(&self) -> Result<(), Box<dyn Error>> {
        if self.name.trim().is_empty() {
            return Err("vpn declaration is missing a name".into());
        }
        if self.networks.is_empty() {
            return Err(format!("vpn {}: no networks declared", self.name).into());
        }
        for net in &self.networks {
            CidrBlock::new(net)
                .map_err(|e| format!("vpn {}: bad network '{net}': {e}", self.name))?;
        }
        if self.prefixlen_v4 > AddressFamily::V4.max_prefix() {
            return Err(format!("vpn {}: prefixlen_v4 too long", self.name).into());
        }
        if self.prefixlen_v6 > AddressFamily::V6.max_prefix() {
            return Err(format!("vpn {}: prefixlen_v6 too long", self.name).into());
        }
        Ok(())
    }
}

/// Default-route blocks used when a peer provides internet access.
pub fn internet_networks() -> Vec<String> {
    vec!["0.0.0.0/0".to_string(), "::/0".to_string()]
}
