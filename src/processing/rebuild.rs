//! Rebuild allocator state from the authoritative peer records.
//!
//! There is no persisted pool of free addresses. Every run seeds the
//! network space from the VPN declaration and replays each active peer's
//! assigned addresses, so allocation state can never drift from what is
//! actually on the peer records.

use std::error::Error;

use crate::models::{CidrBlock, PeerProfile, VpnDeclaration};

use super::shared::{SharedNetworkRegistry, SharedNetworkResolver};
use super::space::NetworkSpace;

/// Fully rebuilt per-invocation state: the address allocator and the
/// sealed shared-network resolver.
#[derive(Debug)]
pub struct VpnState {
    pub space: NetworkSpace,
    pub shared: SharedNetworkResolver,
}

impl VpnState {
    /// One fresh address per declared network family, for provisioning a
    /// new peer. `None` when any network is out of space.
    pub fn provision_addresses(&mut self) -> Option<Vec<CidrBlock>> {
        let addresses = self.space.find_new_addresses();
        if addresses.is_none() {
            log::error!("vpn network exhausted: widen the CIDR block or remove a peer");
        }
        addresses
    }
}

/// Build a [`VpnState`] from the declaration and the current peers.
///
/// Fails on an invalid declaration, an invalid peer identity, or any
/// address that cannot be replayed cleanly (outside every declared
/// network, or assigned twice) - the records are the source of truth and
/// must be consistent before anything is emitted.
pub fn rebuild_vpn_state(
    decl: &VpnDeclaration,
    peers: &[PeerProfile],
) -> Result<VpnState, Box<dyn Error>> {
    decl.validate()?;

    let mut space = NetworkSpace::new();
    space.set_prefix_lens(decl.prefixlen_v4, decl.prefixlen_v6);
    for net in &decl.networks {
        if !space.add_cidr(net) {
            return Err(format!("error initializing vpn {} network {net}", decl.name).into());
        }
    }

    let mut registry = SharedNetworkRegistry::new();
    for peer in peers.iter().filter(|p| p.active) {
        let ident = peer
            .ident(&decl.name)
            .map_err(|e| format!("vpn {}: {e}", decl.name))?;
        let id_str = ident.to_string();

        if !space.mark_addresses_taken(&peer.address) {
            return Err(format!("bad or duplicate address on peer {id_str}").into());
        }

        if !peer.nets_wanted.is_empty() {
            registry.add_wanted_by(&id_str, &peer.nets_wanted);
        }
        if !peer.nets_offered.is_empty() {
            registry.add_offered_by(&id_str, &peer.nets_offered);
        }
    }

    Ok(VpnState {
        space,
        shared: registry.finish(),
    })
}
