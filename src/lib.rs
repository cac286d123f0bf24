//! WireGuard fleet configuration tool.
//!
//! Reads the authoritative fleet file (one VPN declaration plus every
//! peer profile), rebuilds the address allocator and shared-network
//! resolver from it, and emits a WireGuard config per peer.

pub mod models;
pub mod output;
pub mod processing;
pub mod store;

use std::collections::HashSet;
use std::error::Error;

use processing::{rebuild_vpn_state, VpnState};
use store::FleetFile;

/// Load a fleet file with peers sorted by account and profile name.
pub fn load_fleet(fleet_file: &str) -> Result<FleetFile, Box<dyn Error>> {
    let mut fleet = store::read_fleet_file(fleet_file)?;
    // Sort for stable, diffable output
    fleet
        .peers
        .sort_by_key(|p| (p.account.clone(), p.profile.clone()));
    check_for_duplicate_peers(&fleet)?;
    Ok(fleet)
}

/// Return an error if two peers share an account.profile pair.
pub fn check_for_duplicate_peers(fleet: &FleetFile) -> Result<(), Box<dyn Error>> {
    let mut seen = HashSet::new();

    for peer in fleet.peers.iter() {
        if !seen.insert((peer.account.clone(), peer.profile.clone())) {
            return Err(format!("Duplicate peer found: {}.{}", peer.account, peer.profile).into());
        }
    }
    Ok(())
}

/// Rebuild allocator and resolver state from the fleet records.
pub fn rebuild_state(fleet: &FleetFile) -> Result<VpnState, Box<dyn Error>> {
    rebuild_vpn_state(&fleet.vpn, &fleet.peers)
}
