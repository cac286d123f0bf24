//! Terminal listing of the fleet.

use colored::Colorize;

use crate::models::{PeerProfile, VpnDeclaration};

/// One-character peer state marker, colored for the terminal.
pub fn state_marker(active: bool) -> String {
    if active {
        "+".green().to_string()
    } else {
        "-".red().to_string()
    }
}

/// Multi-line overview of a VPN and its peers.
///
/// Pure string builder so it stays testable; `main` prints it.
pub fn fleet_listing(decl: &VpnDeclaration, peers: &[PeerProfile]) -> String {
    let mut out = format!(
        "{} [{}]\n",
        decl.name.cyan().bold(),
        decl.networks.join(", ")
    );

    for peer in peers {
        let name = format!("{}.{}", peer.account, peer.profile);
        let role = if peer.is_gateway() { "(gateway)" } else { "" };
        let addresses: Vec<String> = peer.address.iter().map(|a| a.to_string()).collect();

        out.push_str(&format!(
            " {} {:<24} {:<9} {}\n",
            state_marker(peer.active),
            name,
            role,
            addresses.join(", ")
        ));

        if !peer.nets_offered.is_empty() {
            out.push_str(&format!("     offers: {}\n", peer.nets_offered.join(", ")));
        }
        if !peer.nets_wanted.is_empty() {
            out.push_str(&format!("     wants:  {}\n", peer.nets_wanted.join(", ")));
        }
    }
    out
}
