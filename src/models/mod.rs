//! Domain models for the WireGuard fleet tool.
//!
//! This module contains the core data structures used throughout the
//! application:
//! - [`CidrBlock`] - IPv4/IPv6 network with CIDR arithmetic
//! - [`PeerProfile`] and [`PeerId`] - peer records and identities
//! - [`VpnDeclaration`] - the declared VPN networks

mod cidr;
mod peer;
mod vpn;

// Re-export public types
pub use cidr::{
    compact, sort_blocks, sort_cidr_strings, AddressFamily, CidrBlock, ParseError, MAX_LENGTH_V4,
    MAX_LENGTH_V6,
};
pub use peer::{IdError, PeerId, PeerProfile};
pub use vpn::{internet_networks, VpnDeclaration};
