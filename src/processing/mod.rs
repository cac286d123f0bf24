//! Address allocation and network sharing.
//!
//! This module holds the computational core:
//! - [`block`] - free space of one declared network
//! - [`space`] - the collection of declared networks
//! - [`shared`] - shared-network resolution between peers
//! - [`rebuild`] - per-invocation rebuild from the peer records

mod block;
mod rebuild;
mod shared;
mod space;

// Re-export public types and functions
pub use block::{BlockError, NetworkBlock};
pub use rebuild::{rebuild_vpn_state, VpnState};
pub use shared::{SharedNetworkRegistry, SharedNetworkResolver};
pub use space::NetworkSpace;
