//! Peer profile records.
//!
//! A peer is one WireGuard endpoint (gateway or client) belonging to an
//! account. Profiles are the authoritative source of assigned addresses:
//! the allocator is rebuilt from them on every run.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::CidrBlock;

lazy_static! {
    static ref ID_SEGMENT_RE: Regex =
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*$").expect("Invalid Regex?");
}

/// A peer id segment (vpn, account or profile name) failed validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid peer id segment '{0}'")]
pub struct IdError(pub String);

/// Stable peer identifier: `vpn.account.profile`.
///
/// Segments are limited to `[A-Za-z0-9_-]` so the dotted form is
/// unambiguous. This string keys the shared-network resolver.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId {
    vpn: String,
    account: String,
    profile: String,
}

impl PeerId {
    /// Build a peer id, validating every segment.
    pub fn new(vpn: &str, account: &str, profile: &str) -> Result<PeerId, IdError> {
        for segment in [vpn, account, profile] {
            if !ID_SEGMENT_RE.is_match(segment) {
                return Err(IdError(segment.to_string()));
            }
        }
        Ok(PeerId {
            vpn: vpn.to_string(),
            account: account.to_string(),
            profile: profile.to_string(),
        })
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.vpn, self.account, self.profile)
    }
}

fn default_true() -> bool {
    true
}

/// One peer profile as stored in the fleet file.
///
/// `address` entries are host CIDRs (`x.x.x.10/32`, `x::a/128`) and parse
/// fail-closed; a profile with a bad address never loads. Network sharing
/// lists stay as raw strings because the resolver handles them best-effort.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PeerProfile {
    pub account: String,
    pub profile: String,

    #[serde(default)]
    pub address: Vec<CidrBlock>,

    #[serde(default)]
    pub private_key: String,
    #[serde(default)]
    pub public_key: String,

    /// `host_or_ip:port`; set only on gateways.
    #[serde(default)]
    pub endpoint: String,

    #[serde(default)]
    pub persistent_keepalive: u32,
    #[serde(default)]
    pub mtu: String,

    #[serde(default)]
    pub dns: Vec<String>,
    #[serde(default)]
    pub dns_search: Vec<String>,

    /// Networks this peer wants routed to it from other peers.
    #[serde(default)]
    pub nets_wanted: Vec<String>,
    /// Networks this peer provides to other peers.
    #[serde(default)]
    pub nets_offered: Vec<String>,

    #[serde(default = "default_true")]
    pub internet_wanted: bool,
    #[serde(default)]
    pub internet_offered: bool,

    #[serde(default = "default_true")]
    pub active: bool,

    #[serde(default)]
    pub mod_time: String,
}

impl PeerProfile {
    /// The peer's stable identifier within `vpn`.
    pub fn ident(&self, vpn: &str) -> Result<PeerId, IdError> {
        PeerId::new(vpn, &self.account, &self.profile)
    }

    /// A gateway has a reachable endpoint; a client does not.
    pub fn is_gateway(&self) -> bool {
        !self.endpoint.is_empty()
    }

    /// Listen port taken from the endpoint. Defaults to 51820.
    pub fn listen_port(&self) -> String {
        self.endpoint
            .rsplit_once(':')
            .map(|(_addr, port)| port)
            .filter(|port| !port.is_empty())
            .unwrap_or("51820")
            .to_string()
    }
}
