//! IP address and CIDR notation utilities.
//!
//! Provides [`CidrBlock`] for representing IPv4/IPv6 networks with prefix
//! lengths, along with the range arithmetic used by the address allocator:
//! containment tests, exclusion-splitting, sorting and compaction.

use serde::de;
use serde::{Deserialize, Deserializer, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use thiserror::Error;

/// Maximum prefix length for an IPv4 network (32 bits).
pub const MAX_LENGTH_V4: u8 = 32;

/// Maximum prefix length for an IPv6 network (128 bits).
pub const MAX_LENGTH_V6: u8 = 128;

/// Errors from parsing CIDR text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The address part is not a valid IPv4 or IPv6 address.
    #[error("invalid address in cidr '{0}'")]
    Address(String),
    /// The prefix part is missing, non-numeric, or too long for the family.
    #[error("invalid prefix length in cidr '{0}'")]
    Prefix(String),
}

/// Address family of a [`CidrBlock`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    /// Full prefix length for this family (32 or 128).
    pub fn max_prefix(self) -> u8 {
        match self {
            AddressFamily::V4 => MAX_LENGTH_V4,
            AddressFamily::V6 => MAX_LENGTH_V6,
        }
    }
}

impl std::fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            AddressFamily::V4 => write!(f, "ip4"),
            AddressFamily::V6 => write!(f, "ip6"),
        }
    }
}

/// An IP network in CIDR notation, IPv4 or IPv6.
///
/// The address may carry host bits (WireGuard addresses are written that
/// way, e.g. `10.1.1.1/24`); [`CidrBlock::network`] gives the canonical
/// form with host bits cleared.
///
/// Ordering is structural: all v4 sorts before all v6, then by address,
/// then by prefix. This is only a stable sort key for deterministic
/// output; it carries no routing meaning.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CidrBlock {
    /// The IP address, possibly with host bits set.
    pub addr: IpAddr,
    /// The prefix length (0-32 for v4, 0-128 for v6).
    pub prefix: u8,
}

/// Address as a u128 bit pattern (v4 zero-extended).
fn addr_bits(addr: &IpAddr) -> u128 {
    match addr {
        IpAddr::V4(a) => u32::from(*a) as u128,
        IpAddr::V6(a) => u128::from(*a),
    }
}

/// Rebuild an address from a bit pattern for the given family.
fn addr_from_bits(bits: u128, family: AddressFamily) -> IpAddr {
    match family {
        AddressFamily::V4 => IpAddr::V4(Ipv4Addr::from(bits as u32)),
        AddressFamily::V6 => IpAddr::V6(Ipv6Addr::from(bits)),
    }
}

/// All-ones host pattern for the family (the widest possible mask).
fn full_mask(family: AddressFamily) -> u128 {
    match family {
        AddressFamily::V4 => u32::MAX as u128,
        AddressFamily::V6 => u128::MAX,
    }
}

impl CidrBlock {
    /// Parse a CIDR string (e.g. `10.0.0.0/24`, `fc00:77:77::/64`).
    ///
    /// A bare address with no `/prefix` is accepted as a host block
    /// (`10.0.0.5` is `10.0.0.5/32`).
    ///
    /// # Examples
    /// ```
    /// use wg_fleet_config::models::CidrBlock;
    /// let net = CidrBlock::new("10.0.0.0/24").unwrap();
    /// assert_eq!(net.prefix, 24);
    /// assert!(CidrBlock::new("10.0.0.0/33").is_err());
    /// ```
    pub fn new(text: &str) -> Result<CidrBlock, ParseError> {
        let text = text.trim();
        let (addr_part, prefix_part) = match text.split_once('/') {
            Some((a, p)) => (a, Some(p)),
            None => (text, None),
        };

        let addr = IpAddr::from_str(addr_part)
            .map_err(|_| ParseError::Address(text.to_string()))?;

        let family = match addr {
            IpAddr::V4(_) => AddressFamily::V4,
            IpAddr::V6(_) => AddressFamily::V6,
        };

        let prefix = match prefix_part {
            Some(p) => u8::from_str(p).map_err(|_| ParseError::Prefix(text.to_string()))?,
            None => family.max_prefix(),
        };
        if prefix > family.max_prefix() {
            return Err(ParseError::Prefix(text.to_string()));
        }

        Ok(CidrBlock { addr, prefix })
    }

    /// Build from parts, validating the prefix length against the family.
    pub fn from_parts(addr: IpAddr, prefix: u8) -> Result<CidrBlock, ParseError> {
        let block = CidrBlock { addr, prefix };
        if prefix > block.family().max_prefix() {
            return Err(ParseError::Prefix(block.to_string()));
        }
        Ok(block)
    }

    /// Address family of this block.
    pub fn family(&self) -> AddressFamily {
        match self.addr {
            IpAddr::V4(_) => AddressFamily::V4,
            IpAddr::V6(_) => AddressFamily::V6,
        }
    }

    /// Network mask as a bit pattern.
    fn mask(&self) -> u128 {
        if self.prefix == 0 {
            return 0;
        }
        let host_len = (self.family().max_prefix() - self.prefix) as u32;
        let full = full_mask(self.family());
        (full >> host_len) << host_len
    }

    /// Lowest address in the block (host bits cleared).
    pub fn network_address(&self) -> IpAddr {
        addr_from_bits(addr_bits(&self.addr) & self.mask(), self.family())
    }

    /// Highest address in the block (host bits set).
    ///
    /// For v4 this is the broadcast address. For v6 there is no broadcast;
    /// the value is only the arithmetic upper bound of the range.
    pub fn broadcast_address(&self) -> IpAddr {
        let host = full_mask(self.family()) & !self.mask();
        addr_from_bits(addr_bits(&self.addr) | host, self.family())
    }

    /// Canonical form: network address with the same prefix.
    pub fn network(&self) -> CidrBlock {
        CidrBlock {
            addr: self.network_address(),
            prefix: self.prefix,
        }
    }

    /// The address as a full-length host block (`10.1.1.1/24` -> `10.1.1.1/32`).
    pub fn host(&self) -> CidrBlock {
        CidrBlock {
            addr: self.addr,
            prefix: self.family().max_prefix(),
        }
    }

    /// True if the address has bits set below the prefix boundary.
    pub fn has_host_bits(&self) -> bool {
        addr_bits(&self.addr) & !self.mask() != 0
    }

    /// True iff every address in `self` is in `other` (true when equal).
    ///
    /// Mixed-family comparisons are always false.
    pub fn is_subnet_of(&self, other: &CidrBlock) -> bool {
        if self.family() != other.family() || self.prefix < other.prefix {
            return false;
        }
        addr_bits(&self.addr) & other.mask() == addr_bits(&other.addr) & other.mask()
    }

    /// Split into the two equal halves one prefix bit longer.
    ///
    /// Returns `None` for a full-length host block.
    pub fn bisect(&self) -> Option<(CidrBlock, CidrBlock)> {
        let max = self.family().max_prefix();
        if self.prefix >= max {
            return None;
        }
        let half_prefix = self.prefix + 1;
        let lo_bits = addr_bits(&self.network_address());
        let hi_bits = lo_bits | (1u128 << (max - half_prefix) as u32);
        let lo = CidrBlock {
            addr: addr_from_bits(lo_bits, self.family()),
            prefix: half_prefix,
        };
        let hi = CidrBlock {
            addr: addr_from_bits(hi_bits, self.family()),
            prefix: half_prefix,
        };
        Some((lo, hi))
    }

    /// Minimal disjoint cover of `self` minus `excluded`.
    ///
    /// Repeatedly bisects; `excluded` falls entirely in one half, the other
    /// half is emitted unchanged. Produces at most
    /// `excluded.prefix - self.prefix` blocks, pairwise disjoint, none
    /// overlapping `excluded`. Empty when `excluded` covers all of `self`.
    ///
    /// Returns `None` if `excluded` is not inside `self`.
    pub fn exclude(&self, excluded: &CidrBlock) -> Option<Vec<CidrBlock>> {
        let excluded = excluded.network();
        let mut current = self.network();
        if !excluded.is_subnet_of(&current) {
            return None;
        }

        let mut remainder: Vec<CidrBlock> = Vec::new();
        while current.prefix < excluded.prefix {
            let Some((lo, hi)) = current.bisect() else {
                break;
            };
            if excluded.is_subnet_of(&lo) {
                remainder.push(hi);
                current = lo;
            } else {
                remainder.push(lo);
                current = hi;
            }
        }
        Some(remainder)
    }
}

/// Sort blocks in canonical order: v4 before v6, then address, then prefix.
pub fn sort_blocks(blocks: &mut [CidrBlock]) {
    blocks.sort();
}

/// Sort CIDR strings by their parsed canonical order.
///
/// Unparseable entries sort first and are otherwise left alone; callers
/// are expected to have validated their input already.
pub fn sort_cidr_strings(cidrs: &[String]) -> Vec<String> {
    let mut sorted = cidrs.to_vec();
    sorted.sort_by_key(|c| CidrBlock::new(c).ok().map(|b| b.network()));
    sorted
}

/// True if `a` and `b` are sibling halves of their immediate supernet.
fn is_sibling_pair(a: &CidrBlock, b: &CidrBlock) -> bool {
    if a.family() != b.family() || a.prefix != b.prefix || a.prefix == 0 {
        return false;
    }
    let parent = CidrBlock {
        addr: a.addr,
        prefix: a.prefix - 1,
    };
    match parent.bisect() {
        Some((lo, hi)) => lo == a.network() && hi == b.network(),
        None => false,
    }
}

/// Merge a list of blocks into the smallest equivalent covering list.
///
/// Canonicalizes, drops blocks already covered by another, then merges
/// exact sibling pairs repeatedly. Used only for readability of emitted
/// configs, never by allocation logic.
pub fn compact(blocks: &[CidrBlock]) -> Vec<CidrBlock> {
    let mut nets: Vec<CidrBlock> = blocks.iter().map(|b| b.network()).collect();
    nets.sort();
    nets.dedup();

    // drop any block contained in an earlier (therefore wider) one
    let mut kept: Vec<CidrBlock> = Vec::with_capacity(nets.len());
    for net in nets {
        if !kept.iter().any(|k| net.is_subnet_of(k)) {
            kept.push(net);
        }
    }

    loop {
        let mut merged = false;
        let mut out: Vec<CidrBlock> = Vec::with_capacity(kept.len());
        let mut i = 0;
        while i < kept.len() {
            if i + 1 < kept.len() && is_sibling_pair(&kept[i], &kept[i + 1]) {
                out.push(CidrBlock {
                    addr: kept[i].addr,
                    prefix: kept[i].prefix - 1,
                });
                merged = true;
                i += 2;
            } else {
                out.push(kept[i]);
                i += 1;
            }
        }
        kept = out;
        if !merged {
            break;
        }
    }
    kept
}

impl std::fmt::Display for CidrBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

impl Serialize for CidrBlock {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for CidrBlock {
    fn deserialize<D>(deserializer: D) -> Result<CidrBlock, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        CidrBlock::new(&s).map_err(de::Error::custom)
    }
}
