//! Usable address space of one declared VPN network.
//!
//! A [`NetworkBlock`] tracks every free address in one network as an
//! ordered list of pairwise-disjoint sub-blocks. Marking an address taken
//! splits the sub-block holding it; finding a new address always returns
//! the lowest free one, so allocation is reproducible given the same
//! history.

use thiserror::Error;

use crate::models::{sort_blocks, AddressFamily, CidrBlock, ParseError};

/// Errors constructing a [`NetworkBlock`].
#[derive(Debug, Error)]
pub enum BlockError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// An initial reservation (network, broadcast or declared host
    /// address) could not be applied.
    #[error("cannot reserve {addr} in network {net}")]
    Reserve { addr: String, net: String },
}

/// IP address data for one VPN network.
///
/// The declared CIDR may carry host bits, WireGuard style:
/// `10.1.1.1/24` declares network `10.1.1.0/24` with the gateway
/// holding `10.1.1.1`.
#[derive(Debug, Clone)]
pub struct NetworkBlock {
    /// As declared, host bits preserved.
    declared: CidrBlock,
    /// Canonical containing network.
    network: CidrBlock,
    /// Free space: sorted, pairwise disjoint, covering every address of
    /// `network` not reserved or marked taken.
    available: Vec<CidrBlock>,
}

impl NetworkBlock {
    /// Parse and construct. See [`NetworkBlock::from_block`].
    pub fn new(declared_cidr: &str) -> Result<NetworkBlock, BlockError> {
        let declared = CidrBlock::new(declared_cidr)?;
        NetworkBlock::from_block(declared)
    }

    /// Construct from a parsed declaration.
    ///
    /// Reserves the network address, the broadcast address (v4 only) and
    /// the declared host address when it differs from the network
    /// address. Failing any reservation is a construction error.
    pub fn from_block(declared: CidrBlock) -> Result<NetworkBlock, BlockError> {
        let network = declared.network();
        let mut block = NetworkBlock {
            declared,
            network,
            available: vec![network],
        };

        block.reserve(&network.host())?;

        if network.family() == AddressFamily::V4 {
            let broadcast = CidrBlock {
                addr: network.broadcast_address(),
                prefix: AddressFamily::V4.max_prefix(),
            };
            block.reserve(&broadcast)?;
        }

        if declared.has_host_bits() {
            block.reserve(&declared.host())?;
        }

        Ok(block)
    }

    fn reserve(&mut self, addr: &CidrBlock) -> Result<(), BlockError> {
        if !self.mark_address_taken(addr) {
            return Err(BlockError::Reserve {
                addr: addr.to_string(),
                net: self.declared.to_string(),
            });
        }
        Ok(())
    }

    /// The declaration as given (host bits preserved).
    pub fn declared(&self) -> &CidrBlock {
        &self.declared
    }

    /// The canonical containing network.
    pub fn network(&self) -> &CidrBlock {
        &self.network
    }

    /// Canonical CIDR string for this network.
    pub fn cidr(&self) -> String {
        self.network.to_string()
    }

    pub fn family(&self) -> AddressFamily {
        self.network.family()
    }

    /// Current free space, sorted and disjoint.
    pub fn available(&self) -> &[CidrBlock] {
        &self.available
    }

    /// True if `cidr` lies entirely inside this network.
    pub fn contains(&self, cidr: &CidrBlock) -> bool {
        cidr.network().is_subnet_of(&self.network)
    }

    /// Remove `addr` (a host address or sub-block) from the free space.
    ///
    /// Returns false, with a warning logged, when `addr` is outside the
    /// network or not inside exactly one free sub-block (already taken).
    pub fn mark_address_taken(&mut self, addr: &CidrBlock) -> bool {
        let addr = addr.network();

        if !addr.is_subnet_of(&self.network) {
            log::warn!(
                "cannot mark {addr} taken: not part of network {}",
                self.declared
            );
            return false;
        }

        let mut changed = false;
        let mut avail: Vec<CidrBlock> = Vec::with_capacity(self.available.len() + 4);
        for net in &self.available {
            // addr lies in at most one entry since entries are disjoint
            if let Some(rest) = net.exclude(&addr) {
                changed = true;
                avail.extend(rest);
            } else {
                avail.push(*net);
            }
        }

        if !changed {
            log::warn!("address {addr} already used in {}", self.declared);
            return false;
        }

        sort_blocks(&mut avail);
        self.available = avail;
        true
    }

    /// First free block of `prefix` length, lowest address first.
    ///
    /// With `mark` set the returned address is immediately taken.
    /// Returns `None` when no free sub-block is wide enough.
    pub fn find_new_address(&mut self, prefix: u8, mark: bool) -> Option<CidrBlock> {
        if prefix > self.family().max_prefix() {
            log::warn!("prefix /{prefix} too long for {}", self.declared);
            return None;
        }

        let mut found: Option<CidrBlock> = None;
        for net in &self.available {
            if net.prefix <= prefix {
                // the sub-block's own lowest address
                found = Some(CidrBlock {
                    addr: net.network_address(),
                    prefix,
                });
                break;
            }
        }

        match found {
            Some(addr) => {
                if mark {
                    self.mark_address_taken(&addr);
                }
                Some(addr)
            }
            None => {
                log::warn!(
                    "failed to find available {} /{prefix} in {}",
                    self.family(),
                    self.declared
                );
                None
            }
        }
    }

    /// True iff `addr` is inside some free sub-block.
    pub fn is_address_available(&self, addr: &CidrBlock) -> bool {
        let addr = addr.network();
        self.available.iter().any(|net| addr.is_subnet_of(net))
    }

    /// Replace this network with a strict supernet of it.
    ///
    /// Free space is recomputed from scratch with only the standard
    /// reservations applied; the caller's rebuild pass re-applies any
    /// addresses already handed out. Returns false when `candidate` is
    /// not a strict supernet.
    pub fn expand_to_supernet(&mut self, candidate: &CidrBlock) -> bool {
        let cand_net = candidate.network();
        if self.network == cand_net || !self.network.is_subnet_of(&cand_net) {
            return false;
        }

        match NetworkBlock::from_block(*candidate) {
            Ok(expanded) => {
                *self = expanded;
                true
            }
            Err(e) => {
                log::error!("cannot expand {} to {candidate}: {e}", self.declared);
                false
            }
        }
    }

    /// The WireGuard form of an address in this network: host bits with
    /// the network's prefix length (`10.1.1.5/32` -> `10.1.1.5/24`).
    pub fn wg_address(&self, addr: &CidrBlock) -> String {
        if !self.contains(addr) {
            log::warn!("IP {addr} not part of net {}", self.declared);
        }
        format!("{}/{}", addr.addr, self.network.prefix)
    }
}
