//! Collection of VPN networks.
//!
//! Handles overlapping declarations: a duplicate or subnet declaration is
//! a no-op, a supernet declaration grows the existing block in place. At
//! no point do two stored blocks overlap.

use std::collections::HashMap;

use crate::models::{AddressFamily, CidrBlock};

use super::block::NetworkBlock;

/// All declared networks of one VPN, keyed by canonical CIDR string.
#[derive(Debug, Clone)]
pub struct NetworkSpace {
    blocks: HashMap<String, NetworkBlock>,
    /// Prefix length handed out per new v4 address.
    prefixlen_v4: u8,
    /// Prefix length handed out per new v6 address.
    prefixlen_v6: u8,
}

impl NetworkSpace {
    pub fn new() -> NetworkSpace {
        NetworkSpace {
            blocks: HashMap::new(),
            prefixlen_v4: AddressFamily::V4.max_prefix(),
            prefixlen_v6: AddressFamily::V6.max_prefix(),
        }
    }

    /// Set the governing prefix lengths used by [`NetworkSpace::find_new_addresses`].
    pub fn set_prefix_lens(&mut self, prefixlen_v4: u8, prefixlen_v6: u8) {
        self.prefixlen_v4 = prefixlen_v4;
        self.prefixlen_v6 = prefixlen_v6;
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Add a declared network. Handles, in priority order: already
    /// covered (no-op), strict supernet of an existing block (expand in
    /// place), brand new (insert).
    pub fn add_cidr(&mut self, cidr: &str) -> bool {
        let candidate = match CidrBlock::new(cidr) {
            Ok(block) => block,
            Err(e) => {
                log::error!("bad vpn network address '{cidr}': {e}");
                return false;
            }
        };

        // equal to or inside an existing network
        if self.blocks.values().any(|b| b.contains(&candidate)) {
            return true;
        }

        // strict supernet of an existing network: grow that block.
        // The equality case was covered by the containment check above.
        let grow_key = self
            .blocks
            .iter()
            .find(|(_, b)| b.network().is_subnet_of(&candidate.network()))
            .map(|(key, _)| key.clone());

        if let Some(key) = grow_key {
            let Some(mut block) = self.blocks.remove(&key) else {
                return false;
            };
            if !block.expand_to_supernet(&candidate) {
                self.blocks.insert(key, block);
                return false;
            }

            // the wider network may now cover other declared blocks;
            // absorb them so no two stored blocks overlap
            let expanded = *block.network();
            self.blocks.retain(|other_key, other| {
                let covered = other.network().is_subnet_of(&expanded);
                if covered {
                    log::info!("network {other_key} absorbed into {expanded}");
                }
                !covered
            });

            self.blocks.insert(block.cidr(), block);
            return true;
        }

        // must be new
        match NetworkBlock::from_block(candidate) {
            Ok(block) => {
                self.blocks.insert(block.cidr(), block);
                true
            }
            Err(e) => {
                log::error!("error initializing vpn network {cidr}: {e}");
                false
            }
        }
    }

    /// The block whose network contains `cidr`, if any.
    pub fn find_block_for(&self, cidr: &CidrBlock) -> Option<&NetworkBlock> {
        self.blocks.values().find(|b| b.contains(cidr))
    }

    fn find_block_for_mut(&mut self, cidr: &CidrBlock) -> Option<&mut NetworkBlock> {
        self.blocks.values_mut().find(|b| b.contains(cidr))
    }

    /// Replay a list of assigned addresses against their owning blocks.
    ///
    /// The first address that cannot be marked aborts the pass; this is
    /// the startup consistency check against the peer records.
    pub fn mark_addresses_taken(&mut self, cidrs: &[CidrBlock]) -> bool {
        for cidr in cidrs {
            let Some(block) = self.find_block_for_mut(cidr) else {
                log::error!("address {cidr} is in no declared vpn network");
                return false;
            };
            if !block.mark_address_taken(cidr) {
                log::error!("duplicate address: {cidr}");
                return false;
            }
        }
        true
    }

    /// True iff `cidr` is inside a declared network and still free.
    pub fn is_address_available(&self, cidr: &CidrBlock) -> bool {
        match self.find_block_for(cidr) {
            Some(block) => block.is_address_available(cidr),
            None => {
                log::warn!("address {cidr} is not part of any vpn network");
                false
            }
        }
    }

    /// One fresh address per declared network, at each family's governing
    /// prefix length. Blocks are visited in canonical order so results
    /// are reproducible.
    ///
    /// Returns `None` if any network is out of space.
    pub fn find_new_addresses(&mut self) -> Option<Vec<CidrBlock>> {
        let mut keys: Vec<String> = self.blocks.keys().cloned().collect();
        keys.sort_by_key(|k| CidrBlock::new(k).ok().map(|b| b.network()));

        let mut addresses: Vec<CidrBlock> = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(block) = self.blocks.get_mut(&key) else {
                continue;
            };
            let prefix = match block.family() {
                AddressFamily::V4 => self.prefixlen_v4,
                AddressFamily::V6 => self.prefixlen_v6,
            };
            match block.find_new_address(prefix, true) {
                Some(addr) => addresses.push(addr),
                None => return None,
            }
        }
        Some(addresses)
    }

    /// Declared network CIDR strings in canonical order.
    pub fn net_cidrs(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.blocks.keys().cloned().collect();
        keys.sort_by_key(|k| CidrBlock::new(k).ok().map(|b| b.network()));
        keys
    }

    /// WireGuard form of an address: host bits with the prefix of its
    /// owning network. `None` when the address is in no declared network.
    pub fn wg_address(&self, addr: &CidrBlock) -> Option<String> {
        self.find_block_for(addr).map(|b| b.wg_address(addr))
    }
}

impl Default for NetworkSpace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cidr(text: &str) -> CidrBlock {
        CidrBlock::new(text).unwrap()
    }

    #[test]
    fn test_add_subnet_then_supernet() {
        let mut space = NetworkSpace::new();

        assert!(space.add_cidr("10.0.0.0/24"));
        assert_eq!(space.len(), 1);

        // subnet of existing: no-op
        assert!(space.add_cidr("10.0.0.0/25"));
        assert_eq!(space.len(), 1);
        assert_eq!(space.net_cidrs(), vec!["10.0.0.0/24"]);

        // supernet of existing: expanded in place
        assert!(space.add_cidr("10.0.0.0/16"));
        assert_eq!(space.len(), 1);
        assert_eq!(space.net_cidrs(), vec!["10.0.0.0/16"]);
    }

    #[test]
    fn test_add_cidr_idempotent() {
        let mut space = NetworkSpace::new();
        assert!(space.add_cidr("10.77.77.0/24"));
        assert!(space.add_cidr("10.77.77.0/24"));
        assert_eq!(space.len(), 1);
        assert_eq!(space.net_cidrs(), vec!["10.77.77.0/24"]);
    }

    #[test]
    fn test_add_cidr_rejects_bad_input() {
        let mut space = NetworkSpace::new();
        assert!(!space.add_cidr("10.77.77.0/40"));
        assert!(!space.add_cidr(""));
        assert!(space.is_empty());
    }

    #[test]
    fn test_expansion_absorbs_covered_blocks() {
        let mut space = NetworkSpace::new();
        assert!(space.add_cidr("10.0.0.0/24"));
        assert!(space.add_cidr("10.1.0.0/24"));
        assert_eq!(space.len(), 2);

        // /8 grows the first block and swallows the second
        assert!(space.add_cidr("10.0.0.0/8"));
        assert_eq!(space.len(), 1);
        assert_eq!(space.net_cidrs(), vec!["10.0.0.0/8"]);
    }

    #[test]
    fn test_mark_and_availability() {
        let mut space = NetworkSpace::new();
        assert!(space.add_cidr("10.77.77.1/24"));
        assert!(space.add_cidr("fc00:77:77::1/64"));

        let taken = vec![cidr("10.77.77.2/32"), cidr("fc00:77:77::2/128")];
        assert!(space.mark_addresses_taken(&taken));
        assert!(!space.is_address_available(&cidr("10.77.77.2/32")));
        assert!(!space.is_address_available(&cidr("fc00:77:77::2/128")));
        assert!(space.is_address_available(&cidr("10.77.77.3/32")));

        // second replay of the same address fails the whole pass
        assert!(!space.mark_addresses_taken(&taken));

        // unknown network
        assert!(!space.mark_addresses_taken(&[cidr("192.168.1.1/32")]));
        assert!(!space.is_address_available(&cidr("192.168.1.1/32")));
    }

    #[test]
    fn test_find_new_addresses_one_per_family() {
        let mut space = NetworkSpace::new();
        assert!(space.add_cidr("10.77.77.1/24"));
        assert!(space.add_cidr("fc00:77:77::1/64"));

        let addrs = space.find_new_addresses().unwrap();
        assert_eq!(addrs.len(), 2);
        // canonical order: v4 first
        assert_eq!(addrs[0].to_string(), "10.77.77.2/32");
        assert_eq!(addrs[1].to_string(), "fc00:77:77::2/128");

        // marked as a side effect
        assert!(!space.is_address_available(&addrs[0]));
        assert!(!space.is_address_available(&addrs[1]));
    }

    #[test]
    fn test_find_new_addresses_exhausted() {
        let mut space = NetworkSpace::new();
        assert!(space.add_cidr("10.0.0.0/30"));

        assert!(space.find_new_addresses().is_some());
        assert!(space.find_new_addresses().is_some());
        assert!(space.find_new_addresses().is_none(), "block is full");
    }

    #[test]
    fn test_wg_address() {
        let mut space = NetworkSpace::new();
        assert!(space.add_cidr("10.77.77.1/24"));

        assert_eq!(
            space.wg_address(&cidr("10.77.77.5/32")).unwrap(),
            "10.77.77.5/24"
        );
        assert!(space.wg_address(&cidr("192.168.0.1/32")).is_none());
    }
}
