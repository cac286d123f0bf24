//! Shared networks between peers.
//!
//! Peers declare networks they want routed to them and networks they
//! offer to route for others. For a pair of peers the "common nets" are
//! those wanted by one and offered by the other, collapsed so that when
//! one side's network is a subnet of the other's only the more specific
//! one is kept.
//!
//! The protocol has two phases: register every peer's lists on a
//! [`SharedNetworkRegistry`], then [`SharedNetworkRegistry::finish`] it
//! into a [`SharedNetworkResolver`]. The relation pass runs inside
//! `finish`, so a resolver can never be queried before it.

use itertools::Itertools;
use std::collections::HashSet;

use crate::models::{sort_cidr_strings, CidrBlock};

/// One network shared by some set of peers.
///
/// There is exactly one record per distinct CIDR string seen across all
/// peers' lists, so subnet/supernet relations between declarations can be
/// tracked on the records themselves.
#[derive(Debug, Clone)]
struct SharedNetwork {
    cidr: String,
    net: CidrBlock,
    wanted_by: Vec<String>,
    offered_by: Vec<String>,
    /// CIDR strings of registered networks this one lies inside.
    subnet_of: Vec<String>,
    /// CIDR strings of registered networks lying inside this one.
    supernet_of: Vec<String>,
}

impl SharedNetwork {
    fn new(cidr: &str, net: CidrBlock) -> SharedNetwork {
        SharedNetwork {
            cidr: cidr.to_string(),
            net,
            wanted_by: Vec::new(),
            offered_by: Vec::new(),
            subnet_of: Vec::new(),
            supernet_of: Vec::new(),
        }
    }

    fn add_wanted_by(&mut self, peer: &str) {
        if !self.wanted_by.iter().any(|p| p == peer) {
            self.wanted_by.push(peer.to_string());
        }
    }

    fn add_offered_by(&mut self, peer: &str) {
        if !self.offered_by.iter().any(|p| p == peer) {
            self.offered_by.push(peer.to_string());
        }
    }
}

/// Registration phase: collects every peer's wanted/offered lists.
#[derive(Debug, Default)]
pub struct SharedNetworkRegistry {
    shared: Vec<SharedNetwork>,
    /// CIDR strings that failed to parse during registration.
    parse_errors: Vec<String>,
}

impl SharedNetworkRegistry {
    pub fn new() -> SharedNetworkRegistry {
        SharedNetworkRegistry::default()
    }

    /// Register `cidrs` as wanted by `peer`.
    ///
    /// Unparseable entries are skipped and recorded; registration keeps
    /// going for the rest.
    pub fn add_wanted_by(&mut self, peer: &str, cidrs: &[String]) {
        for cidr in cidrs {
            if let Some(idx) = self.entry_for(cidr) {
                self.shared[idx].add_wanted_by(peer);
            }
        }
    }

    /// Register `cidrs` as offered by `peer`. Best-effort like
    /// [`SharedNetworkRegistry::add_wanted_by`].
    pub fn add_offered_by(&mut self, peer: &str, cidrs: &[String]) {
        for cidr in cidrs {
            if let Some(idx) = self.entry_for(cidr) {
                self.shared[idx].add_offered_by(peer);
            }
        }
    }

    /// Index of the record for `cidr`, creating it on first sight.
    fn entry_for(&mut self, cidr: &str) -> Option<usize> {
        if let Some(idx) = self.shared.iter().position(|s| s.cidr == cidr) {
            return Some(idx);
        }
        match CidrBlock::new(cidr) {
            Ok(net) => {
                self.shared.push(SharedNetwork::new(cidr, net));
                Some(self.shared.len() - 1)
            }
            Err(e) => {
                log::error!("invalid shared net '{cidr}': {e}");
                self.parse_errors.push(cidr.to_string());
                None
            }
        }
    }

    /// End registration: run the subnet/supernet relation pass and
    /// return the query-only resolver.
    ///
    /// The pass tests every unordered pair of distinct records in both
    /// directions; O(n²) over distinct CIDR strings, which stay in the
    /// tens in practice.
    pub fn finish(mut self) -> SharedNetworkResolver {
        let mut relations: Vec<(usize, usize)> = Vec::new();

        for (i, j) in (0..self.shared.len()).tuple_combinations() {
            let (one, two) = (&self.shared[i], &self.shared[j]);
            if one.net.is_subnet_of(&two.net) {
                relations.push((i, j));
            } else if two.net.is_subnet_of(&one.net) {
                relations.push((j, i));
            }
        }

        for (sub, sup) in relations {
            let sup_cidr = self.shared[sup].cidr.clone();
            let sub_cidr = self.shared[sub].cidr.clone();
            self.shared[sub].subnet_of.push(sup_cidr);
            self.shared[sup].supernet_of.push(sub_cidr);
        }

        SharedNetworkResolver {
            shared: self.shared,
            parse_errors: self.parse_errors,
        }
    }
}

/// Query phase: answers which networks a pair of peers share.
#[derive(Debug)]
pub struct SharedNetworkResolver {
    shared: Vec<SharedNetwork>,
    parse_errors: Vec<String>,
}

impl SharedNetworkResolver {
    /// CIDR strings that were skipped during registration.
    pub fn parse_errors(&self) -> &[String] {
        &self.parse_errors
    }

    /// Networks wanted by one peer and offered by the other, checked in
    /// both directions, as a canonically sorted set of CIDR strings.
    ///
    /// When one side's network is a subnet of the other's the more
    /// specific one is returned; overlapping networks with no containment
    /// relation are skipped.
    pub fn get_common_nets(&self, peer_a: &str, peer_b: &str) -> Vec<String> {
        if peer_a.is_empty() || peer_b.is_empty() {
            return Vec::new();
        }

        let mut nets: HashSet<String> = HashSet::new();
        self.common_nets(peer_a, peer_b, &mut nets);
        self.common_nets(peer_b, peer_a, &mut nets);

        let nets: Vec<String> = nets.into_iter().collect();
        sort_cidr_strings(&nets)
    }

    /// Collect nets wanted by `wanter` and offered by `offerer`.
    fn common_nets(&self, wanter: &str, offerer: &str, nets: &mut HashSet<String>) {
        let wanted = self.shared_wanted_by(wanter);
        let offered = self.shared_offered_by(offerer);

        for want in &wanted {
            for offer in &offered {
                if want.cidr == offer.cidr {
                    nets.insert(want.cidr.clone());
                } else if want.subnet_of.iter().any(|c| c == &offer.cidr) {
                    // wanted net is the more specific one
                    nets.insert(want.cidr.clone());
                } else if offer.subnet_of.iter().any(|c| c == &want.cidr) {
                    nets.insert(offer.cidr.clone());
                }
                // no relation: skipped
            }
        }
    }

    fn shared_wanted_by(&self, peer: &str) -> Vec<&SharedNetwork> {
        self.shared
            .iter()
            .filter(|s| s.wanted_by.iter().any(|p| p == peer))
            .collect()
    }

    fn shared_offered_by(&self, peer: &str) -> Vec<&SharedNetwork> {
        self.shared
            .iter()
            .filter(|s| s.offered_by.iter().any(|p| p == peer))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_identical_net_once() {
        let mut reg = SharedNetworkRegistry::new();
        reg.add_wanted_by("vpn0.a.laptop", &strs(&["10.0.0.0/24"]));
        reg.add_offered_by("vpn0.b.gw", &strs(&["10.0.0.0/24"]));
        let resolver = reg.finish();

        // exactly one entry despite the bidirectional check
        let nets = resolver.get_common_nets("vpn0.a.laptop", "vpn0.b.gw");
        assert_eq!(nets, vec!["10.0.0.0/24"]);
    }

    #[test]
    fn test_subnet_collapses_to_more_specific() {
        let mut reg = SharedNetworkRegistry::new();
        reg.add_offered_by("vpn0.a.gw", &strs(&["192.168.1.0/24"]));
        reg.add_wanted_by("vpn0.b.laptop", &strs(&["192.168.1.0/25"]));
        let resolver = reg.finish();

        let nets = resolver.get_common_nets("vpn0.a.gw", "vpn0.b.laptop");
        assert_eq!(nets, vec!["192.168.1.0/25"]);

        // offered side being the more specific works too
        let mut reg = SharedNetworkRegistry::new();
        reg.add_offered_by("vpn0.a.gw", &strs(&["192.168.1.0/25"]));
        reg.add_wanted_by("vpn0.b.laptop", &strs(&["192.168.1.0/24"]));
        let resolver = reg.finish();

        let nets = resolver.get_common_nets("vpn0.a.gw", "vpn0.b.laptop");
        assert_eq!(nets, vec!["192.168.1.0/25"]);
    }

    #[test]
    fn test_symmetric() {
        let mut reg = SharedNetworkRegistry::new();
        reg.add_wanted_by("vpn0.a.laptop", &strs(&["10.1.0.0/16", "fc00:1::/64"]));
        reg.add_offered_by("vpn0.a.laptop", &strs(&["172.16.0.0/12"]));
        reg.add_offered_by("vpn0.b.gw", &strs(&["10.1.2.0/24", "fc00:1::/64"]));
        reg.add_wanted_by("vpn0.b.gw", &strs(&["172.16.5.0/24"]));
        let resolver = reg.finish();

        let ab = resolver.get_common_nets("vpn0.a.laptop", "vpn0.b.gw");
        let ba = resolver.get_common_nets("vpn0.b.gw", "vpn0.a.laptop");
        assert_eq!(ab, ba);
        assert_eq!(ab, vec!["10.1.2.0/24", "172.16.5.0/24", "fc00:1::/64"]);
    }

    #[test]
    fn test_overlap_without_containment_skipped() {
        // same-prefix different networks: nothing in common
        let mut reg = SharedNetworkRegistry::new();
        reg.add_wanted_by("vpn0.a.laptop", &strs(&["10.1.0.0/24"]));
        reg.add_offered_by("vpn0.b.gw", &strs(&["10.2.0.0/24"]));
        let resolver = reg.finish();

        assert!(resolver
            .get_common_nets("vpn0.a.laptop", "vpn0.b.gw")
            .is_empty());
    }

    #[test]
    fn test_wrong_direction_not_shared() {
        // both peers *want* the same net; nobody offers it
        let mut reg = SharedNetworkRegistry::new();
        reg.add_wanted_by("vpn0.a.laptop", &strs(&["10.1.0.0/24"]));
        reg.add_wanted_by("vpn0.b.gw", &strs(&["10.1.0.0/24"]));
        let resolver = reg.finish();

        assert!(resolver
            .get_common_nets("vpn0.a.laptop", "vpn0.b.gw")
            .is_empty());
    }

    #[test]
    fn test_bad_cidr_recorded_and_skipped() {
        let mut reg = SharedNetworkRegistry::new();
        reg.add_wanted_by(
            "vpn0.a.laptop",
            &strs(&["not-a-net", "10.1.0.0/24"]),
        );
        reg.add_offered_by("vpn0.b.gw", &strs(&["10.1.0.0/24"]));
        let resolver = reg.finish();

        assert_eq!(resolver.parse_errors(), &["not-a-net".to_string()]);
        // valid entries still registered
        assert_eq!(
            resolver.get_common_nets("vpn0.a.laptop", "vpn0.b.gw"),
            vec!["10.1.0.0/24"]
        );
    }

    #[test]
    fn test_multiple_offerers_of_nested_nets() {
        // a wants the wide net; two gateways offer nested pieces
        let mut reg = SharedNetworkRegistry::new();
        reg.add_wanted_by("vpn0.a.laptop", &strs(&["10.0.0.0/8"]));
        reg.add_offered_by("vpn0.b.gw", &strs(&["10.1.0.0/16"]));
        reg.add_offered_by("vpn0.c.gw", &strs(&["10.2.0.0/16"]));
        let resolver = reg.finish();

        assert_eq!(
            resolver.get_common_nets("vpn0.a.laptop", "vpn0.b.gw"),
            vec!["10.1.0.0/16"]
        );
        assert_eq!(
            resolver.get_common_nets("vpn0.a.laptop", "vpn0.c.gw"),
            vec!["10.2.0.0/16"]
        );
    }

    #[test]
    fn test_empty_peer_id() {
        let reg = SharedNetworkRegistry::new();
        let resolver = reg.finish();
        assert!(resolver.get_common_nets("", "vpn0.b.gw").is_empty());
    }
}
