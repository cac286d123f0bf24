//! WireGuard config rendering.
//!
//! Builds the `[Interface]` and `[Peer]` config text for every peer in
//! the fleet. A gateway's config carries a peer section for every other
//! peer; a client's config carries one per gateway only.

use chrono::Local;

use crate::models::{
    compact, internet_networks, sort_cidr_strings, CidrBlock, PeerProfile, VpnDeclaration,
};
use crate::processing::VpnState;

/// Up to `size` items per line, comma separated.
fn csv_sublists(items: &[String], size: usize) -> Vec<String> {
    items.chunks(size).map(|chunk| chunk.join(", ")).collect()
}

/// One rendered config ready to be written out.
#[derive(Debug)]
pub struct RenderedConfig {
    pub account: String,
    pub profile: String,
    pub data: String,
}

/// Renders WireGuard configs from rebuilt VPN state.
pub struct ConfigEmitter<'a> {
    decl: &'a VpnDeclaration,
    peers: &'a [PeerProfile],
    state: &'a VpnState,
}

impl<'a> ConfigEmitter<'a> {
    pub fn new(
        decl: &'a VpnDeclaration,
        peers: &'a [PeerProfile],
        state: &'a VpnState,
    ) -> ConfigEmitter<'a> {
        ConfigEmitter { decl, peers, state }
    }

    /// Render a config for every active peer.
    pub fn render_all(&self) -> Vec<RenderedConfig> {
        self.peers
            .iter()
            .filter(|p| p.active)
            .map(|p| RenderedConfig {
                account: p.account.clone(),
                profile: p.profile.clone(),
                data: self.render_for(p),
            })
            .collect()
    }

    /// Render the full config text for one peer.
    pub fn render_for(&self, prof: &PeerProfile) -> String {
        let mut data = file_header(&self.decl.name, prof);

        data.push_str(&self.interface_section(prof));
        data.push('\n');

        // gateway peer sections first
        let mut gw_data = String::new();
        for other in self.other_peers(prof, true) {
            gw_data.push_str(&self.peer_section(prof, other));
        }
        if !gw_data.is_empty() {
            data.push_str("#\n# Gateways\n#\n");
            data.push_str(&gw_data);
        }

        // clients appear only in gateway configs
        if prof.is_gateway() {
            let mut cl_data = String::new();
            for other in self.other_peers(prof, false) {
                cl_data.push_str(&self.peer_section(prof, other));
            }
            if !cl_data.is_empty() {
                data.push_str("\n#\n# Clients\n#\n");
                data.push_str(&cl_data);
            }
        }

        data
    }

    /// Active peers other than `me`, filtered by role.
    fn other_peers(&self, me: &PeerProfile, gateways: bool) -> Vec<&PeerProfile> {
        self.peers
            .iter()
            .filter(|p| p.active && p.is_gateway() == gateways)
            .filter(|p| !(p.account == me.account && p.profile == me.profile))
            .collect()
    }

    fn interface_section(&self, prof: &PeerProfile) -> String {
        let mut data = format!("{:<20} # {}\n", "[Interface]", peer_info(prof));

        if prof.private_key.is_empty() {
            log::warn!("{} missing a private key", peer_info(prof));
        }
        data.push_str(&format!("{:<20} = {}\n", "PrivateKey", prof.private_key));

        if prof.is_gateway() {
            data.push_str(&format!("{:<20} = {}\n", "ListenPort", prof.listen_port()));

            // gateways use the wg address form: host bits, network prefix
            let addresses: Vec<String> = prof
                .address
                .iter()
                .filter_map(|a| self.state.space.wg_address(a))
                .collect();
            if addresses.len() < prof.address.len() {
                log::error!("{} has addresses outside the vpn networks", peer_info(prof));
            }
            for line in csv_sublists(&addresses, 3) {
                data.push_str(&format!("{:<20} = {}\n", "Address", line));
            }
        } else {
            let addresses: Vec<String> = prof.address.iter().map(|a| a.to_string()).collect();
            for line in csv_sublists(&addresses, 3) {
                data.push_str(&format!("{:<20} = {}\n", "Address", line));
            }

            // wireguard overloads DNS: IPs are servers, names are search
            // domains; both are emitted as given
            for dns in self.client_dns(prof) {
                data.push_str(&format!("{:<20} = {}\n", "DNS", dns));
            }
        }

        if !prof.mtu.is_empty() {
            data.push_str(&format!("{:<20} = {}\n", "MTU", prof.mtu));
        }

        data
    }

    /// Profile DNS first, then the VPN's, duplicates dropped keeping
    /// order, search domains appended.
    fn client_dns(&self, prof: &PeerProfile) -> Vec<String> {
        let mut clean: Vec<String> = Vec::new();
        for item in prof.dns.iter().chain(self.decl.dns.iter()) {
            if !clean.contains(item) {
                clean.push(item.clone());
            }
        }
        for item in prof.dns_search.iter().chain(self.decl.dns_search.iter()) {
            if !clean.contains(item) {
                clean.push(item.clone());
            }
        }
        clean
    }

    fn peer_section(&self, me: &PeerProfile, other: &PeerProfile) -> String {
        let mut data = String::from("\n");
        data.push_str(&format!("{:<20} # {}\n", "[Peer]", peer_info(other)));
        data.push_str(&format!("{:<20} = {}\n", "PublicKey", other.public_key));

        if !me.is_gateway() && other.persistent_keepalive > 0 {
            data.push_str(&format!(
                "{:<20} = {}\n",
                "PersistentKeepalive", other.persistent_keepalive
            ));
        }

        let (allowed, pre_compact) = self.allowed_ips(me, other);
        if let Some(pre) = pre_compact {
            for line in csv_sublists(&pre, 3) {
                data.push_str(&format!("# {:<20} {}\n", "pre-compacted", line));
            }
        }
        for line in csv_sublists(&allowed, 3) {
            data.push_str(&format!("{:<20} = {}\n", "AllowedIPs", line));
        }

        if other.is_gateway() {
            data.push_str(&format!("{:<20} = {}\n", "Endpoint", other.endpoint));
        }

        data
    }

    /// The AllowedIPs list for peer `other` inside `me`'s config, plus
    /// the pre-compaction list when compaction shrank it.
    fn allowed_ips(&self, me: &PeerProfile, other: &PeerProfile) -> (Vec<String>, Option<Vec<String>>) {
        let mut allowed: Vec<String> = if self.decl.peer_to_peer {
            self.state.space.net_cidrs()
        } else {
            other.address.iter().map(|a| a.to_string()).collect()
        };

        let internet_via_other = if me.is_gateway() {
            other.internet_offered && !me.internet_offered
        } else {
            me.internet_wanted && other.internet_offered
        };
        if internet_via_other {
            allowed.extend(internet_networks());
        }

        match (me.ident(&self.decl.name), other.ident(&self.decl.name)) {
            (Ok(me_id), Ok(other_id)) => {
                allowed.extend(
                    self.state
                        .shared
                        .get_common_nets(&me_id.to_string(), &other_id.to_string()),
                );
            }
            _ => log::error!("bad peer identity, skipping shared nets"),
        }

        let mut allowed = sort_cidr_strings(&allowed);
        allowed.dedup();

        let blocks: Vec<CidrBlock> = allowed
            .iter()
            .filter_map(|s| CidrBlock::new(s).ok())
            .collect();
        let compacted = compact(&blocks);

        if compacted.len() < blocks.len() {
            let compact_strs = compacted.iter().map(|b| b.to_string()).collect();
            (compact_strs, Some(allowed))
        } else {
            (allowed, None)
        }
    }
}

fn peer_info(prof: &PeerProfile) -> String {
    let mut info = format!("{} {}", prof.account, prof.profile);
    if prof.is_gateway() {
        info.push_str(" (gateway)");
    }
    info
}

fn file_header(vpn_name: &str, prof: &PeerProfile) -> String {
    let now = Local::now().format("%Y-%m-%d %H:%M:%S");

    let mut title = String::from("#\n");
    title.push_str(&format!("# vpn-name     : {vpn_name}\n"));
    title.push_str(&format!("# account-name : {}\n", prof.account));
    title.push_str(&format!("# profile-name : {}\n", prof.profile));
    title.push_str(&format!("# is-gateway   : {}\n", prof.is_gateway()));
    title.push_str(&format!("# date         : {now}\n"));
    title.push_str("#\n\n");
    title
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::rebuild_vpn_state;
    use crate::store::fleet_from_str;

    const FLEET: &str = r#"
        [vpn]
        name = "vpn0"
        networks = ["10.77.77.1/24", "fc00:77:77::1/64"]
        dns = ["10.77.77.2"]

        [[peer]]
        account = "hq"
        profile = "gw"
        address = ["10.77.77.2/32", "fc00:77:77::2/128"]
        private_key = "privkey-hq"
        public_key = "pubkey-hq"
        endpoint = "gw.example.com:51820"
        persistent_keepalive = 25
        internet_offered = true
        internet_wanted = false
        nets_offered = ["192.168.10.0/24"]

        [[peer]]
        account = "bob"
        profile = "laptop"
        address = ["10.77.77.3/32", "fc00:77:77::3/128"]
        private_key = "privkey-bob"
        public_key = "pubkey-bob"
        nets_wanted = ["192.168.10.0/25"]
        internet_wanted = false

        [[peer]]
        account = "carol"
        profile = "phone"
        address = ["10.77.77.4/32", "fc00:77:77::4/128"]
        private_key = "privkey-carol"
        public_key = "pubkey-carol"
    "#;

    fn render(account: &str) -> String {
        let fleet = fleet_from_str(FLEET).unwrap();
        let state = rebuild_vpn_state(&fleet.vpn, &fleet.peers).unwrap();
        let emitter = ConfigEmitter::new(&fleet.vpn, &fleet.peers, &state);
        let prof = fleet.peers.iter().find(|p| p.account == account).unwrap();
        emitter.render_for(prof)
    }

    #[test]
    fn test_client_config_lists_gateways_only() {
        let config = render("bob");

        assert!(config.contains("# vpn-name     : vpn0"));
        assert!(config.contains("# is-gateway   : false"));
        assert!(config.contains("PrivateKey"));
        assert!(config.contains("privkey-bob"));
        assert!(config.contains("pubkey-hq"));
        // no client peers in a client config
        assert!(!config.contains("pubkey-carol"));
        assert!(!config.contains("# Clients"));

        // plain address form plus vpn dns
        assert!(config.contains("Address              = 10.77.77.3/32, fc00:77:77::3/128"));
        assert!(config.contains("DNS                  = 10.77.77.2"));

        // gateway endpoint and its keepalive
        assert!(config.contains("Endpoint             = gw.example.com:51820"));
        assert!(config.contains("PersistentKeepalive  = 25"));

        // wanted subnet of the offered net: the more specific /25
        assert!(config.contains("192.168.10.0/25"));
    }

    #[test]
    fn test_gateway_config_lists_everyone() {
        let config = render("hq");

        assert!(config.contains("# is-gateway   : true"));
        assert!(config.contains("ListenPort           = 51820"));
        // wg address form: host bits with the network prefix
        assert!(config.contains("Address              = 10.77.77.2/24, fc00:77:77::2/64"));
        // gateways do not get DNS lines
        assert!(!config.contains("\nDNS"));

        assert!(config.contains("# Clients"));
        assert!(config.contains("pubkey-bob"));
        assert!(config.contains("pubkey-carol"));
        // gateway-owned configs carry no keepalive
        assert!(!config.contains("PersistentKeepalive"));
    }

    #[test]
    fn test_internet_route_compacts_allowed_ips() {
        // carol wants internet, hq offers it: the default routes swallow
        // everything else and compaction kicks in
        let config = render("carol");

        assert!(config.contains("AllowedIPs           = 0.0.0.0/0, ::/0"));
        assert!(config.contains("# pre-compacted"));
        assert!(config.contains("# pre-compacted        0.0.0.0/0, 10.77.77.2/32, ::/0"));
    }

    #[test]
    fn test_no_compaction_comment_when_nothing_shrinks() {
        // bob declined internet; his hq peer section stays uncompacted
        let config = render("bob");
        assert!(!config.contains("pre-compacted"));
        assert!(config.contains("AllowedIPs           = 10.77.77.2/32, 192.168.10.0/25, fc00:77:77::2/128"));
    }

    #[test]
    fn test_peer_to_peer_uses_vpn_networks() {
        let fleet_text = FLEET.replace(
            "networks = [",
            "peer_to_peer = true\n        networks = [",
        );
        let fleet = fleet_from_str(&fleet_text).unwrap();
        assert!(fleet.vpn.peer_to_peer);

        let state = rebuild_vpn_state(&fleet.vpn, &fleet.peers).unwrap();
        let emitter = ConfigEmitter::new(&fleet.vpn, &fleet.peers, &state);
        let bob = fleet.peers.iter().find(|p| p.account == "bob").unwrap();
        let config = emitter.render_for(bob);

        assert!(config.contains("AllowedIPs           = 10.77.77.0/24, 192.168.10.0/25, fc00:77:77::/64"));
    }

    #[test]
    fn test_render_all_skips_inactive() {
        let fleet_text = format!(
            "{FLEET}
        [[peer]]
        account = \"gone\"
        profile = \"laptop\"
        address = [\"10.77.77.9/32\", \"fc00:77:77::9/128\"]
        active = false
        "
        );
        let fleet = fleet_from_str(&fleet_text).unwrap();
        let state = rebuild_vpn_state(&fleet.vpn, &fleet.peers).unwrap();
        let emitter = ConfigEmitter::new(&fleet.vpn, &fleet.peers, &state);

        let configs = emitter.render_all();
        assert_eq!(configs.len(), 3);
        assert!(configs.iter().all(|c| c.account != "gone"));
    }
}
