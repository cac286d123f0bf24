//! Fleet file reading.
//!
//! The fleet file is the authoritative record: one VPN declaration plus
//! every peer profile. The tool only ever reads it - allocator state is
//! rebuilt from it on each run and never written anywhere.

use std::error::Error;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::models::{PeerProfile, VpnDeclaration};

/// Parsed fleet file: the VPN declaration and its peers.
#[derive(Debug, Deserialize, Serialize)]
pub struct FleetFile {
    pub vpn: VpnDeclaration,
    #[serde(default, rename = "peer")]
    pub peers: Vec<PeerProfile>,
}

/// Read and validate a fleet file.
///
/// # Arguments
/// * `fleet_file` - Path to the TOML fleet file
///
/// # Returns
/// * `Ok(FleetFile)` - The parsed and validated fleet data
/// * `Err` - If the file is missing, unparseable, or fails validation
pub fn read_fleet_file(fleet_file: &str) -> Result<FleetFile, Box<dyn Error>> {
    if !Path::new(fleet_file).exists() {
        return Err(format!("Fleet file does not exist: {fleet_file}").into());
    }

    log::info!("Reading fleet file: {fleet_file}");
    let text = std::fs::read_to_string(fleet_file)
        .map_err(|e| format!("Error reading fleet file {fleet_file}: {e}"))?;

    fleet_from_str(&text).map_err(|e| format!("Error in fleet file {fleet_file}: {e}").into())
}

/// Parse fleet data from TOML text and validate it.
pub fn fleet_from_str(text: &str) -> Result<FleetFile, Box<dyn Error>> {
    let fleet: FleetFile = toml::from_str(text)?;

    fleet.vpn.validate()?;
    for peer in &fleet.peers {
        peer.ident(&fleet.vpn.name)?;
    }

    Ok(fleet)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_fleet_file() {
        let fleet = read_fleet_file("src/tests/test_data/fleet_test_01.toml")
            .expect("Error reading fleet file");
        assert_eq!(fleet.vpn.name, "vpn0");
        assert_eq!(fleet.vpn.networks.len(), 2);
        assert_eq!(fleet.peers.len(), 4);
    }

    #[test]
    fn test_read_fleet_file_missing() {
        assert!(read_fleet_file("src/tests/test_data/no_such_file.toml").is_err());
    }

    #[test]
    fn test_fleet_from_str_validates_vpn() {
        let result = fleet_from_str(
            r#"
            [vpn]
            name = "vpn0"
            networks = []
            "#,
        );
        assert!(result.is_err(), "empty networks must not load");
    }

    #[test]
    fn test_fleet_from_str_validates_peer_ids() {
        let result = fleet_from_str(
            r#"
            [vpn]
            name = "vpn0"
            networks = ["10.77.77.0/24"]

            [[peer]]
            account = "bad.account"
            profile = "laptop"
            "#,
        );
        assert!(result.is_err(), "dotted account name must not load");
    }

    #[test]
    fn test_fleet_with_no_peers() {
        let fleet = fleet_from_str(
            r#"
            [vpn]
            name = "vpn0"
            networks = ["10.77.77.0/24"]
            "#,
        )
        .unwrap();
        assert!(fleet.peers.is_empty());
    }
}
