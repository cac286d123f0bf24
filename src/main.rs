use std::error::Error;
use std::path::Path;

use wg_fleet_config::output::{fleet_listing, ConfigEmitter};
use wg_fleet_config::{load_fleet, rebuild_state};

fn main() -> Result<(), Box<dyn Error>> {
    // Do as little as possible in main.rs as it can't contain any tests
    log4rs::init_file("log4rs.yml", Default::default()).expect("Error initializing log4rs");

    log::info!("#Start main()");

    let mut args = std::env::args().skip(1);
    let fleet_path = args.next().unwrap_or_else(|| "fleet.toml".to_string());
    let out_dir = args.next().unwrap_or_else(|| "configs".to_string());

    let fleet = load_fleet(&fleet_path)?;
    let state = rebuild_state(&fleet)?;

    print!("{}", fleet_listing(&fleet.vpn, &fleet.peers));

    let emitter = ConfigEmitter::new(&fleet.vpn, &fleet.peers, &state);
    for config in emitter.render_all() {
        let dir = Path::new(&out_dir).join(&config.account);
        std::fs::create_dir_all(&dir)
            .map_err(|e| format!("Error making dir {}: {e}", dir.display()))?;

        let fpath = dir.join(format!("{}.conf", config.profile));
        std::fs::write(&fpath, &config.data)
            .map_err(|e| format!("Error writing wg config {}: {e}", fpath.display()))?;
        log::info!("wrote {}", fpath.display());
    }

    Ok(())
}
