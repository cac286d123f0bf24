//! The fleet data source.
//!
//! - [`fleet`] - reading and validating the TOML fleet file

mod fleet;

// Re-export public types and functions
pub use fleet::{fleet_from_str, read_fleet_file, FleetFile};
