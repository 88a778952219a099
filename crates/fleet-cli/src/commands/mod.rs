pub mod config;
pub mod run;
pub mod teardown;

use fleet_core::Config;
use std::path::Path;

/// Load the config from `path`, or from the default location.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::load_from(path),
        None => Config::load_default(),
    };
    config.map_err(|e| {
        anyhow::anyhow!(
            "{} (run `compas-fleet config --init` for a sample config)",
            e
        )
    })
}
