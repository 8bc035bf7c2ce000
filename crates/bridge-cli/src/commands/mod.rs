//! Command handler modules for the bridge CLI.

pub mod replay;

use anyhow::Result;
use bridge_config::LoadedConfig;

/// Load layered config from CLI path arguments.
pub fn load_config(paths: &[String]) -> Result<LoadedConfig> {
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    bridge_config::load_layered_yaml(&path_refs)
}
