use std::path::Path;

use crate::{Config, Error};

/// Load and parse a GuardianBridge TOML configuration file.
pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, Error> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;

    Ok(config)
}
