//! Reading configuration files.

use std::path::Path;

use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::types::PortcullisConfig;

/// Load and parse config from a specific file path.
pub fn load_config_file(path: &Path) -> Result<PortcullisConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    let config = PortcullisConfig::from_toml(&contents)?;
    debug!(path = %path.display(), rules = config.rules.len(), "Loaded config file");
    Ok(config)
}
