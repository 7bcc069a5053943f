//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::WeftConfig;
use std::path::Path;

/// The configuration file name looked up in a project directory.
pub const CONFIG_FILE_NAME: &str = "weft.toml";

/// Loads and validates `<project_dir>/weft.toml`.
///
/// A missing file is not an error; it yields the default configuration.
pub fn load_config(project_dir: &Path) -> Result<WeftConfig, ConfigError> {
    let config_path = project_dir.join(CONFIG_FILE_NAME);
    let content = match std::fs::read_to_string(&config_path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(WeftConfig::default()),
        Err(e) => return Err(e.into()),
    };
    load_config_from_str(&content)
}

/// Parses and validates a `weft.toml` configuration from a string.
pub fn load_config_from_str(content: &str) -> Result<WeftConfig, ConfigError> {
    let config: WeftConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &WeftConfig) -> Result<(), ConfigError> {
    if let Some(dir) = &config.driver.base_directory {
        if dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "driver.base_directory must not be empty".to_string(),
            ));
        }
    }
    if config.events.enabled && config.events.path.is_none() {
        return Err(ConfigError::ValidationError(
            "events.enabled requires events.path".to_string(),
        ));
    }
    if let Some(name) = config.generators.keys().find(|name| name.trim().is_empty()) {
        return Err(ConfigError::ValidationError(format!(
            "generator name '{name}' is blank"
        )));
    }
    Ok(())
}
