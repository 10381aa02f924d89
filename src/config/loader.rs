use anyhow::Result;
use config::{Config, Environment, File};
use std::path::Path;
use tracing::{debug, info};

use super::AppConfig;
use crate::error::ForecastError;

const ENV_PREFIX: &str = "FXCAST";

/// Defaults, then the optional TOML file, then `FXCAST__SECTION__KEY` variables
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let defaults = Config::try_from(&AppConfig::default())?;

    if path.exists() {
        info!("Loading configuration from {}", path.display());
    } else {
        debug!("No configuration file at {}, using defaults", path.display());
    }

    let settings = Config::builder()
        .add_source(defaults)
        .add_source(File::from(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("source.quote_currencies"),
        )
        .build()?;

    let config: AppConfig = settings.try_deserialize()?;
    config
        .validate()
        .map_err(ForecastError::InvalidConfig)?;

    Ok(config)
}

/// Render the default configuration as TOML
pub fn default_config_toml() -> Result<String> {
    Ok(toml::to_string_pretty(&AppConfig::default())?)
}
