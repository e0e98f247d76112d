use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "ZONELOG_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/zonelog.toml";
const ENV_PREFIX: &str = "ZONELOG";
const ENV_SEPARATOR: &str = "__";

/// Path of the TOML file: `$ZONELOG_CONFIG` or `config/zonelog.toml`
pub fn default_path() -> PathBuf {
    env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Read `.env` into the environment, then load from the default path
pub fn load() -> Result<Config, ConfigError> {
    // A missing .env is the normal case
    let _ = dotenvy::dotenv();

    load_from_sources(default_path())
}

/// Merge the TOML file at `config_path` (optional) with `ZONELOG__*` variables
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!(path = %config_path.display(), "Loading configuration file");
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            path = %config_path.display(),
            "No configuration file, using defaults and environment"
        );
    }

    // ZONELOG__RETENTION__BATCH_LIMIT -> retention.batch_limit
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}
