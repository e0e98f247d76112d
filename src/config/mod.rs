//! Layered settings: struct defaults, then the TOML file, then `.env`, then
//! the process environment.
//!
//! Any key can be overridden as `ZONELOG__<SECTION>__<KEY>`:
//! - `ZONELOG__UDP__BIND_ADDR=0.0.0.0:41239`
//! - `ZONELOG__STORE__CACHE_SIZE=64MB`
//! - `ZONELOG__RETENTION__RETENTION=3d`
//!
//! The file is `config/zonelog.toml` unless `ZONELOG_CONFIG` points elsewhere.
//! Sizes and durations accept human units, see [`crate::humanize`].

mod models;
mod sources;
mod validation;

pub use crate::humanize::{ByteSize, HumanDuration};
pub use models::{ApiConfig, Config, LogConfig, RetentionConfig, StoreConfig, UdpConfig};
pub use sources::default_path;
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load from the default file location plus environment, then validate
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path, still applying environment
    /// overrides
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}
