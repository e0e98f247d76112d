use crate::humanize::{ByteSize, HumanDuration};
use crate::ledger::{RetentionPolicy, StoreOptions};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Service name used in log lines
    #[serde(default = "default_ident")]
    pub ident: String,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub udp: UdpConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ident: default_ident(),
            log: LogConfig::default(),
            store: StoreConfig::default(),
            udp: UdpConfig::default(),
            api: ApiConfig::default(),
            retention: RetentionConfig::default(),
        }
    }
}

impl Config {
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            cache_size: self.store.cache_size.as_u64(),
            write_buffer_size: self.store.write_buffer_size.as_u64(),
            block_size: u32::try_from(self.store.block_size.as_u64()).unwrap_or(u32::MAX),
        }
    }

    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy::builder()
            .retention(self.retention.retention.as_duration())
            .min_window(self.retention.min_window.as_duration())
            .batch_limit(self.retention.batch_limit)
            .interval(self.retention.sweep_interval.as_duration())
            .startup_delay(self.retention.startup_delay.as_duration())
            .build()
    }
}

fn default_ident() -> String {
    "zonelog".to_string()
}

/// Logging configuration; `RUST_LOG` overrides `level`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Ledger store location and fjall tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Keyspace directory, created when missing
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    #[serde(default = "default_cache_size")]
    pub cache_size: ByteSize,
    #[serde(default = "default_write_buffer_size")]
    pub write_buffer_size: ByteSize,
    #[serde(default = "default_block_size")]
    pub block_size: ByteSize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            cache_size: default_cache_size(),
            write_buffer_size: default_write_buffer_size(),
            block_size: default_block_size(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("data")
}

fn default_cache_size() -> ByteSize {
    ByteSize(32 * ByteSize::MB)
}

fn default_write_buffer_size() -> ByteSize {
    ByteSize(60 * ByteSize::MB)
}

fn default_block_size() -> ByteSize {
    ByteSize(4 * ByteSize::KB)
}

/// Datagram listener
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UdpConfig {
    #[serde(default = "default_udp_bind_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_udp_bind_addr(),
        }
    }
}

fn default_udp_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 31239))
}

/// Query API listener
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_bind_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_api_bind_addr(),
        }
    }
}

fn default_api_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5388))
}

/// Retention sweeper schedule
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    #[serde(default = "default_retention")]
    pub retention: HumanDuration,
    #[serde(default = "default_min_window")]
    pub min_window: HumanDuration,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: HumanDuration,
    #[serde(default = "default_startup_delay")]
    pub startup_delay: HumanDuration,
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            retention: default_retention(),
            min_window: default_min_window(),
            sweep_interval: default_sweep_interval(),
            startup_delay: default_startup_delay(),
            batch_limit: default_batch_limit(),
        }
    }
}

fn default_retention() -> HumanDuration {
    HumanDuration::from_secs(7 * 24 * 60 * 60)
}

fn default_min_window() -> HumanDuration {
    HumanDuration::from_secs(10)
}

fn default_sweep_interval() -> HumanDuration {
    HumanDuration::from_secs(15)
}

fn default_startup_delay() -> HumanDuration {
    HumanDuration::from_secs(1)
}

fn default_batch_limit() -> usize {
    crate::ledger::pruning::DEFAULT_BATCH_LIMIT
}
