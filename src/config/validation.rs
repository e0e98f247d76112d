use super::models::Config;
use crate::humanize::ByteSize;
use thiserror::Error;

const MIN_BLOCK_SIZE: u64 = ByteSize::KB;
const MAX_BLOCK_SIZE: u64 = 512 * ByteSize::KB;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Duration must be positive: {field}")]
    ZeroDuration { field: &'static str },

    #[error("retention.batch_limit must be at least 1")]
    InvalidBatchLimit,

    #[error("store.block_size ({actual}) must be between 1KB and 512KB")]
    BlockSizeOutOfRange { actual: ByteSize },

    #[error("store.path must not be empty")]
    EmptyStorePath,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_store(config)?;
    validate_retention(config)?;
    Ok(())
}

fn validate_store(config: &Config) -> Result<(), ValidationError> {
    if config.store.path.as_os_str().is_empty() {
        return Err(ValidationError::EmptyStorePath);
    }

    let block_size = config.store.block_size;
    if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&block_size.as_u64()) {
        return Err(ValidationError::BlockSizeOutOfRange { actual: block_size });
    }

    Ok(())
}

fn validate_retention(config: &Config) -> Result<(), ValidationError> {
    let retention = &config.retention;

    if retention.retention.is_zero() {
        return Err(ValidationError::ZeroDuration {
            field: "retention.retention",
        });
    }
    if retention.sweep_interval.is_zero() {
        return Err(ValidationError::ZeroDuration {
            field: "retention.sweep_interval",
        });
    }
    if retention.batch_limit == 0 {
        return Err(ValidationError::InvalidBatchLimit);
    }

    Ok(())
}
