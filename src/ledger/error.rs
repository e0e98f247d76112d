use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("Payload decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("Payload encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("Invalid key format: {0}")]
    InvalidKey(String),

    #[error("Store is closing")]
    Closing,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
