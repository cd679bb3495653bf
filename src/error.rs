use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlockError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Genesis block payload is not application data")]
    GenesisAccess,

    #[error("Corrupt payload: {0}")]
    CorruptPayload(String),
}

pub type Result<T> = std::result::Result<T, BlockError>;
