use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Memory not found: {key}")]
    NotFound { key: String },

    #[error("Memory expired: {key}")]
    Expired { key: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MemoryError>;
