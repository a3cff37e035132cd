use thiserror::Error;

/// Errors raised by the shared config/validation layer. Components carry
/// their own error enums; this one covers what the core crate itself owns.
#[derive(Debug, Error)]
pub enum Fr0gError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Fr0gError {
    /// Short error code string carried in HTTP error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Fr0gError::Config(_) => "CONFIG_ERROR",
            Fr0gError::Validation(_) => "VALIDATION_ERROR",
            Fr0gError::Serialization(_) => "SERIALIZATION_ERROR",
            Fr0gError::Io(_) => "IO_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, Fr0gError>;
