use thiserror::Error;

#[derive(Debug, Error)]
pub enum VectorError {
    #[error("Processor already running: {channel}")]
    AlreadyRunning { channel: String },

    #[error("Processor not running: {channel}")]
    NotRunning { channel: String },

    #[error("Processor disabled: {channel}")]
    Disabled { channel: String },

    #[error("Bad pattern definition: {0}")]
    Pattern(#[from] regex::Error),
}

pub type Result<T> = std::result::Result<T, VectorError>;
