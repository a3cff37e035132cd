use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Registry rejected request ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("No healthy instances of service: {name}")]
    NoHealthyInstances { name: String },

    #[error("Malformed registry response: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
