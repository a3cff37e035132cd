use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommunityError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("AIP rejected request ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Unknown community: {id}")]
    UnknownCommunity { id: String },

    #[error("Unknown review: {id}")]
    UnknownReview { id: String },

    #[error("Malformed response: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, CommunityError>;
