use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Stream is not connected")]
    NotConnected,

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Malformed envelope: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Unexpected payload kind: {0}")]
    UnexpectedPayload(String),

    #[error("Send queue is full")]
    Backpressure,

    #[error("Stream closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, StreamError>;
