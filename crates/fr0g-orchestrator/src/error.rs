use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Unknown strategy: {id}")]
    UnknownStrategy { id: String },

    #[error("Workflow capacity exhausted (max {max})")]
    CapacityExhausted { max: usize },

    #[error("Workflow cancelled")]
    Cancelled,

    #[error("Community review failed: {0}")]
    Community(#[from] fr0g_community::CommunityError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
