use thiserror::Error;

pub type Result<T> = std::result::Result<T, NetcontrolError>;

#[derive(Debug, Error)]
pub enum NetcontrolError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("unknown control command: {0:?}")]
    UnknownCommand(String),
    #[error("malformed control response: {0}")]
    MalformedResponse(String),
    #[error("malformed counter snapshot: {0}")]
    MalformedSnapshot(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("graph inconsistency: {0}")]
    Graph(String),
}
