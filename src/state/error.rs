use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Unknown deployment: {deployment}")]
    UnknownDeployment { deployment: String },

    #[error("Unknown node: {node}")]
    UnknownNode { node: String },

    #[error("Invalid deployment snapshot {path}: {reason}")]
    InvalidSnapshot { path: String, reason: String },

    #[error("State store backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
