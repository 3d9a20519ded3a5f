use crate::runtime::ProcessError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Invalid playbook source '{spec}': {reason}")]
    InvalidSpec { spec: String, reason: String },

    #[error("Failed to acquire cache lock {path}: {reason}")]
    Lock { path: String, reason: String },

    #[error("Failed to mkdir {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to get {spec} for role {role}: {output}")]
    Install {
        spec: String,
        role: String,
        output: String,
    },

    #[error("Failed to git {url} into {path}: {reason}")]
    Clone {
        url: String,
        path: String,
        reason: String,
    },

    #[error("Failed to copy {from} to {to}: {reason}")]
    Copy {
        from: String,
        to: String,
        reason: String,
    },

    #[error(transparent)]
    Command(#[from] ProcessError),
}

/// A `playbook_src_setup` action exited non-zero
#[derive(Debug, Error)]
#[error("Failed to setup role {role}: {action} (status = {status}): {output}")]
pub struct SetupActionError {
    pub role: String,
    pub action: String,
    pub status: String,
    pub output: String,
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    SetupAction(#[from] SetupActionError),
}
