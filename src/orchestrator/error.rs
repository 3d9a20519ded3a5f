use crate::cache::{CacheError, SetupActionError, SourceError};
use crate::runtime::ProcessError;
use crate::state::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not find playbook scripts for role {role} in {path}")]
    MissingScripts { role: String, path: String },

    #[error("Could not read role descriptor {path}: {source}")]
    MissingDescriptor {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid role descriptor {path}: {reason}")]
    InvalidDescriptor { path: String, reason: String },

    #[error("Missing {field} in {path}")]
    MissingField { field: &'static str, path: String },

    #[error("Invalid {field} in {path}: {reason}")]
    InvalidField {
        field: &'static str,
        path: String,
        reason: String,
    },

    #[error("Missing role_role_map entry for role {role} in {path}; needed to synthesize a playbook")]
    MissingRoleMap { role: String, path: String },

    #[error("Invalid settings file {path}: {reason}")]
    Settings { path: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Failed to create run directory under {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize {what}: {reason}")]
    Serialize { what: &'static str, reason: String },

    #[error("Failed to write playbook {path}: {reason}")]
    Playbook { path: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Playbook tool {program} not found: {reason}")]
    ToolNotFound { program: String, reason: String },

    #[error("Running: {command}\nPlaybook run for {role} on {node} failed! (status = {status})\nOut: {stdout}\nErr: {stderr}")]
    Failed {
        command: String,
        role: String,
        node: String,
        status: String,
        stdout: String,
        stderr: String,
    },

    #[error(transparent)]
    Spawn(#[from] ProcessError),
}

/// Anything that aborts a playbook run
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    SetupAction(#[from] SetupActionError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("Deployment store error: {0}")]
    Store(#[from] StoreError),
}

impl From<CacheError> for RunError {
    fn from(error: CacheError) -> Self {
        match error {
            CacheError::Source(e) => Self::Source(e),
            CacheError::SetupAction(e) => Self::SetupAction(e),
        }
    }
}
