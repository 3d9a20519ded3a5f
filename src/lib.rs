//! Rustle Playbook - ansible-playbook jig
//!
//! Resolves playbook sources into a shared on-disk cache, builds inventory
//! and variable files from deployment state, runs `ansible-playbook` while
//! streaming its output into the run log, and writes the result back.

pub mod cache;
pub mod cli;
pub mod config;
pub mod inventory;
pub mod orchestrator;
pub mod resolver;
pub mod runtime;
pub mod state;
pub mod types;

pub use config::JigConfig;
pub use orchestrator::{Jig, PlaybookOrchestrator, RunError};
pub use types::*;
