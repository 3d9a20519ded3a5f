use crate::types::Node;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a single role run on a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    pub run_id: Uuid,
    pub role: String,
    pub node: Node,
}

impl RunContext {
    pub fn new(role: impl Into<String>, node: Node) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            role: role.into(),
            node,
        }
    }

    pub fn deployment(&self) -> &str {
        &self.node.deployment
    }
}

/// Final record of a successful run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub role: String,
    pub node: String,
    pub log: String,
    pub result: serde_json::Value,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunOutcome {
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}
