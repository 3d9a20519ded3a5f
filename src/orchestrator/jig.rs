use crate::orchestrator::{PlaybookOrchestrator, RunError};
use crate::types::{Node, RunContext, RunOutcome};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

/// A backend that applies roles to nodes
#[async_trait]
pub trait Jig: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, run: &RunContext, data: Value) -> Result<RunOutcome, RunError>;

    /// Called when a node joins; the returned object is stored on the node
    async fn create_node(&self, node: &Node) -> Value;

    async fn delete_node(&self, node: &Node);
}

#[async_trait]
impl Jig for PlaybookOrchestrator {
    fn name(&self) -> &str {
        "ansible-playbook"
    }

    async fn run(&self, run: &RunContext, data: Value) -> Result<RunOutcome, RunError> {
        PlaybookOrchestrator::run(self, run, data).await
    }

    async fn create_node(&self, node: &Node) -> Value {
        // Inventory and variables are built per run
        info!("{} jig creating node: {}", self.name(), node.name);
        json!({})
    }

    async fn delete_node(&self, node: &Node) {
        info!("{} jig deleting node: {}", self.name(), node.name);
    }
}
