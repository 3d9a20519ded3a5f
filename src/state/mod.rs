//! Interfaces to the orchestration system's node and run records.
//!
//! The jig only reads deployment state and writes back run logs, result
//! objects and failure messages. Persistence lives behind these traits.

pub mod error;
pub mod memory;

pub use error::*;
pub use memory::*;

use crate::types::{AddressClass, Node, NodeAddress, RunContext};
use async_trait::async_trait;
use serde_json::Value;

/// Where an attribute lookup is anchored
#[derive(Debug, Clone, Copy)]
pub enum AttributeScope<'a> {
    Node(&'a Node),
    /// The node-role being run; falls back to deployment-wide values
    Run(&'a RunContext),
}

#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// All nodes in the deployment, in the store's natural order
    async fn deployment_nodes(&self, deployment: &str) -> Result<Vec<Node>, StoreError>;

    /// Roles active in the deployment, in the store's natural order
    async fn deployment_roles(&self, deployment: &str) -> Result<Vec<String>, StoreError>;

    /// Nodes in the deployment currently holding `role`
    async fn peers_by_role(&self, deployment: &str, role: &str) -> Result<Vec<Node>, StoreError>;

    /// The address used to reach the node over SSH
    async fn node_address(&self, node: &Node) -> Result<Option<NodeAddress>, StoreError>;

    async fn addresses(
        &self,
        node: &Node,
        class: AddressClass,
        categories: &[String],
    ) -> Result<Vec<NodeAddress>, StoreError>;

    async fn attribute(
        &self,
        name: &str,
        scope: AttributeScope<'_>,
    ) -> Result<Option<Value>, StoreError>;

    /// The node's own staged attribute bag, if the store keeps one
    async fn node_data(&self, node: &Node) -> Result<Option<Value>, StoreError>;
}

#[async_trait]
pub trait RunStore: Send + Sync {
    /// Replace the run's log text. Called repeatedly while output streams.
    async fn update_runlog(&self, run: &RunContext, log: &str) -> Result<(), StoreError>;

    async fn write_result(&self, run: &RunContext, result: &Value) -> Result<(), StoreError>;

    async fn report_failure(&self, run: &RunContext, message: &str) -> Result<(), StoreError>;
}
