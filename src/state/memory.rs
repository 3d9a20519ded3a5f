//! Snapshot-backed store used by the CLI and in tests.

use crate::state::{AttributeScope, DeploymentStore, RunStore, StoreError};
use crate::types::{AddressClass, Node, NodeAddress, RunContext};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use tokio::sync::Mutex;
use tracing::debug;

pub const ADMIN_CATEGORY: &str = "admin";

/// Serialized view of one deployment (YAML or JSON)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploymentSnapshot {
    pub deployment: String,
    /// Deployment-wide attributes, consulted after node attributes
    #[serde(default)]
    pub attributes: Map<String, Value>,
    /// Active roles; derived from the nodes when empty
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: u64,
    pub name: String,
    /// SSH address; defaults to the first admin address
    #[serde(default)]
    pub address: Option<NodeAddress>,
    #[serde(default)]
    pub addresses: Vec<CategorizedAddress>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorizedAddress {
    pub category: String,
    #[serde(flatten)]
    pub address: NodeAddress,
}

impl NodeRecord {
    fn primary_address(&self) -> Option<NodeAddress> {
        self.address.or_else(|| {
            self.addresses
                .iter()
                .find(|a| a.category == ADMIN_CATEGORY)
                .map(|a| a.address)
        })
    }

    /// Categorized addresses, with the primary address filed under `admin`
    /// when it is not listed explicitly.
    fn categorized(&self) -> Vec<CategorizedAddress> {
        let mut all = self.addresses.clone();
        if let Some(primary) = self.address {
            if !all.iter().any(|a| a.address == primary) {
                all.insert(
                    0,
                    CategorizedAddress {
                        category: ADMIN_CATEGORY.to_string(),
                        address: primary,
                    },
                );
            }
        }
        all
    }
}

#[derive(Debug, Default)]
struct RunRecords {
    runlog_updates: Vec<String>,
    runlog: Option<String>,
    result: Option<Value>,
    failures: Vec<String>,
}

/// In-memory [`DeploymentStore`] and [`RunStore`]
#[derive(Debug)]
pub struct MemoryStore {
    snapshot: DeploymentSnapshot,
    records: Mutex<RunRecords>,
}

impl MemoryStore {
    pub fn new(snapshot: DeploymentSnapshot) -> Self {
        Self {
            snapshot,
            records: Mutex::new(RunRecords::default()),
        }
    }

    pub async fn from_file(path: &Path) -> Result<Self, StoreError> {
        let content = tokio::fs::read_to_string(path).await?;
        let snapshot: DeploymentSnapshot =
            serde_yaml::from_str(&content).map_err(|e| StoreError::InvalidSnapshot {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        debug!(
            "Loaded deployment {} with {} nodes from {}",
            snapshot.deployment,
            snapshot.nodes.len(),
            path.display()
        );
        Ok(Self::new(snapshot))
    }

    pub fn snapshot(&self) -> &DeploymentSnapshot {
        &self.snapshot
    }

    pub fn node(&self, name: &str) -> Option<Node> {
        self.snapshot
            .nodes
            .iter()
            .find(|n| n.name == name)
            .map(|record| self.to_node(record))
    }

    /// Every log value pushed so far, oldest first
    pub async fn runlog_updates(&self) -> Vec<String> {
        self.records.lock().await.runlog_updates.clone()
    }

    pub async fn runlog(&self) -> Option<String> {
        self.records.lock().await.runlog.clone()
    }

    pub async fn result(&self) -> Option<Value> {
        self.records.lock().await.result.clone()
    }

    pub async fn failures(&self) -> Vec<String> {
        self.records.lock().await.failures.clone()
    }

    fn to_node(&self, record: &NodeRecord) -> Node {
        Node::new(record.id, &record.name, &self.snapshot.deployment)
    }

    fn check_deployment(&self, deployment: &str) -> Result<(), StoreError> {
        if deployment == self.snapshot.deployment {
            Ok(())
        } else {
            Err(StoreError::UnknownDeployment {
                deployment: deployment.to_string(),
            })
        }
    }

    fn record(&self, node: &Node) -> Result<&NodeRecord, StoreError> {
        self.snapshot
            .nodes
            .iter()
            .find(|n| n.id == node.id)
            .ok_or_else(|| StoreError::UnknownNode {
                node: node.name.clone(),
            })
    }
}

#[async_trait]
impl DeploymentStore for MemoryStore {
    async fn deployment_nodes(&self, deployment: &str) -> Result<Vec<Node>, StoreError> {
        self.check_deployment(deployment)?;
        Ok(self.snapshot.nodes.iter().map(|r| self.to_node(r)).collect())
    }

    async fn deployment_roles(&self, deployment: &str) -> Result<Vec<String>, StoreError> {
        self.check_deployment(deployment)?;
        if !self.snapshot.roles.is_empty() {
            return Ok(self.snapshot.roles.clone());
        }

        let mut roles: Vec<String> = Vec::new();
        for role in self.snapshot.nodes.iter().flat_map(|n| n.roles.iter()) {
            if !roles.contains(role) {
                roles.push(role.clone());
            }
        }
        Ok(roles)
    }

    async fn peers_by_role(&self, deployment: &str, role: &str) -> Result<Vec<Node>, StoreError> {
        self.check_deployment(deployment)?;
        Ok(self
            .snapshot
            .nodes
            .iter()
            .filter(|n| n.roles.iter().any(|r| r == role))
            .map(|r| self.to_node(r))
            .collect())
    }

    async fn node_address(&self, node: &Node) -> Result<Option<NodeAddress>, StoreError> {
        Ok(self.record(node)?.primary_address())
    }

    async fn addresses(
        &self,
        node: &Node,
        class: AddressClass,
        categories: &[String],
    ) -> Result<Vec<NodeAddress>, StoreError> {
        Ok(self
            .record(node)?
            .categorized()
            .into_iter()
            .filter(|a| categories.iter().any(|c| *c == a.category))
            .filter(|a| class.admits(&a.address.addr))
            .map(|a| a.address)
            .collect())
    }

    async fn attribute(
        &self,
        name: &str,
        scope: AttributeScope<'_>,
    ) -> Result<Option<Value>, StoreError> {
        match scope {
            AttributeScope::Node(node) => Ok(self.record(node)?.attributes.get(name).cloned()),
            AttributeScope::Run(run) => {
                let from_node = self.record(&run.node)?.attributes.get(name).cloned();
                Ok(from_node.or_else(|| self.snapshot.attributes.get(name).cloned()))
            }
        }
    }

    async fn node_data(&self, node: &Node) -> Result<Option<Value>, StoreError> {
        Ok(self.record(node)?.data.clone())
    }
}

#[async_trait]
impl RunStore for MemoryStore {
    async fn update_runlog(&self, _run: &RunContext, log: &str) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;
        records.runlog_updates.push(log.to_string());
        records.runlog = Some(log.to_string());
        Ok(())
    }

    async fn write_result(&self, _run: &RunContext, result: &Value) -> Result<(), StoreError> {
        self.records.lock().await.result = Some(result.clone());
        Ok(())
    }

    async fn report_failure(&self, _run: &RunContext, message: &str) -> Result<(), StoreError> {
        self.records.lock().await.failures.push(message.to_string());
        Ok(())
    }
}
