//! Custom functions reachable through `eval:` expressions.
//!
//! ```text
//! ipaddress(<all|v4_only|v6_only>, <category attribute>).<cidr|address|ifname>
//! nodes_with_role(<role>).<expression applied to each peer, joined by " ">
//! first_node_with_role(<role>).<expression applied to the first peer>
//! ```

use crate::resolver::{value_to_string, FunctionCall, PathExpr, PathResolver, Scope};
use crate::state::{AttributeScope, DeploymentStore, StoreError, ADMIN_CATEGORY};
use crate::types::{AddressClass, Node, NodeAddress};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Interface table consulted by `ipaddress(...).ifname`
pub const NICS_ATTRIBUTE: &str = "nics";

#[async_trait]
pub trait CustomFunction: Send + Sync {
    fn name(&self) -> &'static str;

    async fn call(
        &self,
        resolver: &PathResolver,
        scope: &Scope<'_>,
        call: &FunctionCall,
    ) -> Option<Value>;
}

/// Name-to-handler dispatch table for `eval:` expressions
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn CustomFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin_functions() -> Self {
        let mut registry = Self::new();
        registry.register(IpAddressFunction);
        registry.register(NodesWithRoleFunction);
        registry.register(FirstNodeWithRoleFunction);
        registry
    }

    pub fn register(&mut self, function: impl CustomFunction + 'static) {
        self.functions
            .insert(function.name().to_string(), Arc::new(function));
    }

    pub fn get(&self, name: &str) -> Option<&dyn CustomFunction> {
        self.functions.get(name).map(|f| f.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.names())
            .finish()
    }
}

pub struct IpAddressFunction;

#[async_trait]
impl CustomFunction for IpAddressFunction {
    fn name(&self) -> &'static str {
        "ipaddress"
    }

    async fn call(
        &self,
        resolver: &PathResolver,
        scope: &Scope<'_>,
        call: &FunctionCall,
    ) -> Option<Value> {
        let store = resolver.store();
        let class = call
            .arg(0)
            .map(AddressClass::from_name)
            .unwrap_or_default();
        let accessor = call.subcommand.as_deref()?;

        let mut categories = vec![ADMIN_CATEGORY.to_string()];
        if let Some(attribute) = call.arg(1).filter(|a| !a.is_empty()) {
            match store.attribute(attribute, AttributeScope::Run(scope.run)).await {
                Ok(Some(value)) => categories = vec![value_to_string(&value)],
                Ok(None) => {}
                Err(e) => debug!("Category attribute {} unavailable: {}", attribute, e),
            }
        }

        let addresses = match store.addresses(scope.node, class, &categories).await {
            Ok(addresses) => addresses,
            Err(e) => {
                warn!("Address lookup for {} failed: {}", scope.node.name, e);
                return None;
            }
        };
        let address = addresses.first()?;

        match accessor {
            "cidr" => Some(Value::String(address.to_string())),
            "address" => Some(Value::String(address.addr.to_string())),
            "ifname" => interface_for(store, scope.node, address).await,
            other => {
                info!("ipaddress: unknown accessor '{}'", other);
                None
            }
        }
    }
}

/// Scan the node's detected interface table for the one carrying `address`.
async fn interface_for(
    store: &dyn DeploymentStore,
    node: &Node,
    address: &NodeAddress,
) -> Option<Value> {
    let nics = store
        .attribute(NICS_ATTRIBUTE, AttributeScope::Node(node))
        .await
        .ok()
        .flatten()?;

    let cidr = address.to_string();
    let bare = address.addr.to_string();
    nics.as_object()?
        .iter()
        .find(|(_, nic)| {
            nic.get("ips")
                .and_then(Value::as_array)
                .is_some_and(|ips| {
                    ips.iter()
                        .filter_map(Value::as_str)
                        .any(|ip| ip == cidr || ip == bare)
                })
        })
        .map(|(name, _)| Value::String(name.clone()))
}

/// Peers holding `role` in the scope node's deployment, ordered by node id
async fn sorted_peers(
    store: &dyn DeploymentStore,
    deployment: &str,
    role: &str,
) -> Result<Vec<Node>, StoreError> {
    let mut peers = store.peers_by_role(deployment, role).await?;
    peers.sort_by_key(|node| node.id);
    Ok(peers)
}

/// Resolve `expr` as seen from `peer`, against the peer's own data.
async fn resolve_for_peer(
    resolver: &PathResolver,
    scope: &Scope<'_>,
    peer: &Node,
    expr: &PathExpr,
) -> Option<Value> {
    let data = match resolver.store().node_data(peer).await {
        Ok(Some(data)) => data,
        Ok(None) => Value::Null,
        Err(e) => {
            debug!("No staged data for peer {}: {}", peer.name, e);
            Value::Null
        }
    };
    let peer_scope = Scope::new(peer, scope.run, &data);
    resolver.resolve(&peer_scope, expr).await
}

pub struct NodesWithRoleFunction;

#[async_trait]
impl CustomFunction for NodesWithRoleFunction {
    fn name(&self) -> &'static str {
        "nodes_with_role"
    }

    async fn call(
        &self,
        resolver: &PathResolver,
        scope: &Scope<'_>,
        call: &FunctionCall,
    ) -> Option<Value> {
        let role = call.arg(0)?;
        let expr = PathExpr::parse_subcommand(call.subcommand.as_deref()?);

        let peers = match sorted_peers(resolver.store(), &scope.node.deployment, role).await {
            Ok(peers) => peers,
            Err(e) => {
                warn!("Peer lookup for role {} failed: {}", role, e);
                return None;
            }
        };

        let mut values = Vec::with_capacity(peers.len());
        for peer in &peers {
            let value = resolve_for_peer(resolver, scope, peer, &expr).await;
            values.push(value.map(|v| value_to_string(&v)).unwrap_or_default());
        }

        Some(Value::String(values.join(" ")))
    }
}

pub struct FirstNodeWithRoleFunction;

#[async_trait]
impl CustomFunction for FirstNodeWithRoleFunction {
    fn name(&self) -> &'static str {
        "first_node_with_role"
    }

    async fn call(
        &self,
        resolver: &PathResolver,
        scope: &Scope<'_>,
        call: &FunctionCall,
    ) -> Option<Value> {
        let role = call.arg(0)?;
        let expr = PathExpr::parse_subcommand(call.subcommand.as_deref()?);

        let peer = sorted_peers(resolver.store(), &scope.node.deployment, role)
            .await
            .ok()?
            .into_iter()
            .next()?;

        resolve_for_peer(resolver, scope, &peer, &expr).await
    }
}
