use crate::resolver::{value_to_string, PathResolver, Scope};
use crate::state::StoreError;
use crate::types::{Node, RoleDefinition, RunContext, ValueMapping};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Write;
use tracing::debug;

/// Group that every inventory has implicitly
pub const IMPLICIT_GROUP: &str = "all";

pub const DEFAULT_SSH_USER: &str = "root";

/// A labeled `[group]` section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryGroup {
    pub name: String,
    pub lines: Vec<String>,
}

impl InventoryGroup {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lines: Vec::new(),
        }
    }

    /// Append unless the exact same line is already present
    fn push_unique(&mut self, line: &str) {
        if !self.lines.iter().any(|l| l == line) {
            self.lines.push(line.to_string());
        }
    }
}

/// Rendered inventory: the unlabeled all-nodes section followed by groups
/// in first-seen order. Every line carries its own trailing newline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    pub all: Vec<String>,
    pub groups: Vec<InventoryGroup>,
}

impl Inventory {
    pub fn group(&self, name: &str) -> Option<&InventoryGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    fn group_mut(&mut self, name: &str) -> &mut InventoryGroup {
        let index = match self.groups.iter().position(|g| g.name == name) {
            Some(index) => index,
            None => {
                self.groups.push(InventoryGroup::new(name));
                self.groups.len() - 1
            }
        };
        &mut self.groups[index]
    }

    pub fn render(&self) -> String {
        let mut text: String = self.all.concat();
        for group in &self.groups {
            let _ = writeln!(text, "[{}]", group.name);
            text.push_str(&group.lines.concat());
        }
        text
    }
}

/// Builds ansible INI inventories for a deployment
pub struct InventoryBuilder<'a> {
    resolver: &'a PathResolver,
    ssh_user: String,
}

impl<'a> InventoryBuilder<'a> {
    pub fn new(resolver: &'a PathResolver) -> Self {
        Self {
            resolver,
            ssh_user: DEFAULT_SSH_USER.to_string(),
        }
    }

    pub fn with_ssh_user(mut self, user: impl Into<String>) -> Self {
        self.ssh_user = user.into();
        self
    }

    /// One host line for `node`, or `None` when it has no address.
    ///
    /// `inventory_map` entries are appended in order as `path=value`; an
    /// entry whose value cannot be resolved renders as `path=`.
    pub async fn build_inventory_line(
        &self,
        node: &Node,
        run: &RunContext,
        data: &Value,
        inventory_map: &[ValueMapping],
    ) -> Result<Option<String>, StoreError> {
        let Some(address) = self.resolver.store().node_address(node).await? else {
            debug!("Node {} has no address, leaving it out of the inventory", node.name);
            return Ok(None);
        };

        let mut line = format!(
            "{} ansible_ssh_host={} ansible_ssh_user={}",
            node.name, address.addr, self.ssh_user
        );

        let scope = Scope::new(node, run, data);
        for mapping in inventory_map {
            if let Some(when) = &mapping.when {
                if !self.resolver.evaluate_condition(&scope, when).await {
                    continue;
                }
            }
            let value = self
                .resolver
                .resolve(&scope, &mapping.name)
                .await
                .map(|v| value_to_string(&v))
                .unwrap_or_default();
            let _ = write!(line, " {}={}", mapping.path, value);
        }

        line.push('\n');
        Ok(Some(line))
    }

    /// Build the inventory for the run's deployment.
    ///
    /// Each node is resolved against its own staged data when the store has
    /// some, otherwise against `data`.
    pub async fn build_inventory(
        &self,
        run: &RunContext,
        data: &Value,
        definition: &RoleDefinition,
    ) -> Result<Inventory, StoreError> {
        let store = self.resolver.store();
        let deployment = run.deployment();
        let mut rendered: HashMap<u64, Option<String>> = HashMap::new();
        let mut inventory = Inventory::default();

        for node in store.deployment_nodes(deployment).await? {
            if let Some(line) = self
                .cached_line(&mut rendered, &node, run, data, definition)
                .await?
            {
                inventory.all.push(line);
            }
        }

        for role in store.deployment_roles(deployment).await? {
            let Some(groups) = definition.groups_for(&role) else {
                continue;
            };
            let peers = store.peers_by_role(deployment, &role).await?;
            if peers.is_empty() {
                continue;
            }

            let groups: Vec<&String> = groups
                .iter()
                .filter(|g| g.as_str() != IMPLICIT_GROUP)
                .collect();
            for group in &groups {
                inventory.group_mut(group);
            }

            for peer in &peers {
                let Some(line) = self
                    .cached_line(&mut rendered, peer, run, data, definition)
                    .await?
                else {
                    continue;
                };
                for group in &groups {
                    inventory.group_mut(group).push_unique(&line);
                }
            }
        }

        Ok(inventory)
    }

    pub async fn build_inventory_file(
        &self,
        run: &RunContext,
        data: &Value,
        definition: &RoleDefinition,
    ) -> Result<String, StoreError> {
        Ok(self.build_inventory(run, data, definition).await?.render())
    }

    async fn cached_line(
        &self,
        rendered: &mut HashMap<u64, Option<String>>,
        node: &Node,
        run: &RunContext,
        data: &Value,
        definition: &RoleDefinition,
    ) -> Result<Option<String>, StoreError> {
        if let Some(line) = rendered.get(&node.id) {
            return Ok(line.clone());
        }

        let own_data = self.resolver.store().node_data(node).await?;
        let line = self
            .build_inventory_line(
                node,
                run,
                own_data.as_ref().unwrap_or(data),
                &definition.inventory_map,
            )
            .await?;
        rendered.insert(node.id, line.clone());
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_dedupes_exact_lines() {
        let mut inventory = Inventory::default();
        inventory.group_mut("web").push_unique("a ansible_ssh_host=10.0.0.1\n");
        inventory.group_mut("web").push_unique("a ansible_ssh_host=10.0.0.1\n");
        inventory.group_mut("db").push_unique("b ansible_ssh_host=10.0.0.2\n");

        assert_eq!(inventory.groups.len(), 2);
        assert_eq!(inventory.group("web").unwrap().lines.len(), 1);
    }

    #[test]
    fn test_render_puts_unlabeled_section_first() {
        let inventory = Inventory {
            all: vec!["a x\n".to_string(), "b y\n".to_string()],
            groups: vec![
                InventoryGroup {
                    name: "web".to_string(),
                    lines: vec!["a x\n".to_string()],
                },
                InventoryGroup {
                    name: "db".to_string(),
                    lines: vec!["b y\n".to_string()],
                },
            ],
        };
        assert_eq!(inventory.render(), "a x\nb y\n[web]\na x\n[db]\nb y\n");
    }
}
