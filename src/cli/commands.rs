use crate::cli::{print_resolved, print_run_outcome, Commands, NodeTarget, RustlePlaybookCli};
use crate::config::JigConfig;
use crate::orchestrator::PlaybookOrchestrator;
use crate::resolver::Scope;
use crate::state::{DeploymentStore, MemoryStore};
use crate::types::{Node, RunContext};
use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Settings from `--config`, else the default settings file if present,
/// else built-in defaults; then command-line overrides.
pub async fn load_config(cli: &RustlePlaybookCli) -> Result<JigConfig> {
    let path = match &cli.config {
        Some(path) => Some(path.clone()),
        None => JigConfig::default_path().filter(|p| p.is_file()),
    };

    let mut config = match path {
        Some(path) => {
            debug!("Loading settings from {}", path.display());
            JigConfig::from_file(&path).await?
        }
        None => JigConfig::default(),
    };

    if let Some(cache_dir) = &cli.cache_dir {
        config.cache_root = cache_dir.clone();
    }
    if let Some(playbooks_root) = &cli.playbooks_root {
        config.playbooks_root = playbooks_root.clone();
    }
    Ok(config)
}

pub async fn execute_command(cli: RustlePlaybookCli) -> Result<()> {
    let mut config = load_config(&cli).await?;

    match cli.command {
        Commands::Run {
            target,
            role,
            limit,
            format,
        } => {
            config.limit_to_node |= limit;
            let (store, node, data) = open_target(&target).await?;
            let orchestrator = PlaybookOrchestrator::new(config, store.clone(), store);
            let run = RunContext::new(role, node);
            let outcome = orchestrator.run(&run, data).await?;
            print_run_outcome(&outcome, format)
        }
        Commands::Inventory { target, role } => {
            let (store, node, data) = open_target(&target).await?;
            let orchestrator = PlaybookOrchestrator::new(config, store.clone(), store);
            let run = RunContext::new(role, node);
            print!("{}", orchestrator.preview_inventory(&run, data).await?);
            Ok(())
        }
        Commands::Resolve {
            target,
            expression,
            role,
        } => {
            let (store, node, data) = open_target(&target).await?;
            let orchestrator = PlaybookOrchestrator::new(config, store.clone(), store);
            let run = RunContext::new(role, node.clone());
            let scope = Scope::new(&node, &run, &data);
            let value = orchestrator
                .resolver()
                .resolve_str(&scope, &expression)
                .await;
            print_resolved(&expression, value.as_ref())
        }
    }
}

async fn open_target(target: &NodeTarget) -> Result<(Arc<MemoryStore>, Node, Value)> {
    let store = Arc::new(MemoryStore::from_file(&target.snapshot).await?);
    let node = store.node(&target.node).ok_or_else(|| {
        anyhow!(
            "Node {} not found in {}",
            target.node,
            target.snapshot.display()
        )
    })?;
    info!("Using node {} of deployment {}", node.name, node.deployment);

    let data = match &target.data {
        Some(path) => load_data(path).await?,
        None => store.node_data(&node).await?.unwrap_or_else(|| json!({})),
    };
    Ok((store, node, data))
}

async fn load_data(path: &Path) -> Result<Value> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_yaml::from_str(&content).with_context(|| format!("Invalid data file {}", path.display()))
}
