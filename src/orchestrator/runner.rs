use crate::cache::{GalaxyInstaller, SourceCache};
use crate::config::JigConfig;
use crate::inventory::InventoryBuilder;
use crate::orchestrator::{
    load_role_definition, local_scripts_dir, select_playbook, EmptyResultExtractor,
    ExecutionError, ResultExtractor, RunArtifacts, RunError,
};
use crate::resolver::{set_value, DataPath, FunctionRegistry, PathResolver, Scope};
use crate::runtime::{CommandSpec, LiveSink, ProcessOutput, ProcessRunner};
use crate::state::{DeploymentStore, RunStore};
use crate::types::{RoleDefinition, RunContext, RunOutcome, ValueMapping};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Steps of a playbook run, in order. A failure in any step skips straight
/// to `Cleanup`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    LoadDefinition,
    PopulateCache,
    BuildRunArtifacts,
    BuildOrSelectPlaybookFile,
    Execute,
    CaptureResult,
    Cleanup,
    Done,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LoadDefinition => "load definition",
            Self::PopulateCache => "populate cache",
            Self::BuildRunArtifacts => "build run artifacts",
            Self::BuildOrSelectPlaybookFile => "build or select playbook",
            Self::Execute => "execute",
            Self::CaptureResult => "capture result",
            Self::Cleanup => "cleanup",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Pushes streamed playbook output into the run's log
struct RunLogSink<'a> {
    runs: &'a dyn RunStore,
    run: &'a RunContext,
}

#[async_trait]
impl<'a> LiveSink for RunLogSink<'a> {
    async fn publish(&self, output: &str) {
        if let Err(e) = self.runs.update_runlog(self.run, output).await {
            debug!("Dropped live log update for {}: {}", self.run.node.name, e);
        }
    }
}

/// Drives one role run on one node through every [`RunPhase`]
pub struct PlaybookOrchestrator {
    config: JigConfig,
    store: Arc<dyn DeploymentStore>,
    runs: Arc<dyn RunStore>,
    resolver: PathResolver,
    cache: SourceCache,
    runner: ProcessRunner,
    extractor: Arc<dyn ResultExtractor>,
}

impl PlaybookOrchestrator {
    pub fn new(config: JigConfig, store: Arc<dyn DeploymentStore>, runs: Arc<dyn RunStore>) -> Self {
        let runner = ProcessRunner::new(config.chunk_size);
        let cache = SourceCache::new(config.cache_root.clone())
            .with_runner(runner.clone())
            .with_galaxy(GalaxyInstaller {
                program: config.galaxy_bin.clone(),
                use_sudo: config.galaxy_sudo,
            });

        Self {
            resolver: PathResolver::new(store.clone()),
            config,
            store,
            runs,
            cache,
            runner,
            extractor: Arc::new(EmptyResultExtractor),
        }
    }

    pub fn with_functions(mut self, functions: FunctionRegistry) -> Self {
        self.resolver = PathResolver::with_functions(self.store.clone(), functions);
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn ResultExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn config(&self) -> &JigConfig {
        &self.config
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn cache(&self) -> &SourceCache {
        &self.cache
    }

    /// Run the role's playbook for `run.node` with `data` as the variable
    /// bag. The run directory is removed whatever the outcome; failures are
    /// also reported to the run store.
    pub async fn run(&self, run: &RunContext, data: Value) -> Result<RunOutcome, RunError> {
        let started_at = Utc::now();
        info!(
            "Running playbook for role {} on {} ({})",
            run.role, run.node.name, run.run_id
        );

        let mut artifacts = None;
        let result = self.run_phases(run, data, &mut artifacts).await;

        self.enter(RunPhase::Cleanup, run);
        if let Some(artifacts) = artifacts {
            let path = artifacts.path().display().to_string();
            if let Err(e) = artifacts.close() {
                warn!("Failed to remove run directory {}: {}", path, e);
            }
        }

        match result {
            Ok((log, result)) => {
                self.enter(RunPhase::Done, run);
                let outcome = RunOutcome {
                    run_id: run.run_id,
                    role: run.role.clone(),
                    node: run.node.name.clone(),
                    log,
                    result,
                    started_at,
                    finished_at: Utc::now(),
                };
                info!(
                    "Playbook for role {} on {} finished in {}ms",
                    run.role,
                    run.node.name,
                    outcome.duration().num_milliseconds()
                );
                Ok(outcome)
            }
            Err(e) => {
                error!("Playbook for role {} on {} failed: {}", run.role, run.node.name, e);
                if let Err(report) = self.runs.report_failure(run, &e.to_string()).await {
                    warn!("Failed to report failure for {}: {}", run.node.name, report);
                }
                Err(e)
            }
        }
    }

    /// Build the inventory a run would use, without touching the cache or
    /// running anything.
    pub async fn preview_inventory(&self, run: &RunContext, data: Value) -> Result<String, RunError> {
        let local_scripts = local_scripts_dir(&self.config.playbooks_root, &run.role);
        let definition = load_role_definition(&run.role, &local_scripts).await?;
        let mut data = data;
        self.inject_attributes(run, &mut data, &definition.attribute_map)
            .await;
        Ok(self
            .inventory_builder()
            .build_inventory_file(run, &data, &definition)
            .await?)
    }

    async fn run_phases(
        &self,
        run: &RunContext,
        mut data: Value,
        artifacts: &mut Option<RunArtifacts>,
    ) -> Result<(String, Value), RunError> {
        let role = run.role.as_str();

        self.enter(RunPhase::LoadDefinition, run);
        let local_scripts = local_scripts_dir(&self.config.playbooks_root, role);
        let definition = load_role_definition(role, &local_scripts).await?;

        self.enter(RunPhase::PopulateCache, run);
        let role_dir = self.cache.ensure(role, &definition, &local_scripts).await?;

        self.enter(RunPhase::BuildRunArtifacts, run);
        let created = artifacts.insert(RunArtifacts::create(
            &self.config.temp_root(),
            &self.config.run_dir_prefix,
        )?);
        self.inject_attributes(run, &mut data, &definition.attribute_map)
            .await;
        let variables = created.write_variables(&data).await?;
        let inventory_text = self
            .inventory_builder()
            .build_inventory_file(run, &data, &definition)
            .await?;
        let inventory = created.write_inventory(&inventory_text).await?;

        self.enter(RunPhase::BuildOrSelectPlaybookFile, run);
        let playbook_dir = role_dir.join(&definition.playbook_path);
        let playbook = select_playbook(&definition, role, &playbook_dir)?;

        self.enter(RunPhase::Execute, run);
        let command = self
            .playbook_command(run, &definition, &playbook_dir, &inventory, &variables, &playbook)
            .await?;
        let output = self.execute(run, &command).await?;

        self.enter(RunPhase::CaptureResult, run);
        self.runs.update_runlog(run, &output.stdout).await?;
        let result = self.extractor.extract(run, &output.stdout).await;
        self.runs.write_result(run, &result).await?;

        Ok((output.stdout, result))
    }

    fn enter(&self, phase: RunPhase, run: &RunContext) {
        debug!("{} on {}: {}", run.role, run.node.name, phase);
    }

    fn inventory_builder(&self) -> InventoryBuilder<'_> {
        InventoryBuilder::new(&self.resolver).with_ssh_user(self.config.ssh_user.as_str())
    }

    /// Apply `attribute_map` to `data`. Entries whose guard fails or whose
    /// value is absent are left out.
    async fn inject_attributes(&self, run: &RunContext, data: &mut Value, mappings: &[ValueMapping]) {
        for mapping in mappings {
            let value = {
                let scope = Scope::new(&run.node, run, &*data);
                if let Some(when) = &mapping.when {
                    if !self.resolver.evaluate_condition(&scope, when).await {
                        debug!("Skipping attribute {}: '{}' is false", mapping.path, when.raw());
                        continue;
                    }
                }
                self.resolver.resolve(&scope, &mapping.name).await
            };

            let Some(value) = value else {
                debug!("Skipping attribute {}: {} resolved to nothing", mapping.path, mapping.name);
                continue;
            };

            let target = match DataPath::parse(&mapping.path) {
                Ok(target) => target,
                Err(e) => {
                    warn!("Invalid attribute_map path '{}': {}", mapping.path, e);
                    continue;
                }
            };
            if let Err(e) = set_value(data, &target, value) {
                warn!("Could not set attribute {}: {}", mapping.path, e);
            }
        }
    }

    async fn playbook_command(
        &self,
        run: &RunContext,
        definition: &RoleDefinition,
        playbook_dir: &Path,
        inventory: &Path,
        variables: &Path,
        playbook: &str,
    ) -> Result<CommandSpec, RunError> {
        let mut command =
            CommandSpec::new(self.config.playbook_bin.as_str()).current_dir(playbook_dir);

        if self.config.limit_to_node {
            match self.store.node_address(&run.node).await? {
                Some(address) => command = command.arg("-l").arg(address.addr.to_string()),
                None => warn!("Node {} has no address to limit the run to", run.node.name),
            }
        }

        command = command
            .arg("-i")
            .arg(inventory.display().to_string())
            .arg("--extra-vars")
            .arg(format!("@{}", variables.display()))
            .arg(playbook);

        if let Some(tags) = definition.tags_for(&run.role).filter(|t| !t.is_empty()) {
            command = command.arg(format!("--tags={}", tags.join(",")));
        }
        Ok(command)
    }

    async fn execute(&self, run: &RunContext, command: &CommandSpec) -> Result<ProcessOutput, RunError> {
        which::which(command.program()).map_err(|e| ExecutionError::ToolNotFound {
            program: command.program().to_string(),
            reason: e.to_string(),
        })?;

        let sink = RunLogSink {
            runs: self.runs.as_ref(),
            run,
        };
        let output = self
            .runner
            .run(command, Some(&sink))
            .await
            .map_err(ExecutionError::from)?;

        if !output.success() {
            return Err(ExecutionError::Failed {
                command: command.command_line(),
                role: run.role.clone(),
                node: run.node.name.clone(),
                status: output.status_label(),
                stdout: output.stdout,
                stderr: output.stderr,
            }
            .into());
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_names() {
        assert_eq!(RunPhase::LoadDefinition.to_string(), "load definition");
        assert_eq!(RunPhase::BuildOrSelectPlaybookFile.to_string(), "build or select playbook");
        assert_eq!(RunPhase::Done.to_string(), "done");
    }
}
