use crate::cache::{CacheError, CacheLock, SetupActionError, SourceEntry, SourceError, SourceSpec};
use crate::runtime::{CommandSpec, ProcessRunner};
use crate::types::RoleDefinition;
use git2::{build::RepoBuilder, FetchOptions, RemoteCallbacks};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use url::Url;
use walkdir::WalkDir;

pub const DEFAULT_CACHE_ROOT: &str = "/var/cache/rustle/playbooks";

/// How `galaxy:` sources are installed
#[derive(Debug, Clone)]
pub struct GalaxyInstaller {
    pub program: String,
    pub use_sudo: bool,
}

impl Default for GalaxyInstaller {
    fn default() -> Self {
        Self {
            program: "ansible-galaxy".to_string(),
            use_sudo: true,
        }
    }
}

impl GalaxyInstaller {
    pub fn install_command(&self, package: &str) -> CommandSpec {
        if self.use_sudo {
            CommandSpec::new("sudo").args([self.program.as_str(), "install", package])
        } else {
            CommandSpec::new(self.program.as_str()).args(["install", package])
        }
    }
}

/// Playbook source trees cached per role under one root.
///
/// Layout: `<root>/lock` and `<root>/<role>/<source name>/...`. All
/// population for all roles is serialized by the root-wide [`CacheLock`].
#[derive(Debug, Clone)]
pub struct SourceCache {
    root: PathBuf,
    runner: ProcessRunner,
    galaxy: GalaxyInstaller,
}

impl SourceCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            runner: ProcessRunner::default(),
            galaxy: GalaxyInstaller::default(),
        }
    }

    pub fn with_runner(mut self, runner: ProcessRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_galaxy(mut self, galaxy: GalaxyInstaller) -> Self {
        self.galaxy = galaxy;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn role_dir(&self, role: &str) -> PathBuf {
        self.root.join(role)
    }

    /// Make sure every source of `definition` is in place, then run the
    /// role's setup actions. Returns the role's cache directory.
    pub async fn ensure(
        &self,
        role: &str,
        definition: &RoleDefinition,
        local_scripts: &Path,
    ) -> Result<PathBuf, CacheError> {
        let _lock = self.lock().await?;
        let role_dir = self.place_sources(role, definition, local_scripts).await?;
        self.run_setup_actions(role, &definition.playbook_src_setup, &role_dir)
            .await?;
        Ok(role_dir)
    }

    /// Place or refresh the sources without running setup actions.
    pub async fn refresh(
        &self,
        role: &str,
        definition: &RoleDefinition,
        local_scripts: &Path,
    ) -> Result<PathBuf, CacheError> {
        let _lock = self.lock().await?;
        Ok(self.place_sources(role, definition, local_scripts).await?)
    }

    async fn lock(&self) -> Result<CacheLock, SourceError> {
        create_dir(&self.root).await?;
        CacheLock::acquire(&self.root).await
    }

    async fn place_sources(
        &self,
        role: &str,
        definition: &RoleDefinition,
        local_scripts: &Path,
    ) -> Result<PathBuf, SourceError> {
        let role_dir = self.role_dir(role);
        create_dir(&role_dir).await?;

        for entry in &definition.playbook_src_paths {
            self.place(role, entry, &role_dir, local_scripts).await?;
        }
        Ok(role_dir)
    }

    async fn place(
        &self,
        role: &str,
        entry: &SourceEntry,
        role_dir: &Path,
        local_scripts: &Path,
    ) -> Result<(), SourceError> {
        let target = role_dir.join(&entry.name);
        let exists = fs::try_exists(&target).await.unwrap_or(false);

        match &entry.spec {
            spec if exists && !spec.refreshes_existing() => {
                debug!(
                    "Leaving cached {} source {} untouched at {}",
                    spec.kind(),
                    spec,
                    target.display()
                );
                Ok(())
            }
            SourceSpec::Local(relative) => {
                debug!(
                    "Copying local source {} into {}",
                    relative.display(),
                    target.display()
                );
                copy_tree(local_scripts.join(relative), target).await
            }
            SourceSpec::Galaxy(package) => self.install_galaxy(role, package, &target).await,
            SourceSpec::Git(url) => clone_repository(url, &target).await,
        }
    }

    async fn install_galaxy(
        &self,
        role: &str,
        package: &str,
        target: &Path,
    ) -> Result<(), SourceError> {
        info!("Installing galaxy role {} for {}", package, role);
        let command = self.galaxy.install_command(package);
        let output = self.runner.run(&command, None).await?;
        if !output.success() {
            return Err(SourceError::Install {
                spec: format!("galaxy:{package}"),
                role: role.to_string(),
                output: output.combined(),
            });
        }
        create_dir(target).await
    }

    async fn run_setup_actions(
        &self,
        role: &str,
        actions: &[String],
        role_dir: &Path,
    ) -> Result<(), CacheError> {
        for action in actions {
            debug!("Running setup action for {}: {}", role, action);
            let command = CommandSpec::shell(action.as_str()).current_dir(role_dir);
            let output = self.runner.run(&command, None).await.map_err(SourceError::from)?;
            if !output.success() {
                return Err(SetupActionError {
                    role: role.to_string(),
                    action: action.clone(),
                    status: output.status_label(),
                    output: output.combined(),
                }
                .into());
            }
        }
        Ok(())
    }
}

async fn create_dir(path: &Path) -> Result<(), SourceError> {
    fs::create_dir_all(path)
        .await
        .map_err(|source| SourceError::CreateDir {
            path: path.display().to_string(),
            source,
        })
}

async fn copy_tree(from: PathBuf, to: PathBuf) -> Result<(), SourceError> {
    let (from_display, to_display) = (from.display().to_string(), to.display().to_string());
    tokio::task::spawn_blocking(move || copy_tree_blocking(&from, &to))
        .await
        .map_err(|e| SourceError::Copy {
            from: from_display,
            to: to_display,
            reason: e.to_string(),
        })?
}

/// Recursively copy the contents of `from` into `to`, overwriting files that
/// already exist. Files present only in `to` are left alone.
fn copy_tree_blocking(from: &Path, to: &Path) -> Result<(), SourceError> {
    let copy_error = |reason: String| SourceError::Copy {
        from: from.display().to_string(),
        to: to.display().to_string(),
        reason,
    };

    if !from.is_dir() {
        return Err(copy_error("source directory does not exist".to_string()));
    }

    for entry in WalkDir::new(from).follow_links(true) {
        let entry = entry.map_err(|e| copy_error(e.to_string()))?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| copy_error(e.to_string()))?;
        let dest = to.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&dest).map_err(|e| copy_error(e.to_string()))?;
        } else {
            std::fs::copy(entry.path(), &dest).map_err(|e| {
                copy_error(format!("{}: {}", entry.path().display(), e))
            })?;
        }
    }
    Ok(())
}

async fn clone_repository(url: &Url, target: &Path) -> Result<(), SourceError> {
    info!("Cloning {} into {}", url, target.display());
    let repo_url = url.to_string();
    let dest = target.to_path_buf();

    let cloned = tokio::task::spawn_blocking(move || {
        let mut callbacks = RemoteCallbacks::new();
        callbacks.transfer_progress(|stats| {
            debug!(
                "Transfer progress: {}/{} objects, {} bytes",
                stats.received_objects(),
                stats.total_objects(),
                stats.received_bytes()
            );
            true
        });

        let mut fetch_options = FetchOptions::new();
        fetch_options.remote_callbacks(callbacks);

        RepoBuilder::new()
            .fetch_options(fetch_options)
            .clone(&repo_url, &dest)
            .map(|_| ())
            .map_err(|e| e.message().to_string())
    })
    .await
    .map_err(|e| e.to_string())
    .and_then(|result| result);

    if let Err(reason) = cloned {
        // A half-written checkout would otherwise count as cached next run
        if let Err(e) = fs::remove_dir_all(target).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove partial clone {}: {}", target.display(), e);
            }
        }
        return Err(SourceError::Clone {
            url: url.to_string(),
            path: target.display().to_string(),
            reason,
        });
    }
    Ok(())
}
