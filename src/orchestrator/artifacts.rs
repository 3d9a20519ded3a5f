use crate::orchestrator::ArtifactError;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

pub const INVENTORY_FILE: &str = "inventory.ini";
pub const VARIABLES_FILE: &str = "extra_vars.json";
pub const DEFAULT_RUN_DIR_PREFIX: &str = "ansible-playbook-jig-";

/// Per-run scratch directory holding the inventory and variables files.
///
/// The directory is removed when this value is closed or dropped.
#[derive(Debug)]
pub struct RunArtifacts {
    dir: TempDir,
}

impl RunArtifacts {
    pub fn create(temp_root: &Path, prefix: &str) -> Result<Self, ArtifactError> {
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(temp_root)
            .map_err(|source| ArtifactError::CreateDir {
                path: temp_root.display().to_string(),
                source,
            })?;
        debug!("Created run directory {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn inventory_path(&self) -> PathBuf {
        self.path().join(INVENTORY_FILE)
    }

    pub fn variables_path(&self) -> PathBuf {
        self.path().join(VARIABLES_FILE)
    }

    pub async fn write_variables(&self, data: &Value) -> Result<PathBuf, ArtifactError> {
        let content = serde_json::to_vec(data).map_err(|e| ArtifactError::Serialize {
            what: "run variables",
            reason: e.to_string(),
        })?;
        let path = self.variables_path();
        write(&path, &content).await?;
        Ok(path)
    }

    pub async fn write_inventory(&self, inventory: &str) -> Result<PathBuf, ArtifactError> {
        let path = self.inventory_path();
        write(&path, inventory.as_bytes()).await?;
        Ok(path)
    }

    /// Remove the directory, reporting failures that drop would swallow
    pub fn close(self) -> std::io::Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close()?;
        debug!("Removed run directory {}", path.display());
        Ok(())
    }
}

async fn write(path: &Path, content: &[u8]) -> Result<(), ArtifactError> {
    tokio::fs::write(path, content)
        .await
        .map_err(|source| ArtifactError::Write {
            path: path.display().to_string(),
            source,
        })
}
