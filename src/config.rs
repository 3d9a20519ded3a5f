use crate::cache::DEFAULT_CACHE_ROOT;
use crate::inventory::DEFAULT_SSH_USER;
use crate::orchestrator::{ConfigError, DEFAULT_RUN_DIR_PREFIX};
use crate::runtime::DEFAULT_CHUNK_SIZE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "config.yml";

/// Settings for the playbook jig. Every field has a default, so a settings
/// file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JigConfig {
    /// Shared source cache; holds `lock` and one directory per role
    pub cache_root: PathBuf,
    /// Holds `roles/<role>/role.yml` and the roles' local sources
    pub playbooks_root: PathBuf,
    /// Parent for per-run directories; the system temp dir when unset
    pub temp_root: Option<PathBuf>,
    pub run_dir_prefix: String,
    pub playbook_bin: String,
    pub galaxy_bin: String,
    pub galaxy_sudo: bool,
    pub ssh_user: String,
    /// Pass `-l <node address>` so only the run's node is touched
    pub limit_to_node: bool,
    pub chunk_size: usize,
}

impl Default for JigConfig {
    fn default() -> Self {
        Self {
            cache_root: PathBuf::from(DEFAULT_CACHE_ROOT),
            playbooks_root: PathBuf::from("ansible-playbooks"),
            temp_root: None,
            run_dir_prefix: DEFAULT_RUN_DIR_PREFIX.to_string(),
            playbook_bin: "ansible-playbook".to_string(),
            galaxy_bin: "ansible-galaxy".to_string(),
            galaxy_sudo: true,
            ssh_user: DEFAULT_SSH_USER.to_string(),
            limit_to_node: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl JigConfig {
    pub async fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let settings_error = |reason: String| ConfigError::Settings {
            path: path.display().to_string(),
            reason,
        };

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| settings_error(e.to_string()))?;
        let config: Option<Self> =
            serde_yaml::from_str(&content).map_err(|e| settings_error(e.to_string()))?;
        let config = config.unwrap_or_default();

        if config.chunk_size == 0 {
            return Err(settings_error("chunk_size must be positive".to_string()));
        }
        Ok(config)
    }

    /// `<config dir>/rustle-playbook/config.yml`, if the platform has one
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("rustle-playbook").join(CONFIG_FILE))
    }

    pub fn temp_root(&self) -> PathBuf {
        self.temp_root.clone().unwrap_or_else(std::env::temp_dir)
    }
}
