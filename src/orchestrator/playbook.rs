use crate::inventory::IMPLICIT_GROUP;
use crate::orchestrator::ArtifactError;
use crate::types::{PlaybookFile, RoleDefinition};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const SYNTHESIZED_PLAYBOOK: &str = "cluster.yml";

/// A single play of a generated playbook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Play {
    pub hosts: Vec<String>,
    pub roles: Vec<String>,
}

impl Play {
    /// Target the role's inventory groups (or `all`) and apply its sub-roles.
    /// `None` when the role has no sub-role mapping.
    pub fn for_role(definition: &RoleDefinition, role: &str) -> Option<Self> {
        let roles = definition.sub_roles_for(role)?.to_vec();
        let hosts = match definition.groups_for(role) {
            Some(groups) => groups.to_vec(),
            None => vec![IMPLICIT_GROUP.to_string()],
        };
        Some(Self { hosts, roles })
    }
}

/// Pick the playbook to run from `playbook_dir`, writing `cluster.yml`
/// there first when the descriptor asks for a generated one.
pub fn select_playbook(
    definition: &RoleDefinition,
    role: &str,
    playbook_dir: &Path,
) -> Result<String, ArtifactError> {
    match &definition.playbook_file {
        PlaybookFile::Named(file) => Ok(file.clone()),
        PlaybookFile::Synthesize => {
            let play = Play::for_role(definition, role).ok_or_else(|| ArtifactError::Playbook {
                path: playbook_dir.join(SYNTHESIZED_PLAYBOOK).display().to_string(),
                reason: format!("no sub-roles mapped for {role}"),
            })?;
            write_playbook(playbook_dir, &[play])?;
            Ok(SYNTHESIZED_PLAYBOOK.to_string())
        }
    }
}

/// Atomically replace `<dir>/cluster.yml` with `plays`
pub fn write_playbook(dir: &Path, plays: &[Play]) -> Result<PathBuf, ArtifactError> {
    let target = dir.join(SYNTHESIZED_PLAYBOOK);
    let failed = |reason: String| ArtifactError::Playbook {
        path: target.display().to_string(),
        reason,
    };

    let content = serde_yaml::to_string(plays).map_err(|e| ArtifactError::Serialize {
        what: "playbook",
        reason: e.to_string(),
    })?;

    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(|e| failed(e.to_string()))?;
    file.write_all(content.as_bytes())
        .map_err(|e| failed(e.to_string()))?;
    file.persist(&target).map_err(|e| failed(e.error.to_string()))?;

    debug!("Wrote playbook {}", target.display());
    Ok(target)
}
