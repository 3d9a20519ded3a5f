//! Loading `role.yml` descriptors into [`RoleDefinition`]s.

use crate::cache::{SourceEntry, SourceSpec};
use crate::orchestrator::ConfigError;
use crate::types::{PlaybookFile, RoleDefinition, ValueMapping};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const ROLE_DESCRIPTOR: &str = "role.yml";

/// Directory holding a role's descriptor and local playbook sources
pub fn local_scripts_dir(playbooks_root: &Path, role: &str) -> PathBuf {
    playbooks_root.join("roles").join(role)
}

#[derive(Debug, Deserialize)]
struct RawDescriptor {
    playbook_src_paths: Option<serde_yaml::Mapping>,
    playbook_path: Option<String>,
    playbook_file: Option<String>,
    attribute_map: Option<Vec<RawMapping>>,
    inventory_map: Option<Vec<RawMapping>>,
    role_group_map: Option<BTreeMap<String, Vec<String>>>,
    role_tag_map: Option<BTreeMap<String, Vec<String>>>,
    role_role_map: Option<BTreeMap<String, Vec<String>>>,
    playbook_src_setup: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawMapping {
    name: String,
    path: String,
    when: Option<String>,
}

impl RawMapping {
    fn into_mapping(self) -> ValueMapping {
        ValueMapping::parse(&self.name, self.path, self.when.as_deref())
    }
}

/// Read `<local_scripts>/role.yml` for `role`.
pub async fn load_role_definition(
    role: &str,
    local_scripts: &Path,
) -> Result<RoleDefinition, ConfigError> {
    if !tokio::fs::try_exists(local_scripts).await.unwrap_or(false) {
        return Err(ConfigError::MissingScripts {
            role: role.to_string(),
            path: local_scripts.display().to_string(),
        });
    }

    let descriptor = local_scripts.join(ROLE_DESCRIPTOR);
    let content = tokio::fs::read_to_string(&descriptor)
        .await
        .map_err(|source| ConfigError::MissingDescriptor {
            path: descriptor.display().to_string(),
            source,
        })?;

    let definition = parse_role_definition(role, &content, &descriptor.display().to_string())?;
    debug!(
        "Loaded {} with {} sources for role {}",
        descriptor.display(),
        definition.playbook_src_paths.len(),
        role
    );
    Ok(definition)
}

/// Parse descriptor text. `origin` names the file in error messages.
pub fn parse_role_definition(
    role: &str,
    content: &str,
    origin: &str,
) -> Result<RoleDefinition, ConfigError> {
    let raw: Option<RawDescriptor> =
        serde_yaml::from_str(content).map_err(|e| ConfigError::InvalidDescriptor {
            path: origin.to_string(),
            reason: e.to_string(),
        })?;
    let raw = raw.ok_or_else(|| ConfigError::InvalidDescriptor {
        path: origin.to_string(),
        reason: "descriptor is empty".to_string(),
    })?;

    let missing = |field: &'static str| ConfigError::MissingField {
        field,
        path: origin.to_string(),
    };

    let sources = raw
        .playbook_src_paths
        .ok_or_else(|| missing("playbook_src_paths"))?;
    let playbook_path = raw.playbook_path.ok_or_else(|| missing("playbook_path"))?;
    let playbook_file = raw.playbook_file.ok_or_else(|| missing("playbook_file"))?;

    let definition = RoleDefinition {
        playbook_src_paths: parse_sources(&sources, origin)?,
        playbook_path,
        playbook_file: PlaybookFile::from_descriptor(&playbook_file),
        attribute_map: raw
            .attribute_map
            .unwrap_or_default()
            .into_iter()
            .map(RawMapping::into_mapping)
            .collect(),
        inventory_map: raw
            .inventory_map
            .unwrap_or_default()
            .into_iter()
            .map(RawMapping::into_mapping)
            .collect(),
        role_group_map: raw.role_group_map.unwrap_or_default(),
        role_tag_map: raw.role_tag_map.unwrap_or_default(),
        role_role_map: raw.role_role_map.unwrap_or_default(),
        playbook_src_setup: raw.playbook_src_setup.unwrap_or_default(),
    };

    if definition.playbook_file == PlaybookFile::Synthesize
        && definition.sub_roles_for(role).is_none()
    {
        return Err(ConfigError::MissingRoleMap {
            role: role.to_string(),
            path: origin.to_string(),
        });
    }

    Ok(definition)
}

fn parse_sources(
    sources: &serde_yaml::Mapping,
    origin: &str,
) -> Result<Vec<SourceEntry>, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidField {
        field: "playbook_src_paths",
        path: origin.to_string(),
        reason,
    };

    sources
        .iter()
        .map(|(name, spec)| -> Result<SourceEntry, ConfigError> {
            let name = name
                .as_str()
                .ok_or_else(|| invalid(format!("source name {name:?} is not a string")))?;
            let spec = spec
                .as_str()
                .ok_or_else(|| invalid(format!("source {name} is not a string")))?;
            let spec = SourceSpec::parse(spec).map_err(|e| invalid(e.to_string()))?;
            Ok(SourceEntry::new(name, spec))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::PathExpr;

    const DESCRIPTOR: &str = r#"
playbook_src_paths:
  kubespray: https://github.com/kubernetes-incubator/kargo.git
  ntp: galaxy:geerlingguy.ntp
  local: files
playbook_path: kubespray
playbook_file: cluster.yml
inventory_map:
  - name: eval:ipaddress(all,storage).address
    path: storage_ip
  - name: rebar/network/mode
    path: net_mode
    when: rebar/network/enabled == true
role_group_map:
  k8s-master: [kube-master, etcd]
role_tag_map:
  k8s-master: [master]
playbook_src_setup:
  - ln -sf ../local/group_vars kubespray/group_vars
"#;

    #[test]
    fn test_parse_keeps_source_order() {
        let definition = parse_role_definition("k8s-master", DESCRIPTOR, "role.yml").unwrap();

        let names: Vec<&str> = definition
            .playbook_src_paths
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(names, vec!["kubespray", "ntp", "local"]);
        assert_eq!(definition.playbook_src_paths[0].spec.kind(), "git");
        assert_eq!(definition.playbook_src_paths[1].spec.kind(), "galaxy");
        assert_eq!(definition.playbook_src_paths[2].spec.kind(), "local");
        assert_eq!(
            definition.playbook_file,
            PlaybookFile::Named("cluster.yml".to_string())
        );
    }

    #[test]
    fn test_parse_mappings_and_maps() {
        let definition = parse_role_definition("k8s-master", DESCRIPTOR, "role.yml").unwrap();

        assert_eq!(definition.inventory_map.len(), 2);
        assert!(definition.inventory_map[0].name.is_custom());
        assert!(matches!(definition.inventory_map[1].name, PathExpr::Data(_)));
        assert!(definition.inventory_map[1].when.is_some());
        assert!(definition.attribute_map.is_empty());
        assert_eq!(
            definition.groups_for("k8s-master"),
            Some(&["kube-master".to_string(), "etcd".to_string()][..])
        );
        assert_eq!(definition.tags_for("k8s-master"), Some(&["master".to_string()][..]));
        assert_eq!(definition.playbook_src_setup.len(), 1);
    }

    #[test]
    fn test_missing_required_field_names_field_and_path() {
        let err = parse_role_definition(
            "ntp",
            "playbook_src_paths: {}\nplaybook_file: site.yml\n",
            "/roles/ntp/role.yml",
        )
        .unwrap_err();

        assert!(matches!(
            err,
            ConfigError::MissingField {
                field: "playbook_path",
                ..
            }
        ));
        assert_eq!(err.to_string(), "Missing playbook_path in /roles/ntp/role.yml");
    }

    #[test]
    fn test_synthesize_requires_role_map() {
        let content = "playbook_src_paths: {}\nplaybook_path: .\nplaybook_file: \".\"\n";
        let err = parse_role_definition("ntp", content, "role.yml").unwrap_err();
        assert!(matches!(err, ConfigError::MissingRoleMap { .. }));

        let with_map = format!("{content}role_role_map:\n  ntp: [ntp-server]\n");
        let definition = parse_role_definition("ntp", &with_map, "role.yml").unwrap();
        assert_eq!(definition.playbook_file, PlaybookFile::Synthesize);
    }

    #[test]
    fn test_empty_descriptor_is_invalid() {
        let err = parse_role_definition("ntp", "", "role.yml").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDescriptor { .. }));
    }

    #[tokio::test]
    async fn test_load_requires_scripts_dir() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_role_definition("ntp", &local_scripts_dir(dir.path(), "ntp"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingScripts { .. }));
    }
}
