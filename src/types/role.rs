use crate::cache::SourceEntry;
use crate::resolver::{Condition, PathExpr};
use std::collections::BTreeMap;

/// `playbook_file` value that asks for a generated playbook
pub const SYNTHESIZE_SENTINEL: &str = ".";

/// Parsed role descriptor (`role.yml`)
#[derive(Debug, Clone)]
pub struct RoleDefinition {
    pub playbook_src_paths: Vec<SourceEntry>,
    pub playbook_path: String,
    pub playbook_file: PlaybookFile,
    pub attribute_map: Vec<ValueMapping>,
    pub inventory_map: Vec<ValueMapping>,
    pub role_group_map: BTreeMap<String, Vec<String>>,
    pub role_tag_map: BTreeMap<String, Vec<String>>,
    pub role_role_map: BTreeMap<String, Vec<String>>,
    pub playbook_src_setup: Vec<String>,
}

impl RoleDefinition {
    pub fn groups_for(&self, role: &str) -> Option<&[String]> {
        self.role_group_map.get(role).map(Vec::as_slice)
    }

    pub fn tags_for(&self, role: &str) -> Option<&[String]> {
        self.role_tag_map.get(role).map(Vec::as_slice)
    }

    pub fn sub_roles_for(&self, role: &str) -> Option<&[String]> {
        self.role_role_map.get(role).map(Vec::as_slice)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybookFile {
    /// Build `cluster.yml` from the group and sub-role maps
    Synthesize,
    Named(String),
}

impl PlaybookFile {
    pub fn from_descriptor(value: &str) -> Self {
        if value == SYNTHESIZE_SENTINEL {
            Self::Synthesize
        } else {
            Self::Named(value.to_string())
        }
    }
}

/// One `{name, path, when}` entry of `inventory_map` or `attribute_map`.
///
/// `name` is the expression to resolve, `path` where the value lands (an
/// inventory variable name or a data path), `when` an optional guard.
#[derive(Debug, Clone)]
pub struct ValueMapping {
    pub name: PathExpr,
    pub path: String,
    pub when: Option<Condition>,
}

impl ValueMapping {
    pub fn parse(name: &str, path: impl Into<String>, when: Option<&str>) -> Self {
        Self {
            name: PathExpr::parse(name),
            path: path.into(),
            when: when.map(Condition::parse),
        }
    }
}
