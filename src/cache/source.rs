use crate::cache::SourceError;
use std::fmt;
use std::path::PathBuf;
use url::Url;

pub const GALAXY_PREFIX: &str = "galaxy:";

/// Where one logical piece of playbook source comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    /// Installed with the package-registry tool; cache entry is a placeholder
    Galaxy(String),
    /// Cloned once, never re-synced
    Git(Url),
    /// Relative to the role's local scripts directory; re-copied every run
    Local(PathBuf),
}

impl SourceSpec {
    pub fn parse(raw: &str) -> Result<Self, SourceError> {
        let invalid = |reason: &str| SourceError::InvalidSpec {
            spec: raw.to_string(),
            reason: reason.to_string(),
        };

        if let Some(package) = raw.strip_prefix(GALAXY_PREFIX) {
            let package = package.trim();
            if package.is_empty() {
                return Err(invalid("missing package name"));
            }
            return Ok(Self::Galaxy(package.to_string()));
        }

        if raw.starts_with("http://") || raw.starts_with("https://") {
            return Url::parse(raw)
                .map(Self::Git)
                .map_err(|e| invalid(&e.to_string()));
        }

        if raw.trim().is_empty() {
            return Err(invalid("empty local path"));
        }
        Ok(Self::Local(PathBuf::from(raw)))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Galaxy(_) => "galaxy",
            Self::Git(_) => "git",
            Self::Local(_) => "local",
        }
    }

    /// Local sources are refreshed on every run; remote ones only on first
    /// population.
    pub fn refreshes_existing(&self) -> bool {
        matches!(self, Self::Local(_))
    }
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Galaxy(package) => write!(f, "{GALAXY_PREFIX}{package}"),
            Self::Git(url) => write!(f, "{url}"),
            Self::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// One `playbook_src_paths` entry: cache subdirectory name and its source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub name: String,
    pub spec: SourceSpec,
}

impl SourceEntry {
    pub fn new(name: impl Into<String>, spec: SourceSpec) -> Self {
        Self {
            name: name.into(),
            spec,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_galaxy_source() {
        assert_eq!(
            SourceSpec::parse("galaxy:geerlingguy.ntp").unwrap(),
            SourceSpec::Galaxy("geerlingguy.ntp".to_string())
        );
        assert!(SourceSpec::parse("galaxy:").is_err());
    }

    #[test]
    fn test_parse_git_source() {
        let spec = SourceSpec::parse("https://github.com/kubernetes/contrib.git").unwrap();
        assert_eq!(spec.kind(), "git");
        assert!(!spec.refreshes_existing());
        assert_eq!(spec.to_string(), "https://github.com/kubernetes/contrib.git");
    }

    #[test]
    fn test_parse_local_source() {
        let spec = SourceSpec::parse("playbooks").unwrap();
        assert_eq!(spec, SourceSpec::Local(PathBuf::from("playbooks")));
        assert!(spec.refreshes_existing());
        assert!(SourceSpec::parse("  ").is_err());
    }
}
