//! Project configuration (`project.json`) and compiled path rules.

use std::collections::{BTreeMap, BTreeSet};

use globset::{Glob, GlobSet, GlobSetBuilder};
use qt_types::QPath;
use serde::{Deserialize, Serialize};

/// File name marking a project root.
pub const PROJECT_FILE: &str = "project.json";

/// Contents of a `project.json`. Unknown keys are refused.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
    #[serde(rename = "$id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "$schema", skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub passive: bool,
    pub core: bool,
    pub priority: i64,
    pub groups: Vec<String>,
    pub names: Vec<String>,
    pub roles: Vec<String>,
    pub mumps: Vec<String>,
    #[serde(rename = "versionlower")]
    pub version_lower: String,
    #[serde(rename = "versionupper")]
    pub version_upper: String,
    /// Globs for sources that are not text.
    pub binary: Vec<String>,
    /// Globs for sources exempt from object-family natures.
    #[serde(rename = "notbrocade")]
    pub not_brocade: Vec<String>,
    /// Globs for nested `project.json` files that are plain sources.
    #[serde(rename = "notconfig")]
    pub not_config: Vec<String>,
    /// Globs for sources exempt from basename uniqueness.
    #[serde(rename = "notunique")]
    pub not_unique: Vec<String>,
    /// Per relative path, object names left unresolved.
    #[serde(rename = "objectsnotreplaced")]
    pub objects_not_replaced: BTreeMap<String, Vec<String>>,
    #[serde(rename = "objectsnotchecked")]
    pub objects_not_checked: Vec<String>,
    #[serde(rename = "emptydirs")]
    pub empty_dirs: Vec<String>,
}

impl ProjectConfig {
    /// Parse and validate raw `project.json` bytes, including the globs.
    pub fn parse(data: &[u8]) -> Result<Self, String> {
        let config: Self = serde_json::from_slice(data).map_err(|e| e.to_string())?;
        for pattern in config
            .binary
            .iter()
            .chain(&config.not_brocade)
            .chain(&config.not_config)
            .chain(&config.not_unique)
        {
            Glob::new(pattern).map_err(|e| format!("invalid glob {pattern:?}: {e}"))?;
        }
        Ok(config)
    }
}

/// A project: its root directory and compiled configuration.
#[derive(Debug, Clone)]
pub struct Project {
    root: QPath,
    config: ProjectConfig,
    binary: GlobSet,
    not_brocade: GlobSet,
    not_config: GlobSet,
    not_unique: GlobSet,
}

impl Project {
    pub fn new(root: QPath, config: ProjectConfig) -> Result<Self, String> {
        Ok(Self {
            binary: compile(&config.binary)?,
            not_brocade: compile(&config.not_brocade)?,
            not_config: compile(&config.not_config)?,
            not_unique: compile(&config.not_unique)?,
            root,
            config,
        })
    }

    /// A project with the default configuration.
    pub fn unconfigured(root: QPath) -> Self {
        Self {
            root,
            config: ProjectConfig::default(),
            binary: GlobSet::empty(),
            not_brocade: GlobSet::empty(),
            not_config: GlobSet::empty(),
            not_unique: GlobSet::empty(),
        }
    }

    pub fn root(&self) -> &QPath {
        &self.root
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    /// Location of this project's configuration source.
    pub fn config_path(&self) -> Option<QPath> {
        self.root.join(PROJECT_FILE).ok()
    }

    /// `path` relative to the project root.
    pub fn relative<'p>(&self, path: &'p QPath) -> Option<&'p str> {
        path.strip_dir(&self.root)
    }

    pub fn is_binary(&self, rel: &str) -> bool {
        self.binary.is_match(rel)
    }

    pub fn is_not_brocade(&self, rel: &str) -> bool {
        self.not_brocade.is_match(rel)
    }

    pub fn is_not_config(&self, rel: &str) -> bool {
        self.not_config.is_match(rel)
    }

    pub fn is_not_unique(&self, rel: &str) -> bool {
        self.not_unique.is_match(rel)
    }

    /// Canonical object names (`m4_X`) left unresolved in `rel`.
    pub fn not_replaced(&self, rel: &str) -> BTreeSet<String> {
        self.config
            .objects_not_replaced
            .get(rel)
            .map(|names| names.iter().cloned().collect())
            .unwrap_or_default()
    }
}

fn compile(patterns: &[String]) -> Result<GlobSet, String> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| format!("invalid glob {pattern:?}: {e}"))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| format!("failed to build globset: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(json: &str) -> Project {
        Project::new(
            QPath::parse("/app").unwrap(),
            ProjectConfig::parse(json.as_bytes()).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn empty_object_is_a_valid_config() {
        let config = ProjectConfig::parse(b"{}").unwrap();
        assert_eq!(config, ProjectConfig::default());
    }

    #[test]
    fn unknown_keys_are_refused() {
        let err = ProjectConfig::parse(br#"{"colour": "blue"}"#).unwrap_err();
        assert!(err.contains("colour"), "{err}");
    }

    #[test]
    fn schema_keys_are_accepted() {
        let config = ProjectConfig::parse(br#"{"$schema": "s", "$id": "i", "core": true}"#).unwrap();
        assert!(config.core);
        assert_eq!(config.schema.as_deref(), Some("s"));
    }

    #[test]
    fn bad_glob_is_refused() {
        assert!(ProjectConfig::parse(br#"{"binary": ["a[b"]}"#).is_err());
    }

    #[test]
    fn rules_match_relative_paths() {
        let p = project(r#"{"binary": ["*.png"], "notbrocade": ["vendor/*"], "notunique": ["test/*.m"]}"#);
        let logo = QPath::parse("/app/img/logo.png").unwrap();
        let rel = p.relative(&logo).unwrap();
        assert_eq!(rel, "img/logo.png");
        assert!(p.is_binary(rel));
        assert!(p.is_not_brocade("vendor/lib.m"));
        assert!(!p.is_not_brocade("src/lib.m"));
        assert!(p.is_not_unique("test/a.m"));
    }

    #[test]
    fn objects_not_replaced_per_path() {
        let p = project(r#"{"objectsnotreplaced": {"src/a.m": ["m4_X", "r4_home"]}}"#);
        let names = p.not_replaced("src/a.m");
        assert!(names.contains("m4_X"));
        assert!(names.contains("r4_home"));
        assert!(p.not_replaced("src/b.m").is_empty());
    }
}
