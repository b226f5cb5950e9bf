use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{SourceError, SourceResult};

/// Repository-wide settings, read from `qt.toml`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Directory holding one subdirectory per release.
    pub root: PathBuf,
    /// JSON registry file for `r4_` lookups.
    pub registry: Option<PathBuf>,
    /// Extensions (with the dot) whose basenames must be unique per release.
    pub unique_extensions: Vec<String>,
    /// Cap on batch worker threads.
    pub workers: usize,
    /// Default resolution mode letters.
    pub mode: String,
    /// Default language letter for `l4_` tokens without modifier.
    pub language: String,
    /// User recorded in meta when the caller names none.
    pub user: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            registry: None,
            unique_extensions: vec![".m".into(), ".x".into()],
            workers: qt_store::DEFAULT_WORKERS,
            mode: "rilmt".into(),
            language: "N".into(),
            user: "usystem".into(),
        }
    }
}

impl RepositoryConfig {
    /// Conventional file name inside a repository root.
    pub const FILE_NAME: &'static str = "qt.toml";

    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Load `path`; relative `root` and `registry` entries are taken
    /// relative to the file's directory.
    pub fn load(path: &Path) -> SourceResult<Self> {
        let config_error = |reason: String| SourceError::Config {
            path: path.to_path_buf(),
            reason,
        };
        let text = fs::read_to_string(path).map_err(|e| config_error(e.to_string()))?;
        let mut config = Self::from_toml_str(&text).map_err(|e| config_error(e.to_string()))?;
        if let Some(base) = path.parent() {
            config.root = base.join(&config.root);
            config.registry = config.registry.map(|r| base.join(r));
        }
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Whether sources with extension `ext` (without dot) need a unique basename.
    pub fn requires_unique(&self, ext: &str) -> bool {
        self.unique_extensions
            .iter()
            .any(|u| u.strip_prefix('.') == Some(ext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = RepositoryConfig::default();
        assert_eq!(c.unique_extensions, vec![".m", ".x"]);
        assert_eq!(c.workers, 16);
        assert_eq!(c.mode, "rilmt");
        assert_eq!(c.language, "N");
        assert_eq!(c.user, "usystem");
        assert!(c.registry.is_none());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = RepositoryConfig::from_toml_str("workers = 4\nunique_extensions = [\".m\"]\n").unwrap();
        assert_eq!(c.workers, 4);
        assert_eq!(c.unique_extensions, vec![".m"]);
        assert_eq!(c.mode, "rilmt");
    }

    #[test]
    fn unique_extension_match() {
        let c = RepositoryConfig::default();
        assert!(c.requires_unique("m"));
        assert!(c.requires_unique("x"));
        assert!(!c.requires_unique("d"));
    }

    #[test]
    fn load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(RepositoryConfig::FILE_NAME);
        fs::write(&file, "root = \"data\"\nregistry = \"registry.json\"\n").unwrap();
        let c = RepositoryConfig::load(&file).unwrap();
        assert_eq!(c.root, dir.path().join("data"));
        assert_eq!(c.registry, Some(dir.path().join("registry.json")));
    }

    #[test]
    fn load_reports_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(RepositoryConfig::FILE_NAME);
        fs::write(&file, "workers = \"many\"").unwrap();
        let err = RepositoryConfig::load(&file).unwrap_err();
        assert_eq!(err.code(), "config.invalid");
    }
}
