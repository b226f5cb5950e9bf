use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use qt_object::Language;
use qt_resolve::Mode;
use qt_types::{QPath, Registry, ReleaseId};
use qt_vfs::ReleaseFs;
use tracing::{debug, warn};

use crate::config::RepositoryConfig;
use crate::error::{SourceError, SourceResult};
use crate::meta::Meta;
use crate::nature::Nature;
use crate::project::{Project, ProjectConfig, PROJECT_FILE};
use crate::store::SourceStore;

type Key = (ReleaseId, QPath);

/// A repository session: configuration, registry and the identity caches
/// shared by every release opened through it.
///
/// Caches are keyed by (release, path). Project entries also remember
/// directories without a project so lookups walk the disk once.
pub struct Session {
    config: RepositoryConfig,
    registry: Registry,
    mode: Mode,
    language: Language,
    projects: RwLock<HashMap<Key, Option<Arc<Project>>>>,
    natures: RwLock<HashMap<Key, Nature>>,
    metas: RwLock<HashMap<Key, Meta>>,
}

impl Session {
    /// Build a session, loading the registry file named in `config`.
    pub fn new(config: RepositoryConfig) -> SourceResult<Self> {
        let registry = match &config.registry {
            Some(path) => Registry::load(path)?,
            None => Registry::new(),
        };
        Self::with_registry(config, registry)
    }

    pub fn with_registry(config: RepositoryConfig, registry: Registry) -> SourceResult<Self> {
        let invalid = |reason: String| SourceError::Config {
            path: config.root.join(RepositoryConfig::FILE_NAME),
            reason,
        };
        let mode: Mode = config.mode.parse().map_err(|e: qt_resolve::ResolveError| invalid(e.to_string()))?;
        let mut letters = config.language.chars();
        let language = match (letters.next().and_then(Language::from_letter), letters.next()) {
            (Some(language), None) => language,
            _ => return Err(invalid(format!("invalid language `{}`", config.language))),
        };
        Ok(Self {
            config,
            registry,
            mode,
            language,
            projects: RwLock::new(HashMap::new()),
            natures: RwLock::new(HashMap::new()),
            metas: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Default resolution mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Default language for unmodified `l4_` tokens.
    pub fn language(&self) -> Language {
        self.language
    }

    /// Create the layout of `release` if needed and open it writable.
    pub fn init(&self, release: &ReleaseId) -> SourceResult<SourceStore<'_>> {
        let fs = ReleaseFs::create(&self.config.root, release.clone())
            .map_err(|e| SourceError::vfs(release, e))?;
        Ok(SourceStore::new(self, fs))
    }

    /// Open an existing release.
    pub fn open(&self, release: &ReleaseId, readonly: bool) -> SourceResult<SourceStore<'_>> {
        let fs = ReleaseFs::open(&self.config.root, release.clone(), readonly)
            .map_err(|e| SourceError::vfs(release, e))?;
        Ok(SourceStore::new(self, fs))
    }

    // ----- Projects -----

    /// The project rooted exactly at `dir`, if `dir` holds a `project.json`.
    fn project_at(&self, fs: &ReleaseFs, dir: &QPath) -> SourceResult<Option<Arc<Project>>> {
        let key = (fs.release().clone(), dir.clone());
        if let Some(found) = self.projects.read().expect("lock poisoned").get(&key) {
            return Ok(found.clone());
        }

        let config_path = dir.join(PROJECT_FILE)?;
        let loaded = match fs.read_opt(&ReleaseFs::source_place(&config_path)) {
            Ok(Some(data)) => {
                let project = ProjectConfig::parse(&data)
                    .and_then(|config| Project::new(dir.clone(), config))
                    .unwrap_or_else(|reason| {
                        warn!(project = %dir, reason = %reason, "unreadable project config, using defaults");
                        Project::unconfigured(dir.clone())
                    });
                Some(Arc::new(project))
            }
            Ok(None) => None,
            Err(e) => return Err(SourceError::vfs(&config_path, e)),
        };

        let mut projects = self.projects.write().expect("lock poisoned");
        Ok(projects.entry(key).or_insert(loaded).clone())
    }

    /// The project owning `path`: the deepest ancestor directory with a
    /// `project.json` not excluded by an outer project's `notconfig`.
    pub fn project_of(&self, fs: &ReleaseFs, path: &QPath) -> SourceResult<Option<Arc<Project>>> {
        let dirs: Vec<QPath> = path.ancestors().collect();
        let mut found: Option<Arc<Project>> = None;
        for dir in dirs.iter().rev() {
            let Some(project) = self.project_at(fs, dir)? else {
                continue;
            };
            let excluded = match (&found, project.config_path()) {
                (Some(outer), Some(config)) => outer
                    .relative(&config)
                    .map(|rel| outer.is_not_config(rel))
                    .unwrap_or(false),
                _ => false,
            };
            if !excluded {
                found = Some(project);
            }
        }
        Ok(found)
    }

    /// Drop cached project state at `dir` and the natures below it.
    pub fn invalidate_project(&self, release: &ReleaseId, dir: &QPath) {
        self.projects
            .write()
            .expect("lock poisoned")
            .remove(&(release.clone(), dir.clone()));
        let prefix = format!("{}/", dir.as_str());
        self.natures
            .write()
            .expect("lock poisoned")
            .retain(|(r, p), _| r != release || !p.as_str().starts_with(&prefix));
        debug!(release = %release, project = %dir, "project caches invalidated");
    }

    // ----- Natures -----

    pub fn nature(&self, fs: &ReleaseFs, path: &QPath) -> SourceResult<Nature> {
        let key = (fs.release().clone(), path.clone());
        if let Some(nature) = self.natures.read().expect("lock poisoned").get(&key) {
            return Ok(*nature);
        }
        let project = self.project_of(fs, path)?;
        let enclosing = match path.parent() {
            Some(dir) => self.project_of(fs, &dir)?,
            None => None,
        };
        let nature = Nature::compute(path, project.as_deref(), enclosing.as_deref());
        let mut natures = self.natures.write().expect("lock poisoned");
        Ok(*natures.entry(key).or_insert(nature))
    }

    // ----- Meta -----

    /// Cached meta of `path`, read from disk on first use; a fresh record
    /// when none exists.
    pub fn meta(&self, fs: &ReleaseFs, path: &QPath) -> SourceResult<Meta> {
        let key = (fs.release().clone(), path.clone());
        if let Some(meta) = self.metas.read().expect("lock poisoned").get(&key) {
            return Ok(meta.clone());
        }
        let meta = match fs.read_opt(&Meta::place(path)) {
            Ok(Some(data)) => serde_json::from_slice(&data).unwrap_or_else(|e| {
                warn!(source = %path, error = %e, "unreadable meta record, starting fresh");
                Meta::new(path)
            }),
            Ok(None) => Meta::new(path),
            Err(e) => return Err(SourceError::vfs(path, e)),
        };
        let mut metas = self.metas.write().expect("lock poisoned");
        Ok(metas.entry(key).or_insert(meta).clone())
    }

    pub(crate) fn put_meta(&self, release: &ReleaseId, path: &QPath, meta: Meta) {
        self.metas
            .write()
            .expect("lock poisoned")
            .insert((release.clone(), path.clone()), meta);
    }

    /// Forget everything cached about `path`.
    pub(crate) fn forget_source(&self, release: &ReleaseId, path: &QPath) {
        let key = (release.clone(), path.clone());
        self.natures.write().expect("lock poisoned").remove(&key);
        self.metas.write().expect("lock poisoned").remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(root: &std::path::Path) -> Session {
        let config = RepositoryConfig {
            root: root.to_path_buf(),
            ..RepositoryConfig::default()
        };
        Session::with_registry(config, Registry::new()).unwrap()
    }

    fn path(s: &str) -> QPath {
        QPath::parse(s).unwrap()
    }

    #[test]
    fn rejects_bad_mode_and_language() {
        let config = RepositoryConfig {
            mode: "mq".into(),
            ..RepositoryConfig::default()
        };
        assert_eq!(
            Session::with_registry(config, Registry::new()).err().map(|e| e.code()),
            Some("config.invalid")
        );
        let config = RepositoryConfig {
            language: "NE".into(),
            ..RepositoryConfig::default()
        };
        assert!(Session::with_registry(config, Registry::new()).is_err());
    }

    #[test]
    fn open_missing_release_fails() {
        let dir = tempfile::tempdir().unwrap();
        let s = session(dir.path());
        let err = s.open(&ReleaseId::parse("1.00").unwrap(), true).err().unwrap();
        assert_eq!(err.code(), "vfs.release.notfound");
    }

    #[test]
    fn nearest_project_wins_unless_notconfig() {
        let dir = tempfile::tempdir().unwrap();
        let s = session(dir.path());
        let release = ReleaseId::parse("1.00").unwrap();
        let fs = ReleaseFs::create(dir.path(), release).unwrap();
        let put = |p: &str, data: &str| {
            fs.store(&ReleaseFs::source_place(&path(p)), data.as_bytes(), None).unwrap();
        };
        put("/app/project.json", r#"{"notconfig": ["fixtures/*"]}"#);
        put("/app/sub/project.json", "{}");
        put("/app/fixtures/project.json", "{}");

        let owner = |p: &str| {
            s.project_of(&fs, &path(p))
                .unwrap()
                .map(|p| p.root().to_string())
        };
        assert_eq!(owner("/app/a.m").as_deref(), Some("/app"));
        assert_eq!(owner("/app/sub/b.m").as_deref(), Some("/app/sub"));
        assert_eq!(owner("/app/fixtures/c.m").as_deref(), Some("/app"));
        assert_eq!(owner("/other/d.m"), None);

        assert!(s.nature(&fs, &path("/app/sub/project.json")).unwrap().config);
        assert!(!s.nature(&fs, &path("/app/fixtures/project.json")).unwrap().config);
    }

    #[test]
    fn invalidation_refreshes_natures() {
        let dir = tempfile::tempdir().unwrap();
        let s = session(dir.path());
        let release = ReleaseId::parse("1.00").unwrap();
        let fs = ReleaseFs::create(dir.path(), release.clone()).unwrap();
        let config = path("/app/project.json");
        let logo = path("/app/logo.png");

        fs.store(&ReleaseFs::source_place(&config), b"{}", None).unwrap();
        assert!(s.nature(&fs, &logo).unwrap().text);

        fs.store(&ReleaseFs::source_place(&config), br#"{"binary": ["*.png"]}"#, None)
            .unwrap();
        assert!(s.nature(&fs, &logo).unwrap().text, "cached until invalidated");

        s.invalidate_project(&release, &path("/app"));
        assert!(s.nature(&fs, &logo).unwrap().binary);
    }
}
