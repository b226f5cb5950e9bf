use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use qt_crypto::ContentHasher;
use qt_object::{token, FileKind, ObjectFile};
use qt_resolve::{Mode, ObjectCache, ResolveContext, ResolveError};
use qt_store::{map_bounded, FsBackend, ObjectStore};
use qt_types::{Diagnostics, ObjectName, QPath, ReleaseId};
use qt_vfs::ReleaseFs;
use tracing::{debug, info, warn};

use crate::error::{SourceError, SourceResult};
use crate::meta::Meta;
use crate::nature::Nature;
use crate::project::{Project, ProjectConfig, PROJECT_FILE};
use crate::session::Session;
use crate::unique;

/// Caller-supplied parameters of a source store.
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// Content digest the caller last saw; a different current digest
    /// refuses the write.
    pub expected_digest: Option<String>,
    /// User recorded in meta; the repository default when absent.
    pub user: Option<String>,
    /// Modification time; now when absent.
    pub at: Option<DateTime<Utc>>,
}

/// Outcome of a source store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreReport {
    pub changed: bool,
    /// Refreshed meta, when the content changed.
    pub meta: Option<Meta>,
    /// For object files: each object written or removed, and whether its
    /// record changed.
    pub objects: BTreeMap<String, bool>,
}

/// Sources of one release, with their objects and dependency links.
pub struct SourceStore<'s> {
    session: &'s Session,
    fs: ReleaseFs,
    objects: ObjectStore,
}

impl<'s> SourceStore<'s> {
    pub(crate) fn new(session: &'s Session, fs: ReleaseFs) -> Self {
        let objects = ObjectStore::new(Arc::new(FsBackend::new(fs.clone())))
            .with_workers(session.config().workers);
        Self {
            session,
            fs,
            objects,
        }
    }

    pub fn release(&self) -> &ReleaseId {
        self.fs.release()
    }

    pub fn fs(&self) -> &ReleaseFs {
        &self.fs
    }

    /// The object store of this release.
    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    pub fn nature(&self, path: &QPath) -> SourceResult<Nature> {
        self.session.nature(&self.fs, path)
    }

    pub fn project(&self, path: &QPath) -> SourceResult<Option<Arc<Project>>> {
        self.session.project_of(&self.fs, path)
    }

    /// Object names left unresolved in `path` by its project.
    pub fn not_replaced(&self, path: &QPath) -> SourceResult<BTreeSet<String>> {
        Ok(self
            .project(path)?
            .and_then(|p| p.relative(path).map(|rel| p.not_replaced(rel)))
            .unwrap_or_default())
    }

    /// Macro environment of `path`: `qpath`, `qdir`, `qbase`, `qext`
    /// (with the dot), `release`, `project`.
    pub fn env(&self, path: &QPath) -> SourceResult<BTreeMap<String, String>> {
        let (dir, base) = path.partition();
        let project = self
            .project(path)?
            .map(|p| p.root().to_string())
            .unwrap_or_default();
        let ext = path.extension().map(|e| format!(".{e}")).unwrap_or_default();
        Ok(BTreeMap::from([
            ("qpath".to_string(), path.to_string()),
            ("qdir".to_string(), dir.to_string()),
            ("qbase".to_string(), base.to_string()),
            ("qext".to_string(), ext),
            ("release".to_string(), self.release().to_string()),
            ("project".to_string(), project),
        ]))
    }

    // ----- Fetch -----

    pub fn fetch(&self, path: &QPath) -> SourceResult<Vec<u8>> {
        self.fs
            .read_opt(&ReleaseFs::source_place(path))
            .map_err(|e| SourceError::vfs(path, e))?
            .ok_or_else(|| SourceError::NotFound {
                path: path.to_string(),
            })
    }

    /// Meta of an existing source, with the digest of its current content.
    pub fn meta(&self, path: &QPath) -> SourceResult<Meta> {
        let data = self.fetch(path)?;
        let mut meta = self.session.meta(&self.fs, path)?;
        meta.digest = ContentHasher::CONTENT.hex(&data);
        Ok(meta)
    }

    // ----- Store -----

    /// Store `data` as the content of `path`.
    pub fn store(
        &self,
        path: &QPath,
        data: &[u8],
        options: &StoreOptions,
    ) -> SourceResult<StoreReport> {
        if self.fs.is_readonly() {
            return Err(SourceError::ReadOnly {
                path: path.to_string(),
            });
        }
        let nature = self.nature(path)?;
        if nature.config {
            ProjectConfig::parse(data).map_err(|reason| SourceError::ConfigInvalid {
                path: path.to_string(),
                reason,
            })?;
        }
        self.check_unique(path)?;

        let place = ReleaseFs::source_place(path);
        let previous = self
            .fs
            .read_opt(&place)
            .map_err(|e| SourceError::vfs(path, e))?;
        let parsed = match nature.object_file() {
            Some(kind) => Some(self.check_objects(path, kind, previous.as_deref(), data)?),
            None => None,
        };

        let outcome = self
            .fs
            .store(&place, data, options.expected_digest.as_deref())
            .map_err(|e| SourceError::vfs(path, e))?;
        if !outcome.changed {
            debug!(release = %self.release(), source = %path, "source unchanged");
            return Ok(StoreReport::default());
        }

        unique::register(&self.fs, path).map_err(|e| SourceError::vfs(path, e))?;

        if nature.text && !nature.objectfile && !nature.config {
            let skip = self.not_replaced(path)?;
            let before = previous
                .as_deref()
                .map(|b| references(b, &skip))
                .unwrap_or_default();
            let after = references(data, &skip);
            self.objects
                .relink(path.as_str(), &before, &after)
                .map_err(|e| SourceError::store(path, e))?;
        }

        let meta = self.refresh_meta(path, data, options)?;

        let mut objects = BTreeMap::new();
        if let Some((file, removed)) = parsed {
            let mut failures = Diagnostics::new();
            let stored = self.objects.store_list(&file.objects);
            for (object, result) in file.objects.iter().zip(stored) {
                match result {
                    Ok(changed) => {
                        objects.insert(object.name().to_string(), changed);
                    }
                    Err(e) => failures.push(
                        e.to_diagnostic()
                            .with_file(path.as_str())
                            .with_line(object.line),
                    ),
                }
            }
            // Dependents were checked before the write.
            let purged = self.objects.purge_list(&removed);
            for (name, result) in removed.iter().zip(purged) {
                match result {
                    Ok(_) => {
                        objects.insert(name.to_string(), true);
                    }
                    Err(e) => failures.push(e.to_diagnostic().with_file(path.as_str())),
                }
            }
            if !failures.is_empty() {
                return Err(SourceError::ObjectWrites {
                    path: path.to_string(),
                    diagnostics: failures,
                });
            }
        }

        if nature.config {
            if let Some(dir) = path.parent() {
                self.session.invalidate_project(self.release(), &dir);
            }
        }

        info!(
            release = %self.release(),
            source = %path,
            bytes = data.len(),
            objects = objects.len(),
            "source stored"
        );
        Ok(StoreReport {
            changed: true,
            meta: Some(meta),
            objects,
        })
    }

    fn check_unique(&self, path: &QPath) -> SourceResult<()> {
        let Some(ext) = path.extension() else {
            return Ok(());
        };
        if !self.session.config().requires_unique(ext) {
            return Ok(());
        }
        if let Some(project) = self.project(path)? {
            if project.relative(path).is_some_and(|rel| project.is_not_unique(rel)) {
                return Ok(());
            }
        }
        match unique::other_owner(&self.fs, path).map_err(|e| SourceError::vfs(path, e))? {
            Some(owner) => Err(SourceError::NotUnique {
                path: path.to_string(),
                owner,
            }),
            None => Ok(()),
        }
    }

    /// Parse the new content of an object file and verify it may replace
    /// the previous one. Returns the parsed file and the objects it drops.
    fn check_objects(
        &self,
        path: &QPath,
        kind: FileKind,
        previous: Option<&[u8]>,
        data: &[u8],
    ) -> SourceResult<(ObjectFile, Vec<ObjectName>)> {
        let release = self.release();
        let file = ObjectFile::parse(release, path, kind, data).map_err(|diagnostics| {
            SourceError::Objects {
                path: path.to_string(),
                diagnostics,
            }
        })?;

        let names: Vec<ObjectName> = file.objects.iter().map(|o| o.name().clone()).collect();
        for (name, result) in names.iter().zip(self.objects.fetch_list(&names)) {
            match result {
                Ok(existing) if existing.source != *path => {
                    return Err(SourceError::OtherDefinition {
                        path: path.to_string(),
                        object: name.to_string(),
                        owner: existing.source.to_string(),
                    })
                }
                Ok(_) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(SourceError::store(path, e)),
            }
        }

        let before: BTreeSet<ObjectName> = previous
            .and_then(|b| ObjectFile::parse(release, path, kind, b).ok())
            .map(|f| f.objects.iter().map(|o| o.name().clone()).collect())
            .unwrap_or_default();
        let after: BTreeSet<ObjectName> = names.into_iter().collect();
        let removed: Vec<ObjectName> = before.difference(&after).cloned().collect();

        let rewritten: BTreeMap<String, BTreeSet<ObjectName>> = file
            .objects
            .iter()
            .map(|o| (o.name().to_string(), o.references()))
            .collect();
        self.check_dependents(path, &removed, &rewritten, |object, dependents| {
            SourceError::ObjectDependents {
                path: path.to_string(),
                object,
                dependents,
            }
        })?;
        Ok((file, removed))
    }

    /// Refuse when any of `names` has a dependent outside `names` itself.
    ///
    /// `rewritten` holds the new references of objects replaced by the same
    /// store; such a referrer counts only if it still refers to the name.
    fn check_dependents(
        &self,
        path: &QPath,
        names: &[ObjectName],
        rewritten: &BTreeMap<String, BTreeSet<ObjectName>>,
        refuse: impl Fn(String, Vec<String>) -> SourceError,
    ) -> SourceResult<()> {
        let leaving: BTreeSet<String> = names.iter().map(|n| n.to_string()).collect();
        for (name, result) in names.iter().zip(self.objects.get_dependencies(names)) {
            let dependents: Vec<String> = result
                .map_err(|e| SourceError::store(path, e))?
                .into_iter()
                .filter(|d| !leaving.contains(d))
                .filter(|d| rewritten.get(d).map_or(true, |refs| refs.contains(name)))
                .collect();
            if !dependents.is_empty() {
                return Err(refuse(name.to_string(), dependents));
            }
        }
        Ok(())
    }

    fn refresh_meta(&self, path: &QPath, data: &[u8], options: &StoreOptions) -> SourceResult<Meta> {
        let mut meta = self.session.meta(&self.fs, path)?;
        let user = options
            .user
            .as_deref()
            .unwrap_or(self.session.config().user.as_str());
        meta.source = path.to_string();
        meta.touch(user, options.at.unwrap_or_else(Utc::now));

        let record = serde_json::to_vec_pretty(&meta).map_err(|e| SourceError::Meta {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        self.fs
            .store(&Meta::place(path), &record, None)
            .map_err(|e| SourceError::vfs(path, e))?;
        self.session.put_meta(self.release(), path, meta.clone());

        meta.digest = ContentHasher::CONTENT.hex(data);
        Ok(meta)
    }

    // ----- Waste -----

    /// Remove `path` with its objects, links, meta and uniqueness entry.
    ///
    /// Returns `false` if the source did not exist.
    pub fn waste(&self, path: &QPath) -> SourceResult<bool> {
        if self.fs.is_readonly() {
            return Err(SourceError::ReadOnly {
                path: path.to_string(),
            });
        }
        let place = ReleaseFs::source_place(path);
        let Some(content) = self
            .fs
            .read_opt(&place)
            .map_err(|e| SourceError::vfs(path, e))?
        else {
            return Ok(false);
        };
        let nature = self.nature(path)?;

        if nature.config {
            let dir_place = match path.parent() {
                Some(dir) => ReleaseFs::source_place(&dir),
                None => ReleaseFs::SOURCE_DIR.to_string(),
            };
            let entries = self
                .fs
                .read_dir(&dir_place)
                .map_err(|e| SourceError::vfs(path, e))?;
            if entries.iter().any(|entry| entry != PROJECT_FILE) {
                return Err(SourceError::WasteConfig {
                    path: path.to_string(),
                });
            }
        }

        if let Some(kind) = nature.object_file() {
            let file = ObjectFile::parse(self.release(), path, kind, &content).map_err(
                |diagnostics| SourceError::Objects {
                    path: path.to_string(),
                    diagnostics,
                },
            )?;
            let names: Vec<ObjectName> = file.objects.iter().map(|o| o.name().clone()).collect();
            let mut owned = Vec::new();
            for (name, result) in names.iter().zip(self.objects.fetch_list(&names)) {
                match result {
                    Ok(object) if object.source == *path => owned.push(name.clone()),
                    Ok(_) => {}
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(SourceError::store(path, e)),
                }
            }
            self.check_dependents(path, &owned, &BTreeMap::new(), |object, dependents| {
                SourceError::WasteDependent {
                    path: path.to_string(),
                    object,
                    dependents,
                }
            })?;
            for result in self.objects.purge_list(&owned) {
                result.map_err(|e| SourceError::store(path, e))?;
            }
        } else if nature.text && !nature.config {
            // Unfiltered: links made before a do-not-replace change go too.
            let before = token::references(&String::from_utf8_lossy(&content));
            self.objects
                .relink(path.as_str(), &before, &BTreeSet::new())
                .map_err(|e| SourceError::store(path, e))?;
        }

        let wasted = |rel: &str| self.fs.waste(rel).map_err(|e| SourceError::vfs(path, e));
        wasted(&Meta::place(path))?;
        wasted(&place)?;
        unique::unregister(&self.fs, path).map_err(|e| SourceError::vfs(path, e))?;

        self.session.forget_source(self.release(), path);
        if nature.config {
            if let Some(dir) = path.parent() {
                self.session.invalidate_project(self.release(), &dir);
            }
        }
        info!(release = %self.release(), source = %path, "source wasted");
        Ok(true)
    }

    // ----- Resolve -----

    /// Expand the references in `path` selected by `mode`.
    ///
    /// Binary sources and object files come back unchanged (lossily
    /// decoded). A resolution failure returns the raw body with the error.
    pub fn resolve(
        &self,
        path: &QPath,
        mode: Mode,
        cache: &mut ObjectCache,
        texts: &BTreeMap<String, String>,
    ) -> SourceResult<(String, Option<ResolveError>)> {
        let data = self.fetch(path)?;
        let body = String::from_utf8_lossy(&data).into_owned();
        let nature = self.nature(path)?;
        if !nature.text || nature.objectfile {
            return Ok((body, None));
        }
        let env = self.env(path)?;
        let skip = self.not_replaced(path)?;
        let result = ResolveContext::new(&self.objects, self.session.registry(), cache)
            .with_texts(texts)
            .with_not_replace(&skip)
            .with_env(&env)
            .with_language(self.session.language())
            .resolve(&body, mode);
        match result {
            Ok(text) => Ok((text, None)),
            Err(e) => {
                warn!(source = %path, code = e.code(), error = %e, "resolution failed, returning raw body");
                Ok((body, Some(e)))
            }
        }
    }

    // ----- Batches -----

    /// Store many sources. Project configurations go first, one at a time,
    /// so the rest see their rules. Results align with `items`.
    pub fn store_list(
        &self,
        items: &[(QPath, Vec<u8>)],
        options: &StoreOptions,
    ) -> Vec<SourceResult<StoreReport>> {
        let (configs, rest): (Vec<usize>, Vec<usize>) =
            (0..items.len()).partition(|&i| items[i].0.base_name() == PROJECT_FILE);
        let mut results: Vec<Option<SourceResult<StoreReport>>> =
            (0..items.len()).map(|_| None).collect();
        for i in configs {
            results[i] = Some(self.store(&items[i].0, &items[i].1, options));
        }
        let stored = map_bounded(&rest, self.session.config().workers, |&i| {
            self.store(&items[i].0, &items[i].1, options)
        });
        for (i, result) in rest.into_iter().zip(stored) {
            results[i] = Some(result);
        }
        // Every slot was filled above.
        results.into_iter().flatten().collect()
    }

    pub fn waste_list(&self, paths: &[QPath]) -> Vec<SourceResult<bool>> {
        map_bounded(paths, self.session.config().workers, |p| self.waste(p))
    }

    pub fn fetch_list(&self, paths: &[QPath]) -> Vec<SourceResult<Vec<u8>>> {
        map_bounded(paths, self.session.config().workers, |p| self.fetch(p))
    }

    /// Checks a stored source without changing it. Object files report
    /// their parse errors or lint findings and a project config reports
    /// whether it validates. Other sources, and `nolint` ones, are clean.
    pub fn lint(&self, path: &QPath) -> SourceResult<Diagnostics> {
        let nature = self.nature(path)?;
        let data = self.fetch(path)?;
        if nature.nolint {
            return Ok(Diagnostics::new());
        }
        if nature.config {
            let found = match ProjectConfig::parse(&data) {
                Ok(_) => Diagnostics::new(),
                Err(reason) => Diagnostics::from(
                    SourceError::ConfigInvalid {
                        path: path.to_string(),
                        reason,
                    }
                    .to_diagnostic(),
                ),
            };
            return Ok(found);
        }
        let Some(kind) = nature.object_file() else {
            return Ok(Diagnostics::new());
        };
        let found = match ObjectFile::parse(self.release(), path, kind, &data) {
            Ok(file) => file.lint(),
            Err(diagnostics) => diagnostics,
        };
        debug!(path = %path, findings = found.len(), "source linted");
        Ok(found)
    }

    pub fn lint_list(&self, paths: &[QPath]) -> Vec<SourceResult<Diagnostics>> {
        map_bounded(paths, self.session.config().workers, |p| self.lint(p))
    }
}

/// Stored-object references in `data`, minus the do-not-replace names.
fn references(data: &[u8], skip: &BTreeSet<String>) -> BTreeSet<ObjectName> {
    token::references(&String::from_utf8_lossy(data))
        .into_iter()
        .filter(|name| !skip.contains(&name.to_string()))
        .collect()
}
