use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use qt_object::{token, Object};
use qt_types::{ObjectName, ReleaseId};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::parallel::map_bounded;
use crate::traits::ObjectBackend;

/// Default cap on batch worker threads.
pub const DEFAULT_WORKERS: usize = 16;

/// Object store for one release, with dependency tracking.
#[derive(Clone)]
pub struct ObjectStore {
    backend: Arc<dyn ObjectBackend>,
    workers: usize,
}

impl ObjectStore {
    pub fn new(backend: Arc<dyn ObjectBackend>) -> Self {
        Self {
            backend,
            workers: DEFAULT_WORKERS,
        }
    }

    /// Cap the batch worker pool.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn release(&self) -> &ReleaseId {
        self.backend.release()
    }

    // ----- Single-item operations -----

    /// Fetch the current value of `name`.
    pub fn fetch(&self, name: &ObjectName) -> StoreResult<Object> {
        let data = self
            .backend
            .read_record(name)?
            .ok_or_else(|| StoreError::NotFound {
                name: name.to_string(),
            })?;
        Object::from_record(name, self.release().clone(), &data)
            .map_err(|e| StoreError::from_object(e, name))
    }

    /// Store `object`. Returns `false` when the stored record was identical.
    ///
    /// On change the definer link and the links to every referenced object
    /// are brought in line with the new record.
    pub fn store(&self, object: &Object) -> StoreResult<bool> {
        let name = object.name();
        if &object.release != self.release() {
            return Err(StoreError::ReleaseMismatch {
                name: name.to_string(),
                expected: self.release().to_string(),
                actual: object.release.to_string(),
            });
        }
        let data = object
            .to_record()
            .map_err(|e| StoreError::from_object(e, name))?;
        let write = self.backend.write_record(name, &data)?;
        if !write.changed {
            return Ok(false);
        }

        let previous = write.before.as_deref().map(|old| {
            Object::from_record(name, self.release().clone(), old).map_err(|e| {
                warn!(object = %name, error = %e, "previous record unreadable, diffing raw text");
                token::references(&String::from_utf8_lossy(old))
            })
        });
        let before = match &previous {
            Some(Ok(old)) => {
                if old.source != object.source {
                    self.backend.remove_link(name, old.source.as_str())?;
                }
                old.references()
            }
            Some(Err(raw)) => raw.clone(),
            None => BTreeSet::new(),
        };
        self.backend.add_link(name, object.source.as_str())?;
        self.relink(&name.to_string(), &before, &object.references())?;
        debug!(object = %name, release = %self.release(), "object stored");
        Ok(true)
    }

    /// Waste `name` unless something still refers to it.
    ///
    /// Returns `false` if the object was already absent.
    pub fn waste(&self, name: &ObjectName) -> StoreResult<bool> {
        let dependents = self.dependencies(name)?;
        if !dependents.is_empty() {
            return Err(StoreError::HasDependents {
                name: name.to_string(),
                dependents,
            });
        }
        self.purge(name)
    }

    /// Remove `name` with its own outgoing links and definer link, without
    /// checking dependents. Callers verify dependents beforehand.
    pub fn purge(&self, name: &ObjectName) -> StoreResult<bool> {
        let Some(data) = self.backend.read_record(name)? else {
            return Ok(false);
        };
        match Object::from_record(name, self.release().clone(), &data) {
            Ok(object) => {
                let referrer = name.to_string();
                for target in object.references() {
                    self.backend.remove_link(&target, &referrer)?;
                }
                self.backend.remove_link(name, object.source.as_str())?;
            }
            Err(e) => warn!(object = %name, error = %e, "removing unreadable record"),
        }
        let removed = self.backend.remove_record(name)?;
        debug!(object = %name, release = %self.release(), "object wasted");
        Ok(removed)
    }

    /// Referrers of `name` other than its defining source, sorted.
    pub fn dependencies(&self, name: &ObjectName) -> StoreResult<Vec<String>> {
        let mut referrers = self.backend.links(name)?;
        let definer = match self.backend.read_record(name)? {
            Some(data) => Object::from_record(name, self.release().clone(), &data)
                .ok()
                .map(|o| o.source.to_string()),
            None => None,
        };
        if let Some(definer) = definer {
            referrers.retain(|r| *r != definer);
        }
        Ok(referrers)
    }

    /// Transitive referrers of each of `names`: objects using it directly
    /// or through other objects, and the sources at the end of those
    /// chains. Results align with `names`, each sorted.
    ///
    /// An object that ends up among its own referrers is
    /// [`StoreError::Cyclic`].
    pub fn dependencies_deep(&self, names: &[ObjectName]) -> StoreResult<Vec<Vec<String>>> {
        let mut direct: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut todo: Vec<ObjectName> = names.to_vec();
        while !todo.is_empty() {
            let fresh: Vec<ObjectName> = todo
                .drain(..)
                .filter(|n| !direct.contains_key(&n.to_string()))
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            for (name, result) in fresh.iter().zip(self.get_dependencies(&fresh)) {
                let referrers = result?;
                todo.extend(
                    referrers
                        .iter()
                        .filter(|r| !r.starts_with('/'))
                        .filter_map(|r| ObjectName::parse(r).ok()),
                );
                direct.insert(name.to_string(), referrers);
            }
        }

        names
            .iter()
            .map(|name| {
                let start = name.to_string();
                let mut seen = BTreeSet::new();
                let mut stack = vec![start.as_str()];
                while let Some(current) = stack.pop() {
                    for referrer in direct.get(current).into_iter().flatten() {
                        if seen.insert(referrer.as_str()) {
                            stack.push(referrer.as_str());
                        }
                    }
                }
                if seen.contains(start.as_str()) {
                    return Err(StoreError::Cyclic {
                        name: name.to_string(),
                    });
                }
                Ok(seen.into_iter().map(str::to_string).collect())
            })
            .collect()
    }

    // ----- Links -----

    /// Bring the links from `referrer` in line with a reference change.
    pub fn relink(
        &self,
        referrer: &str,
        before: &BTreeSet<ObjectName>,
        after: &BTreeSet<ObjectName>,
    ) -> StoreResult<()> {
        for added in after.difference(before) {
            self.backend.add_link(added, referrer)?;
        }
        for removed in before.difference(after) {
            self.backend.remove_link(removed, referrer)?;
        }
        Ok(())
    }

    // ----- Batches -----

    pub fn fetch_list(&self, names: &[ObjectName]) -> Vec<StoreResult<Object>> {
        map_bounded(names, self.workers, |name| self.fetch(name))
    }

    pub fn store_list(&self, objects: &[Object]) -> Vec<StoreResult<bool>> {
        map_bounded(objects, self.workers, |object| self.store(object))
    }

    pub fn waste_list(&self, names: &[ObjectName]) -> Vec<StoreResult<bool>> {
        map_bounded(names, self.workers, |name| self.waste(name))
    }

    pub fn purge_list(&self, names: &[ObjectName]) -> Vec<StoreResult<bool>> {
        map_bounded(names, self.workers, |name| self.purge(name))
    }

    pub fn get_dependencies(&self, names: &[ObjectName]) -> Vec<StoreResult<Vec<String>>> {
        map_bounded(names, self.workers, |name| self.dependencies(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::FsBackend;
    use crate::memory::MemoryBackend;
    use qt_object::{Include, Macro, ObjectBody};
    use qt_types::QPath;
    use qt_vfs::ReleaseFs;

    fn release() -> ReleaseId {
        ReleaseId::parse("1.00").unwrap()
    }

    fn memory_store() -> ObjectStore {
        ObjectStore::new(Arc::new(MemoryBackend::new(release())))
    }

    fn name(s: &str) -> ObjectName {
        ObjectName::parse(s).unwrap()
    }

    fn mac(id: &str, body: &str, source: &str) -> Object {
        let mut m = Macro::new(id);
        m.body = body.into();
        Object::new(release(), QPath::parse(source).unwrap(), 1, ObjectBody::Macro(m)).unwrap()
    }

    fn deps(store: &ObjectStore, n: &str) -> Vec<String> {
        store.dependencies(&name(n)).unwrap()
    }

    // ----- Fetch / store -----

    #[test]
    fn store_then_fetch() {
        let store = memory_store();
        let obj = mac("X", "x", "/app/m.d");
        assert!(store.store(&obj).unwrap());
        assert_eq!(store.fetch(&name("m4_X")).unwrap(), obj);
    }

    #[test]
    fn fetch_missing_is_not_found() {
        let err = memory_store().fetch(&name("m4_NOPE")).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.code(), "object.fetch.notfound");
    }

    #[test]
    fn fetch_corrupt_record() {
        let backend = Arc::new(MemoryBackend::new(release()));
        backend.write_record(&name("m4_X"), b"{oops").unwrap();
        let err = ObjectStore::new(backend).fetch(&name("m4_X")).unwrap_err();
        assert_eq!(err.code(), "object.fetch.corrupt");
    }

    #[test]
    fn identical_store_is_noop() {
        let store = memory_store();
        let obj = mac("X", "x", "/app/m.d");
        assert!(store.store(&obj).unwrap());
        assert!(!store.store(&obj).unwrap());
    }

    #[test]
    fn store_refuses_foreign_release() {
        let store = memory_store();
        let mut obj = mac("X", "x", "/app/m.d");
        obj.release = ReleaseId::parse("2.00").unwrap();
        assert_eq!(store.store(&obj).unwrap_err().code(), "object.store.release");
    }

    // ----- Dependencies -----

    #[test]
    fn definer_is_not_a_dependent() {
        let store = memory_store();
        store.store(&mac("X", "x", "/app/m.d")).unwrap();
        assert!(deps(&store, "m4_X").is_empty());
    }

    #[test]
    fn object_references_are_linked_and_unlinked() {
        let store = memory_store();
        store.store(&mac("A", "uses m4_B and i4_C", "/app/m.d")).unwrap();
        assert_eq!(deps(&store, "m4_B"), vec!["m4_A"]);
        assert_eq!(deps(&store, "i4_C"), vec!["m4_A"]);

        store.store(&mac("A", "uses m4_B only", "/app/m.d")).unwrap();
        assert_eq!(deps(&store, "m4_B"), vec!["m4_A"]);
        assert!(deps(&store, "i4_C").is_empty());
    }

    #[test]
    fn moving_definition_relinks_definer() {
        let backend = Arc::new(MemoryBackend::new(release()));
        let store = ObjectStore::new(backend.clone());
        store.store(&mac("X", "x", "/app/one.d")).unwrap();
        store.store(&mac("X", "x", "/app/two.d")).unwrap();
        assert_eq!(backend.links(&name("m4_X")).unwrap(), vec!["/app/two.d"]);
    }

    #[test]
    fn relink_diffs_sets() {
        let store = memory_store();
        let before: BTreeSet<ObjectName> = [name("m4_X"), name("m4_Y")].into();
        let after: BTreeSet<ObjectName> = [name("m4_Y"), name("m4_Z")].into();
        store.relink("/s", &BTreeSet::new(), &before).unwrap();
        store.relink("/s", &before, &after).unwrap();
        assert!(deps(&store, "m4_X").is_empty());
        assert_eq!(deps(&store, "m4_Y"), vec!["/s"]);
        assert_eq!(deps(&store, "m4_Z"), vec!["/s"]);
    }

    // ----- Waste -----

    #[test]
    fn waste_refused_while_referenced() {
        let store = memory_store();
        store.store(&mac("X", "x", "/app/m.d")).unwrap();
        let refs: BTreeSet<ObjectName> = [name("m4_X")].into();
        store.relink("/app/a.m", &BTreeSet::new(), &refs).unwrap();

        let err = store.waste(&name("m4_X")).unwrap_err();
        assert_eq!(err.code(), "object.waste.deps");
        assert!(store.fetch(&name("m4_X")).is_ok());

        store.relink("/app/a.m", &refs, &BTreeSet::new()).unwrap();
        assert!(store.waste(&name("m4_X")).unwrap());
        assert!(store.fetch(&name("m4_X")).unwrap_err().is_not_found());
    }

    #[test]
    fn waste_is_idempotent() {
        let store = memory_store();
        assert!(!store.waste(&name("m4_GONE")).unwrap());
    }

    #[test]
    fn waste_drops_outgoing_links() {
        let store = memory_store();
        store.store(&mac("A", "m4_B", "/app/m.d")).unwrap();
        assert_eq!(deps(&store, "m4_B"), vec!["m4_A"]);
        store.waste(&name("m4_A")).unwrap();
        assert!(deps(&store, "m4_B").is_empty());
    }

    // ----- Batches -----

    #[test]
    fn batches_are_positional_and_isolated() {
        let store = memory_store().with_workers(4);
        let objects: Vec<Object> = (0..10).map(|i| mac(&format!("M{i}"), "x", "/app/m.d")).collect();
        let stored = store.store_list(&objects);
        assert!(stored.iter().all(|r| matches!(r, Ok(true))));

        let names = vec![name("m4_M3"), name("m4_MISSING"), name("m4_M7")];
        let fetched = store.fetch_list(&names);
        assert_eq!(fetched[0].as_ref().unwrap().name(), &names[0]);
        assert!(fetched[1].as_ref().unwrap_err().is_not_found());
        assert_eq!(fetched[2].as_ref().unwrap().name(), &names[2]);
    }

    #[test]
    fn deep_dependencies_follow_object_chains() {
        let store = memory_store();
        store.store(&mac("A", "a", "/app/m.d")).unwrap();
        store.store(&mac("B", "uses m4_A", "/app/m.d")).unwrap();
        store.store(&mac("C", "uses m4_B", "/app/m.d")).unwrap();
        store.relink("/src/page.m", &BTreeSet::new(), &BTreeSet::from([name("m4_C")])).unwrap();
        store.relink("/src/b.m", &BTreeSet::new(), &BTreeSet::from([name("m4_B")])).unwrap();

        let deep = store.dependencies_deep(&[name("m4_A"), name("m4_C")]).unwrap();
        assert_eq!(deep[0], vec!["/src/b.m", "/src/page.m", "m4_B", "m4_C"]);
        assert_eq!(deep[1], vec!["/src/page.m"]);
        assert_eq!(deps(&store, "m4_A"), vec!["m4_B"]);
    }

    #[test]
    fn deep_dependencies_detect_cycles() {
        let store = memory_store();
        store.store(&mac("A", "uses m4_B", "/app/m.d")).unwrap();
        store.store(&mac("B", "uses m4_A", "/app/m.d")).unwrap();
        store.store(&mac("C", "free", "/app/m.d")).unwrap();

        let err = store.dependencies_deep(&[name("m4_A")]).unwrap_err();
        assert_eq!(err.code(), "cyclic.equal");
        assert_eq!(err.to_diagnostic().object.as_deref(), Some("m4_A"));
        assert_eq!(store.dependencies_deep(&[name("m4_C")]).unwrap(), vec![Vec::<String>::new()]);
    }

    #[test]
    fn get_dependencies_batch() {
        let store = memory_store();
        store.store(&mac("A", "m4_X", "/app/m.d")).unwrap();
        let out = store.get_dependencies(&[name("m4_X"), name("m4_A")]);
        assert_eq!(out[0].as_ref().unwrap(), &vec!["m4_A".to_string()]);
        assert!(out[1].as_ref().unwrap().is_empty());
    }

    // ----- On disk -----

    #[test]
    fn filesystem_backend_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let fs = ReleaseFs::create(dir.path(), release()).unwrap();
        let store = ObjectStore::new(Arc::new(FsBackend::new(fs.clone())));

        let include = Object::new(
            release(),
            QPath::parse("/app/i.i").unwrap(),
            2,
            ObjectBody::Include(Include::new("hdr", "m4_X")),
        )
        .unwrap();
        assert!(store.store(&include).unwrap());
        assert_eq!(store.fetch(include.name()).unwrap(), include);
        assert_eq!(deps(&store, "m4_X"), vec!["i4_hdr"]);

        assert!(store.waste(include.name()).unwrap());
        assert!(deps(&store, "m4_X").is_empty());
        assert!(!fs.exists(&FsBackend::object_dir(include.name())));
    }
}
