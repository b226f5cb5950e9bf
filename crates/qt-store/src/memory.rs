use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use qt_types::{ObjectName, ReleaseId};

use crate::error::StoreResult;
use crate::traits::{ObjectBackend, RecordWrite};

/// In-memory backend.
///
/// Intended for tests and embedding. Records and links are held behind
/// `RwLock`s for safe concurrent access.
pub struct MemoryBackend {
    release: ReleaseId,
    records: RwLock<HashMap<ObjectName, Vec<u8>>>,
    links: RwLock<HashMap<ObjectName, BTreeSet<String>>>,
}

impl MemoryBackend {
    pub fn new(release: ReleaseId) -> Self {
        Self {
            release,
            records: RwLock::new(HashMap::new()),
            links: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().expect("lock poisoned").len()
    }

    /// Returns `true` if no records are stored.
    pub fn is_empty(&self) -> bool {
        self.records.read().expect("lock poisoned").is_empty()
    }
}

impl ObjectBackend for MemoryBackend {
    fn release(&self) -> &ReleaseId {
        &self.release
    }

    fn read_record(&self, name: &ObjectName) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.records.read().expect("lock poisoned").get(name).cloned())
    }

    fn write_record(&self, name: &ObjectName, data: &[u8]) -> StoreResult<RecordWrite> {
        let mut map = self.records.write().expect("lock poisoned");
        let before = map.get(name).cloned();
        if before.as_deref() == Some(data) {
            return Ok(RecordWrite {
                changed: false,
                before,
            });
        }
        map.insert(name.clone(), data.to_vec());
        Ok(RecordWrite {
            changed: true,
            before,
        })
    }

    fn remove_record(&self, name: &ObjectName) -> StoreResult<bool> {
        Ok(self
            .records
            .write()
            .expect("lock poisoned")
            .remove(name)
            .is_some())
    }

    fn add_link(&self, name: &ObjectName, referrer: &str) -> StoreResult<()> {
        self.links
            .write()
            .expect("lock poisoned")
            .entry(name.clone())
            .or_default()
            .insert(referrer.to_string());
        Ok(())
    }

    fn remove_link(&self, name: &ObjectName, referrer: &str) -> StoreResult<bool> {
        let mut map = self.links.write().expect("lock poisoned");
        let Some(set) = map.get_mut(name) else {
            return Ok(false);
        };
        let removed = set.remove(referrer);
        if set.is_empty() {
            map.remove(name);
        }
        Ok(removed)
    }

    fn links(&self, name: &ObjectName) -> StoreResult<Vec<String>> {
        Ok(self
            .links
            .read()
            .expect("lock poisoned")
            .get(name)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> ObjectName {
        ObjectName::parse(s).unwrap()
    }

    #[test]
    fn new_backend_is_empty() {
        let b = MemoryBackend::new(ReleaseId::parse("1.00").unwrap());
        assert!(b.is_empty());
        assert_eq!(b.read_record(&name("m4_X")).unwrap(), None);
        assert!(b.links(&name("m4_X")).unwrap().is_empty());
    }

    #[test]
    fn write_reports_change() {
        let b = MemoryBackend::new(ReleaseId::parse("1.00").unwrap());
        let n = name("m4_X");
        assert!(b.write_record(&n, b"a").unwrap().changed);
        assert!(!b.write_record(&n, b"a").unwrap().changed);
        let w = b.write_record(&n, b"b").unwrap();
        assert!(w.changed);
        assert_eq!(w.before.as_deref(), Some(&b"a"[..]));
        assert_eq!(b.len(), 1);
        assert!(b.remove_record(&n).unwrap());
        assert!(!b.remove_record(&n).unwrap());
    }

    #[test]
    fn links_are_sorted_sets() {
        let b = MemoryBackend::new(ReleaseId::parse("1.00").unwrap());
        let n = name("l4_w");
        b.add_link(&n, "/z").unwrap();
        b.add_link(&n, "/a").unwrap();
        b.add_link(&n, "/a").unwrap();
        assert_eq!(b.links(&n).unwrap(), vec!["/a", "/z"]);
        assert!(b.remove_link(&n, "/z").unwrap());
        assert!(!b.remove_link(&n, "/missing").unwrap());
    }
}
