use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use qt_crypto::ContentHasher;
use qt_types::{QPath, ReleaseId};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{VfsError, VfsResult};

/// Result of a conditional [`ReleaseFs::store`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOutcome {
    /// `false` when the stored bytes were already identical.
    pub changed: bool,
    /// Previous content, `None` if the file did not exist.
    pub before: Option<Vec<u8>>,
    /// Content now on disk.
    pub after: Vec<u8>,
}

/// Filesystem rooted at one release of a repository.
#[derive(Debug, Clone)]
pub struct ReleaseFs {
    root: PathBuf,
    release: ReleaseId,
    readonly: bool,
}

impl ReleaseFs {
    /// Raw source bytes, mirrored by [`QPath`].
    pub const SOURCE_DIR: &'static str = "source/data";
    /// Per-source meta records.
    pub const META_DIR: &'static str = "meta";
    /// Object records and dependency links, bucketed by prefix.
    pub const OBJECT_DIR: &'static str = "object";
    /// Basename uniqueness index.
    pub const UNIQUE_DIR: &'static str = "unique";
    /// Scratch space.
    pub const TMP_DIR: &'static str = "tmp";

    const SUBTREES: [&'static str; 7] = [
        Self::SOURCE_DIR,
        Self::META_DIR,
        "object/m4",
        "object/i4",
        "object/l4",
        Self::UNIQUE_DIR,
        Self::TMP_DIR,
    ];

    /// Open an existing release under `repository`.
    pub fn open(repository: &Path, release: ReleaseId, readonly: bool) -> VfsResult<Self> {
        let root = repository.join(release.as_str());
        if !root.is_dir() {
            return Err(VfsError::ReleaseNotFound {
                release: release.to_string(),
            });
        }
        Ok(Self {
            root,
            release,
            readonly,
        })
    }

    /// Create (or complete) the release layout and open it writable.
    pub fn create(repository: &Path, release: ReleaseId) -> VfsResult<Self> {
        let root = repository.join(release.as_str());
        for sub in Self::SUBTREES {
            let dir = root.join(sub);
            fs::create_dir_all(&dir).map_err(|e| VfsError::io(&dir.to_string_lossy(), e))?;
        }
        debug!(release = %release, root = %root.display(), "release initialised");
        Ok(Self {
            root,
            release,
            readonly: false,
        })
    }

    pub fn release(&self) -> &ReleaseId {
        &self.release
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// Release-relative location of a source's raw bytes.
    pub fn source_place(path: &QPath) -> String {
        format!("{}{}", Self::SOURCE_DIR, path.as_str())
    }

    fn resolve(&self, rel: &str) -> VfsResult<PathBuf> {
        let clean = rel.trim_start_matches('/');
        let bad = clean.is_empty()
            || clean.contains('\\')
            || clean.split('/').any(|s| s.is_empty() || s == "." || s == "..");
        if bad {
            return Err(VfsError::InvalidPath {
                path: rel.to_string(),
            });
        }
        Ok(self.root.join(clean))
    }

    fn guard_writable(&self) -> VfsResult<()> {
        if self.readonly {
            return Err(VfsError::ReadOnly {
                release: self.release.to_string(),
            });
        }
        Ok(())
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.resolve(rel).map(|p| p.exists()).unwrap_or(false)
    }

    pub fn stat(&self, rel: &str) -> VfsResult<fs::Metadata> {
        let path = self.resolve(rel)?;
        fs::metadata(&path).map_err(|e| VfsError::io(rel, e))
    }

    /// Read a whole file; a missing file is [`VfsError::NotFound`].
    pub fn read(&self, rel: &str) -> VfsResult<Vec<u8>> {
        let path = self.resolve(rel)?;
        fs::read(&path).map_err(|e| VfsError::io(rel, e))
    }

    /// Read a whole file; a missing file is `Ok(None)`.
    pub fn read_opt(&self, rel: &str) -> VfsResult<Option<Vec<u8>>> {
        match self.read(rel) {
            Ok(data) => Ok(Some(data)),
            Err(VfsError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Sorted entry names of a directory; a missing directory is empty.
    pub fn read_dir(&self, rel: &str) -> VfsResult<Vec<String>> {
        let path = self.resolve(rel)?;
        let entries = match fs::read_dir(&path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(VfsError::io(rel, e)),
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| VfsError::io(rel, e))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    /// Names of regular files in `rel` ending with `suffix`.
    pub fn glob(&self, rel: &str, suffix: &str) -> VfsResult<Vec<String>> {
        let base = self.resolve(rel)?;
        Ok(self
            .read_dir(rel)?
            .into_iter()
            .filter(|name| name.ends_with(suffix) && base.join(name).is_file())
            .collect())
    }

    /// Conditionally write `data` to `rel`.
    ///
    /// If `expected` is given and a file exists whose content digest differs,
    /// the write is refused with [`VfsError::DigestMismatch`]. Identical bytes
    /// return `changed == false` without touching the disk.
    pub fn store(&self, rel: &str, data: &[u8], expected: Option<&str>) -> VfsResult<StoreOutcome> {
        self.guard_writable()?;
        let path = self.resolve(rel)?;
        let before = self.read_opt(rel)?;

        if let (Some(current), Some(expected)) = (&before, expected) {
            if !expected.trim().is_empty() && !ContentHasher::CONTENT.verify_hex(current, expected)
            {
                return Err(VfsError::DigestMismatch {
                    path: rel.to_string(),
                });
            }
        }
        if before.as_deref() == Some(data) {
            return Ok(StoreOutcome {
                changed: false,
                before,
                after: data.to_vec(),
            });
        }

        let parent = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(parent).map_err(|e| VfsError::io(rel, e))?;
        let mut tmp = NamedTempFile::new_in(parent).map_err(|e| VfsError::io(rel, e))?;
        tmp.write_all(data).map_err(|e| VfsError::io(rel, e))?;
        tmp.persist(&path).map_err(|e| VfsError::io(rel, e.error))?;
        debug!(release = %self.release, path = rel, bytes = data.len(), "stored");

        Ok(StoreOutcome {
            changed: true,
            before,
            after: data.to_vec(),
        })
    }

    /// Remove `rel` and prune empty ancestors below the release root.
    ///
    /// Returns `false` if there was nothing to remove.
    pub fn waste(&self, rel: &str) -> VfsResult<bool> {
        self.guard_writable()?;
        let path = self.resolve(rel)?;
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(VfsError::io(rel, e)),
        }
        let mut dir = path.parent();
        while let Some(current) = dir {
            if current == self.root || !current.starts_with(&self.root) {
                break;
            }
            // Fails on non-empty directories, which ends the walk.
            if fs::remove_dir(current).is_err() {
                break;
            }
            dir = current.parent();
        }
        debug!(release = %self.release, path = rel, "wasted");
        Ok(true)
    }

    /// Same release, refusing all mutators.
    pub fn to_readonly(&self) -> Self {
        Self {
            readonly: true,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release() -> ReleaseId {
        ReleaseId::parse("1.00").unwrap()
    }

    fn fresh() -> (tempfile::TempDir, ReleaseFs) {
        let dir = tempfile::tempdir().unwrap();
        let fs = ReleaseFs::create(dir.path(), release()).unwrap();
        (dir, fs)
    }

    // ----- Layout -----

    #[test]
    fn create_builds_subtrees() {
        let (_dir, fs) = fresh();
        for sub in ReleaseFs::SUBTREES {
            assert!(fs.root().join(sub).is_dir(), "{sub} missing");
        }
    }

    #[test]
    fn open_missing_release_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = ReleaseFs::open(dir.path(), release(), false).unwrap_err();
        assert_eq!(err.code(), "vfs.release.notfound");
    }

    #[test]
    fn source_place_mirrors_path() {
        let p = QPath::parse("/app/x.m").unwrap();
        assert_eq!(ReleaseFs::source_place(&p), "source/data/app/x.m");
    }

    // ----- Store -----

    #[test]
    fn store_then_read() {
        let (_dir, fs) = fresh();
        let out = fs.store("source/data/a/b.m", b"hello", None).unwrap();
        assert!(out.changed);
        assert_eq!(out.before, None);
        assert_eq!(fs.read("source/data/a/b.m").unwrap(), b"hello");
    }

    #[test]
    fn identical_store_is_unchanged() {
        let (_dir, fs) = fresh();
        fs.store("x/y", b"same", None).unwrap();
        let modified = fs.stat("x/y").unwrap().modified().unwrap();
        let out = fs.store("x/y", b"same", None).unwrap();
        assert!(!out.changed);
        assert_eq!(out.before.as_deref(), Some(&b"same"[..]));
        assert_eq!(fs.stat("x/y").unwrap().modified().unwrap(), modified);
    }

    #[test]
    fn store_reports_previous_content() {
        let (_dir, fs) = fresh();
        fs.store("f", b"one", None).unwrap();
        let out = fs.store("f", b"two", None).unwrap();
        assert!(out.changed);
        assert_eq!(out.before.as_deref(), Some(&b"one"[..]));
        assert_eq!(out.after, b"two");
    }

    #[test]
    fn expected_digest_guards_writes() {
        let (_dir, fs) = fresh();
        fs.store("f", b"one", None).unwrap();
        let stale = ContentHasher::CONTENT.hex(b"zero");
        let err = fs.store("f", b"two", Some(&stale)).unwrap_err();
        assert_eq!(err.code(), "vfs.digest");
        assert_eq!(fs.read("f").unwrap(), b"one");

        let current = ContentHasher::CONTENT.hex(b"one");
        assert!(fs.store("f", b"two", Some(&current)).unwrap().changed);
    }

    #[test]
    fn expected_digest_ignored_for_new_files() {
        let (_dir, fs) = fresh();
        let out = fs.store("new", b"x", Some("deadbeef")).unwrap();
        assert!(out.changed);
    }

    #[test]
    fn readonly_refuses_mutators() {
        let (_dir, fs) = fresh();
        fs.store("f", b"x", None).unwrap();
        let ro = fs.to_readonly();
        assert_eq!(ro.store("f", b"y", None).unwrap_err().code(), "vfs.readonly");
        assert_eq!(ro.waste("f").unwrap_err().code(), "vfs.readonly");
        assert_eq!(ro.read("f").unwrap(), b"x");
    }

    #[test]
    fn rejects_escaping_paths() {
        let (_dir, fs) = fresh();
        assert_eq!(fs.read("../etc/passwd").unwrap_err().code(), "vfs.path");
        assert_eq!(fs.store("a//b", b"", None).unwrap_err().code(), "vfs.path");
        assert!(!fs.exists(".."));
    }

    // ----- Read -----

    #[test]
    fn read_missing_is_not_found() {
        let (_dir, fs) = fresh();
        assert!(fs.read("nope").unwrap_err().is_not_found());
        assert_eq!(fs.read_opt("nope").unwrap(), None);
    }

    #[test]
    fn read_dir_and_glob() {
        let (_dir, fs) = fresh();
        fs.store("d/b.dep", b"1", None).unwrap();
        fs.store("d/a.dep", b"2", None).unwrap();
        fs.store("d/obj.json", b"3", None).unwrap();
        fs.store("d/sub/c.dep", b"4", None).unwrap();
        assert_eq!(fs.read_dir("d").unwrap(), vec!["a.dep", "b.dep", "obj.json", "sub"]);
        assert_eq!(fs.glob("d", ".dep").unwrap(), vec!["a.dep", "b.dep"]);
        assert!(fs.read_dir("missing").unwrap().is_empty());
    }

    // ----- Waste -----

    #[test]
    fn waste_prunes_empty_ancestors() {
        let (_dir, fs) = fresh();
        fs.store("source/data/a/b/c.m", b"x", None).unwrap();
        fs.store("source/data/a/keep.m", b"y", None).unwrap();
        assert!(fs.waste("source/data/a/b/c.m").unwrap());
        assert!(!fs.exists("source/data/a/b"));
        assert!(fs.exists("source/data/a/keep.m"));
    }

    #[test]
    fn waste_stops_at_release_root() {
        let (_dir, fs) = fresh();
        fs.store("lonely/file", b"x", None).unwrap();
        assert!(fs.waste("lonely/file").unwrap());
        assert!(!fs.exists("lonely"));
        assert!(fs.root().is_dir());
    }

    #[test]
    fn waste_is_idempotent() {
        let (_dir, fs) = fresh();
        assert!(!fs.waste("never/there").unwrap());
    }
}
