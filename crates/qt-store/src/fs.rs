use qt_crypto::ContentHasher;
use qt_types::{ObjectName, ReleaseId};
use qt_vfs::ReleaseFs;
use tracing::warn;

use crate::error::{StoreError, StoreResult};
use crate::traits::{LinkRecord, ObjectBackend, RecordWrite};

/// Leaf filename of an object record.
pub const RECORD_FILE: &str = "obj.json";
/// Suffix of link record files.
pub const LINK_SUFFIX: &str = ".dep";

/// Object backend on top of a release filesystem.
///
/// Layout: `object/<bucket>/<h[0..2]>/<h[2..]>/obj.json` with `h` the place
/// digest of the canonical name; link records sit in the same directory as
/// `<link digest of referrer>.dep`.
#[derive(Debug, Clone)]
pub struct FsBackend {
    fs: ReleaseFs,
}

impl FsBackend {
    pub fn new(fs: ReleaseFs) -> Self {
        Self { fs }
    }

    pub fn fs(&self) -> &ReleaseFs {
        &self.fs
    }

    /// Directory holding the record and links of `name`.
    pub fn object_dir(name: &ObjectName) -> String {
        let digest = ContentHasher::PLACE.hash(name.to_string().as_bytes());
        let (head, tail) = digest.fan_out();
        format!("{}/{}/{head}/{tail}", ReleaseFs::OBJECT_DIR, name.bucket())
    }

    /// Location of the record of `name`.
    pub fn place(name: &ObjectName) -> String {
        format!("{}/{RECORD_FILE}", Self::object_dir(name))
    }

    /// Location of the link record from `referrer` to `name`.
    pub fn link_place(name: &ObjectName, referrer: &str) -> String {
        format!(
            "{}/{}{LINK_SUFFIX}",
            Self::object_dir(name),
            ContentHasher::LINK.hex(referrer.as_bytes())
        )
    }
}

impl ObjectBackend for FsBackend {
    fn release(&self) -> &ReleaseId {
        self.fs.release()
    }

    fn read_record(&self, name: &ObjectName) -> StoreResult<Option<Vec<u8>>> {
        self.fs
            .read_opt(&Self::place(name))
            .map_err(|e| StoreError::vfs(name, e))
    }

    fn write_record(&self, name: &ObjectName, data: &[u8]) -> StoreResult<RecordWrite> {
        let outcome = self
            .fs
            .store(&Self::place(name), data, None)
            .map_err(|e| StoreError::vfs(name, e))?;
        Ok(RecordWrite {
            changed: outcome.changed,
            before: outcome.before,
        })
    }

    fn remove_record(&self, name: &ObjectName) -> StoreResult<bool> {
        self.fs
            .waste(&Self::place(name))
            .map_err(|e| StoreError::vfs(name, e))
    }

    fn add_link(&self, name: &ObjectName, referrer: &str) -> StoreResult<()> {
        let record = LinkRecord {
            source: referrer.to_string(),
        };
        let data = serde_json::to_vec(&record).map_err(|e| StoreError::Corrupt {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        self.fs
            .store(&Self::link_place(name, referrer), &data, None)
            .map_err(|e| StoreError::vfs(name, e))?;
        Ok(())
    }

    fn remove_link(&self, name: &ObjectName, referrer: &str) -> StoreResult<bool> {
        self.fs
            .waste(&Self::link_place(name, referrer))
            .map_err(|e| StoreError::vfs(name, e))
    }

    fn links(&self, name: &ObjectName) -> StoreResult<Vec<String>> {
        let dir = Self::object_dir(name);
        let files = self
            .fs
            .glob(&dir, LINK_SUFFIX)
            .map_err(|e| StoreError::vfs(name, e))?;
        let mut referrers = Vec::with_capacity(files.len());
        for file in files {
            let path = format!("{dir}/{file}");
            let data = match self.fs.read_opt(&path) {
                Ok(Some(data)) => data,
                // Removed by a concurrent unlink.
                Ok(None) => continue,
                Err(e) => return Err(StoreError::vfs(name, e)),
            };
            match serde_json::from_slice::<LinkRecord>(&data) {
                Ok(record) => referrers.push(record.source),
                Err(e) => warn!(object = %name, path = %path, error = %e, "skipping unreadable link record"),
            }
        }
        referrers.sort();
        Ok(referrers)
    }
}
