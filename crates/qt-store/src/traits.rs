use qt_types::{ObjectName, ReleaseId};
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

/// Outcome of writing a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordWrite {
    /// `false` when identical bytes were already stored.
    pub changed: bool,
    /// The record replaced by this write.
    pub before: Option<Vec<u8>>,
}

/// Body of a link record; its presence is what matters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    /// The referrer: a source path (`/…`) or an object name.
    pub source: String,
}

/// Raw persistence for object records and link records.
///
/// Implementations store bytes only; the dependency logic lives in
/// [`ObjectStore`](crate::ObjectStore). Implementations must be safe for
/// concurrent use on distinct names.
pub trait ObjectBackend: Send + Sync {
    /// The release this backend stores.
    fn release(&self) -> &ReleaseId;

    /// Read the record for `name`; `Ok(None)` if absent.
    fn read_record(&self, name: &ObjectName) -> StoreResult<Option<Vec<u8>>>;

    /// Write the record for `name` unless the bytes are identical.
    fn write_record(&self, name: &ObjectName, data: &[u8]) -> StoreResult<RecordWrite>;

    /// Remove the record. Returns `true` if it existed.
    fn remove_record(&self, name: &ObjectName) -> StoreResult<bool>;

    /// Record that `referrer` refers to `name`. Idempotent.
    fn add_link(&self, name: &ObjectName, referrer: &str) -> StoreResult<()>;

    /// Drop the link from `referrer`. Returns `true` if it existed.
    fn remove_link(&self, name: &ObjectName, referrer: &str) -> StoreResult<bool>;

    /// All referrers of `name`, sorted.
    fn links(&self, name: &ObjectName) -> StoreResult<Vec<String>>;
}
