//! Object store and dependency tracker for qt.
//!
//! Objects (macros, includes, lgcodes) are stored one record per name,
//! placed by a digest of the name and fanned out over two directory levels.
//! Next to each record live *link records*: one per referrer (a source path
//! or another object) that mentions the object. The set of link records is
//! the reverse dependency index consulted before anything is deleted.
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectBackend`] trait:
//!
//! - [`FsBackend`] -- records and links inside a release filesystem
//! - [`MemoryBackend`] -- `HashMap`-based backend for tests and embedding
//!
//! # Design Rules
//!
//! 1. A store writes only when the serialized record changes.
//! 2. Every change re-diffs the object's references and updates links.
//! 3. Waste is refused while any referrer other than the definer remains.
//! 4. Batch operations return results positionally; failures stay per item.
//! 5. Link diffing on one name is read-then-write and not locked.

pub mod error;
pub mod fs;
pub mod memory;
pub mod parallel;
pub mod store;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use fs::FsBackend;
pub use memory::MemoryBackend;
pub use parallel::map_bounded;
pub use store::{ObjectStore, DEFAULT_WORKERS};
pub use traits::{LinkRecord, ObjectBackend, RecordWrite};
