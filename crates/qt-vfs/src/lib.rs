//! Versioned filesystem for qt releases.
//!
//! A [`ReleaseFs`] is rooted at `<repository>/<release>` and owns a fixed set
//! of subtrees: raw source bytes, meta records, the object store and the
//! basename uniqueness index. All paths handed to it are release-relative and
//! `/`-separated.
//!
//! # Design Rules
//!
//! - Writes are atomic: temp file in the target directory, then rename.
//! - Identical-byte writes are reported as unchanged and touch nothing.
//! - A readonly instance refuses every mutator with [`VfsError::ReadOnly`].
//! - Removing a file prunes empty ancestor directories up to the release root.

pub mod error;
pub mod fs;

pub use error::{VfsError, VfsResult};
pub use fs::{ReleaseFs, StoreOutcome};
