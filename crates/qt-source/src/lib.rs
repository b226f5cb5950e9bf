//! Source store for qt.
//!
//! Sources are files addressed by [`QPath`](qt_types::QPath) inside a
//! release. Storing a source keeps everything derived from it in line:
//!
//! - object files (`.d`, `.i`, `.l`) are parsed and their objects stored,
//!   with objects that left the file removed
//! - other text sources have their dependency links re-diffed
//! - `project.json` files are validated and refresh the project rules
//! - meta and the basename uniqueness index are updated
//!
//! A [`Session`] owns the repository configuration, the registry and the
//! identity caches; [`Session::open`] hands out a [`SourceStore`] per
//! release.
//!
//! # Design Rules
//!
//! - Identical content is a no-op: no links, meta or objects are touched.
//! - Checks that can refuse a store run before any byte is written.
//! - Concurrent stores of sources referencing the same object may race on
//!   that object's links.

pub mod config;
pub mod error;
pub mod meta;
pub mod nature;
pub mod project;
pub mod session;
pub mod store;
pub mod unique;

pub use config::RepositoryConfig;
pub use error::{SourceError, SourceResult};
pub use meta::Meta;
pub use nature::{Nature, SourceKind};
pub use project::{Project, ProjectConfig, PROJECT_FILE};
pub use session::Session;
pub use store::{SourceStore, StoreOptions, StoreReport};
