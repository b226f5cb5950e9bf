//! Foundation types for qt.
//!
//! This crate provides the identity and diagnostic types shared by every
//! other qt crate. Nothing here touches the filesystem except
//! [`Registry::load`].
//!
//! # Key Types
//!
//! - [`ReleaseId`] -- Canonical release identifier (`"5.10"`)
//! - [`QPath`] -- Canonical, absolute source path inside a release
//! - [`ObjectKind`] / [`ObjectName`] -- Typed object references (`m4_GREET`)
//! - [`Digest`] -- 32-byte BLAKE3 digest with hex helpers
//! - [`Registry`] -- Flat key/value snapshot read by `r4_` substitution
//! - [`Diagnostic`] -- Structured `{code, file, line, object, message}` record

pub mod diagnostic;
pub mod digest;
pub mod error;
pub mod object;
pub mod qpath;
pub mod registry;
pub mod release;

pub use diagnostic::{Diagnostic, Diagnostics};
pub use digest::Digest;
pub use error::TypeError;
pub use object::{ObjectKind, ObjectName};
pub use qpath::QPath;
pub use registry::Registry;
pub use release::ReleaseId;
