use std::path::PathBuf;

use qt_store::StoreError;
use qt_types::{Diagnostic, Diagnostics, TypeError};
use qt_vfs::VfsError;

/// Errors from source-level operations.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("release is read-only, cannot change {path}")]
    ReadOnly { path: String },

    #[error("{path} is not a valid project configuration: {reason}")]
    ConfigInvalid { path: String, reason: String },

    #[error("{path} is not unique: basename already used by {owner}")]
    NotUnique { path: String, owner: String },

    /// The object file does not parse.
    #[error("{path} has {} object error(s)", diagnostics.len())]
    Objects {
        path: String,
        diagnostics: Diagnostics,
    },

    #[error("{path} defines {object}, already defined in {owner}")]
    OtherDefinition {
        path: String,
        object: String,
        owner: String,
    },

    #[error("{path} drops {object}, still used by {}", dependents.join(", "))]
    ObjectDependents {
        path: String,
        object: String,
        dependents: Vec<String>,
    },

    /// Some parsed objects could not be written.
    #[error("{path}: {} object(s) not stored", diagnostics.len())]
    ObjectWrites {
        path: String,
        diagnostics: Diagnostics,
    },

    #[error("cannot record meta of {path}: {reason}")]
    Meta { path: String, reason: String },

    #[error("{path} changed since it was read")]
    DigestMismatch { path: String },

    #[error("cannot remove configuration {path}: the project is not empty")]
    WasteConfig { path: String },

    #[error("cannot remove {path}: {object} is used by {}", dependents.join(", "))]
    WasteDependent {
        path: String,
        object: String,
        dependents: Vec<String>,
    },

    #[error("source not found: {path}")]
    NotFound { path: String },

    #[error("invalid identifier: {0}")]
    Type(#[from] TypeError),

    #[error("repository configuration {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    #[error("{path}: {source}")]
    Vfs {
        path: String,
        #[source]
        source: VfsError,
    },

    #[error("{path}: {source}")]
    Store {
        path: String,
        #[source]
        source: StoreError,
    },
}

impl SourceError {
    pub(crate) fn vfs(path: impl ToString, source: VfsError) -> Self {
        match source {
            VfsError::ReadOnly { .. } => Self::ReadOnly {
                path: path.to_string(),
            },
            VfsError::DigestMismatch { .. } => Self::DigestMismatch {
                path: path.to_string(),
            },
            source => Self::Vfs {
                path: path.to_string(),
                source,
            },
        }
    }

    pub(crate) fn store(path: impl ToString, source: StoreError) -> Self {
        Self::Store {
            path: path.to_string(),
            source,
        }
    }

    /// Stable reference code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ReadOnly { .. } => "source.store.readonly",
            Self::ConfigInvalid { .. } => "source.store.config.invalid",
            Self::NotUnique { .. } => "source.store.notunique",
            Self::Objects { .. } => "source.store.objects",
            Self::OtherDefinition { .. } => "source.store.objects.otherdefinition",
            Self::ObjectDependents { .. } => "source.store.objects.dependent",
            Self::ObjectWrites { .. } => "source.store.objects.write",
            Self::Meta { .. } => "source.store.meta",
            Self::DigestMismatch { .. } => "source.store.digest",
            Self::WasteConfig { .. } => "source.waste.config",
            Self::WasteDependent { .. } => "source.waste.dependent",
            Self::NotFound { .. } => "source.fetch.notfound",
            Self::Type(e) => e.code(),
            Self::Config { .. } => "config.invalid",
            Self::Vfs { source, .. } => source.code(),
            Self::Store { source, .. } => source.code(),
        }
    }

    /// Path of the source involved, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::ReadOnly { path }
            | Self::ConfigInvalid { path, .. }
            | Self::NotUnique { path, .. }
            | Self::Objects { path, .. }
            | Self::OtherDefinition { path, .. }
            | Self::ObjectDependents { path, .. }
            | Self::ObjectWrites { path, .. }
            | Self::Meta { path, .. }
            | Self::DigestMismatch { path }
            | Self::WasteConfig { path }
            | Self::WasteDependent { path, .. }
            | Self::NotFound { path }
            | Self::Vfs { path, .. }
            | Self::Store { path, .. } => Some(path),
            Self::Type(_) | Self::Config { .. } => None,
        }
    }

    /// Flatten into diagnostics; aggregated parse errors expand in place.
    pub fn to_diagnostics(&self) -> Diagnostics {
        match self {
            Self::Objects { diagnostics, .. } | Self::ObjectWrites { diagnostics, .. } => {
                diagnostics.clone()
            }
            _ => Diagnostics::from(self.to_diagnostic()),
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let d = Diagnostic::new(self.code(), self.to_string());
        let d = match self.path() {
            Some(path) => d.with_file(path),
            None => d,
        };
        match self {
            Self::OtherDefinition { object, .. }
            | Self::ObjectDependents { object, .. }
            | Self::WasteDependent { object, .. } => d.with_object(object.clone()),
            _ => d,
        }
    }
}

/// Result alias for source operations.
pub type SourceResult<T> = Result<T, SourceError>;
