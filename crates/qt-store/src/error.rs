use qt_object::ObjectError;
use qt_types::Diagnostic;
use qt_vfs::VfsError;

/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No record under this name.
    #[error("object not found: {name}")]
    NotFound { name: String },

    /// The record exists but cannot be decoded.
    #[error("corrupt object {name}: {reason}")]
    Corrupt { name: String, reason: String },

    /// The object belongs to another release than the store.
    #[error("object {name} belongs to release {actual}, store holds {expected}")]
    ReleaseMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    /// Waste refused: other sources or objects still refer to it.
    #[error("object {name} is used by {}", dependents.join(", "))]
    HasDependents {
        name: String,
        dependents: Vec<String>,
    },

    /// The object is among its own transitive referrers.
    #[error("object {name} has a cyclic dependency")]
    Cyclic { name: String },

    /// The release is readonly.
    #[error("store is read-only")]
    ReadOnly,

    /// I/O failure from the underlying filesystem.
    #[error("I/O error on {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: VfsError,
    },
}

impl StoreError {
    pub(crate) fn vfs(name: impl ToString, source: VfsError) -> Self {
        match source {
            VfsError::ReadOnly { .. } => Self::ReadOnly,
            source => Self::Io {
                name: name.to_string(),
                source,
            },
        }
    }

    pub(crate) fn from_object(err: ObjectError, name: impl ToString) -> Self {
        match err {
            ObjectError::Corrupt { object, reason } => Self::Corrupt {
                name: object,
                reason,
            },
            other => Self::Corrupt {
                name: name.to_string(),
                reason: other.to_string(),
            },
        }
    }

    /// Stable reference code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "object.fetch.notfound",
            Self::Corrupt { .. } => "object.fetch.corrupt",
            Self::ReleaseMismatch { .. } => "object.store.release",
            Self::HasDependents { .. } => "object.waste.deps",
            Self::Cyclic { .. } => "cyclic.equal",
            Self::ReadOnly => "object.store.readonly",
            Self::Io { .. } => "object.fetch.io",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let d = Diagnostic::new(self.code(), self.to_string());
        match self {
            Self::NotFound { name }
            | Self::Corrupt { name, .. }
            | Self::ReleaseMismatch { name, .. }
            | Self::HasDependents { name, .. }
            | Self::Cyclic { name } => d.with_object(name.clone()),
            Self::Io { name, source } => match source.path() {
                Some(path) => d.with_object(name.clone()).with_file(path),
                None => d.with_object(name.clone()),
            },
            Self::ReadOnly => d,
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
