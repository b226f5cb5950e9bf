use std::io;

use qt_types::Diagnostic;

/// Errors produced by the versioned filesystem.
#[derive(Debug, thiserror::Error)]
pub enum VfsError {
    /// The release root does not exist.
    #[error("release not found: {release}")]
    ReleaseNotFound { release: String },

    /// The release is opened readonly.
    #[error("release {release} is readonly")]
    ReadOnly { release: String },

    /// No file at the requested path.
    #[error("not found: {path}")]
    NotFound { path: String },

    /// The stored bytes do not match the caller's expected digest.
    #[error("digest does not match for {path}")]
    DigestMismatch { path: String },

    /// A release-relative path escapes the release root.
    #[error("invalid release path: {path}")]
    InvalidPath { path: String },

    /// I/O failure with the path it occurred on.
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl VfsError {
    pub(crate) fn io(path: &str, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            return Self::NotFound {
                path: path.to_string(),
            };
        }
        Self::Io {
            path: path.to_string(),
            source,
        }
    }

    /// Stable reference code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ReleaseNotFound { .. } => "vfs.release.notfound",
            Self::ReadOnly { .. } => "vfs.readonly",
            Self::NotFound { .. } => "vfs.notfound",
            Self::DigestMismatch { .. } => "vfs.digest",
            Self::InvalidPath { .. } => "vfs.path",
            Self::Io { .. } => "vfs.io",
        }
    }

    /// The path involved, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::NotFound { path }
            | Self::DigestMismatch { path }
            | Self::InvalidPath { path }
            | Self::Io { path, .. } => Some(path),
            Self::ReleaseNotFound { .. } | Self::ReadOnly { .. } => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let d = Diagnostic::new(self.code(), self.to_string());
        match self.path() {
            Some(path) => d.with_file(path),
            None => d,
        }
    }
}

/// Convenience alias used throughout the vfs crate.
pub type VfsResult<T> = std::result::Result<T, VfsError>;
