use qt_object::ObjectError;
use qt_store::StoreError;
use qt_types::Diagnostic;

/// Hard failures that abort a resolution call.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// Unknown letter in a mode string.
    #[error("invalid mode letter `{0}`")]
    Mode(char),

    /// Bad macro call arguments.
    #[error("{token}: {source}")]
    Object {
        token: String,
        #[source]
        source: ObjectError,
    },

    /// A language token carries an unknown language or algorithm.
    #[error("{token}: {source}")]
    Modifier {
        token: String,
        #[source]
        source: ObjectError,
    },

    /// An lgcode alias chain loops.
    #[error("alias cycle starting at {name}")]
    AliasCycle { name: String },

    /// An include or macro expands into itself, or nesting is too deep.
    #[error("recursive expansion of {name}")]
    Recursion { name: String },

    /// The object store failed for a reason other than absence.
    #[error("fetching {name}: {source}")]
    Fetch {
        name: String,
        #[source]
        source: StoreError,
    },
}

impl ResolveError {
    /// Stable reference code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Mode(_) => "resolve.mode",
            Self::Object { source, .. } => source.code(),
            Self::Modifier { .. } => "resolve.lgcode.modifier",
            Self::AliasCycle { .. } => "resolve.alias.cycle",
            Self::Recursion { .. } => "resolve.recursion",
            Self::Fetch { .. } => "resolve.fetch",
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let d = Diagnostic::new(self.code(), self.to_string());
        match self {
            Self::Mode(_) => d,
            Self::Object { token, .. } | Self::Modifier { token, .. } => {
                d.with_object(token.clone())
            }
            Self::AliasCycle { name } | Self::Recursion { name } | Self::Fetch { name, .. } => {
                d.with_object(name.clone())
            }
        }
    }
}

/// Result alias for resolution.
pub type ResolveResult<T> = Result<T, ResolveError>;
