use qt_types::Diagnostic;

/// Errors raised while binding, rendering or decoding objects.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ObjectError {
    /// Argument text does not start with `(`.
    #[error("argument list must start with `(`")]
    ArgsNotCall,

    /// Argument list is missing its closing parenthesis or quote.
    #[error("unclosed argument list")]
    ArgsUnclosed,

    /// More arguments than declared parameters.
    #[error("too many arguments for `{object}`: {given} given, {max} accepted")]
    TooManyArgs {
        object: String,
        given: usize,
        max: usize,
    },

    /// A parameter bound both positionally and by name.
    #[error("parameter `{param}` of `{object}` occurs twice")]
    DuplicateArg { object: String, param: String },

    /// A keyword-only parameter passed positionally.
    #[error("parameter `{param}` of `{object}` must be passed by name")]
    NamedOnly { object: String, param: String },

    /// Unknown render algorithm suffix.
    #[error("unknown render algorithm `{0}`")]
    UnknownAlgo(String),

    /// Language modifier with an unknown language letter.
    #[error("unknown language modifier `{0}`")]
    UnknownLanguage(String),

    /// An object record that cannot be decoded.
    #[error("corrupt {object} record: {reason}")]
    Corrupt { object: String, reason: String },
}

impl ObjectError {
    /// Stable reference code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ArgsNotCall => "parse.args.call",
            Self::ArgsUnclosed => "parse.args.unclosed",
            Self::TooManyArgs { .. } => "macro.args.toomany",
            Self::DuplicateArg { .. } => "macro.args.twice",
            Self::NamedOnly { .. } => "macro.args.named",
            Self::UnknownAlgo(_) => "render.algo.unknown",
            Self::UnknownLanguage(_) => "render.language.unknown",
            Self::Corrupt { .. } => "object.record.corrupt",
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let d = Diagnostic::new(self.code(), self.to_string());
        match self {
            Self::TooManyArgs { object, .. }
            | Self::DuplicateArg { object, .. }
            | Self::NamedOnly { object, .. }
            | Self::Corrupt { object, .. } => d.with_object(object.clone()),
            _ => d,
        }
    }
}

/// Convenience alias used throughout the object crate.
pub type ObjectResult<T> = std::result::Result<T, ObjectError>;
