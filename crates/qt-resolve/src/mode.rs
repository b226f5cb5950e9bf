use std::fmt;
use std::str::FromStr;

use qt_types::ObjectKind;

use crate::error::ResolveError;

/// The set of reference kinds a resolution pass expands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mode(u8);

impl Mode {
    /// Every kind: `"rilmt"`.
    pub const ALL: Mode = Mode(0b1_1111);
    pub const NONE: Mode = Mode(0);

    fn bit(kind: ObjectKind) -> u8 {
        match kind {
            ObjectKind::Registry => 1,
            ObjectKind::Include => 1 << 1,
            ObjectKind::Lgcode => 1 << 2,
            ObjectKind::Macro => 1 << 3,
            ObjectKind::Text => 1 << 4,
        }
    }

    pub fn contains(self, kind: ObjectKind) -> bool {
        self.0 & Self::bit(kind) != 0
    }

    pub fn with(self, kind: ObjectKind) -> Self {
        Self(self.0 | Self::bit(kind))
    }

    pub fn without(self, kind: ObjectKind) -> Self {
        Self(self.0 & !Self::bit(kind))
    }

    /// Mode used inside language bodies: registry and language only.
    pub fn for_language_body(self) -> Self {
        self.without(ObjectKind::Macro)
            .without(ObjectKind::Include)
            .without(ObjectKind::Text)
    }

    /// Mode used inside rendered macro bodies: includes stay literal.
    pub fn for_macro_body(self) -> Self {
        self.without(ObjectKind::Include)
    }
}

impl Default for Mode {
    fn default() -> Self {
        Self::ALL
    }
}

impl FromStr for Mode {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.chars().try_fold(Self::NONE, |mode, c| {
            ObjectKind::from_mode_letter(c)
                .map(|kind| mode.with(kind))
                .ok_or(ResolveError::Mode(c))
        })
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for kind in ObjectKind::ALL {
            if self.contains(kind) {
                write!(f, "{}", kind.mode_letter())?;
            }
        }
        Ok(())
    }
}
