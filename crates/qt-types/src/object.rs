use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// The five reference kinds that may appear in a source body.
///
/// Only [`Macro`](Self::Macro), [`Include`](Self::Include) and
/// [`Lgcode`](Self::Lgcode) are persisted in the object store; registry and
/// text references are satisfied by caller-supplied maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectKind {
    Macro,
    Include,
    Lgcode,
    Text,
    Registry,
}

impl ObjectKind {
    /// All kinds, in mode-letter order.
    pub const ALL: [ObjectKind; 5] = [
        Self::Registry,
        Self::Include,
        Self::Lgcode,
        Self::Macro,
        Self::Text,
    ];

    /// The name prefix, which is also the store bucket (`"m4"`).
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Macro => "m4",
            Self::Include => "i4",
            Self::Lgcode => "l4",
            Self::Text => "t4",
            Self::Registry => "r4",
        }
    }

    /// The letter selecting this kind in a resolution mode.
    pub fn mode_letter(self) -> char {
        match self {
            Self::Macro => 'm',
            Self::Include => 'i',
            Self::Lgcode => 'l',
            Self::Text => 't',
            Self::Registry => 'r',
        }
    }

    /// Look up a kind by its prefix.
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.prefix() == prefix)
    }

    /// Look up a kind by its mode letter.
    pub fn from_mode_letter(letter: char) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.mode_letter() == letter)
    }

    /// Returns `true` for kinds persisted in the object store.
    pub fn is_stored(self) -> bool {
        matches!(self, Self::Macro | Self::Include | Self::Lgcode)
    }

    /// Returns `true` if `name` is a valid bare name for this kind.
    pub fn accepts(self, name: &str) -> bool {
        let mut chars = name.chars();
        match self {
            Self::Registry => {
                chars.next().is_some_and(|c| c.is_ascii_lowercase())
                    && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
            }
            _ => {
                chars.next().is_some_and(|c| c.is_ascii_alphabetic())
                    && chars.all(|c| c.is_ascii_alphanumeric())
            }
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// A typed, canonical object name such as `m4_GREET`.
///
/// Identity is the `(kind, name)` pair. Ordering sorts by kind first.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectName {
    kind: ObjectKind,
    name: String,
}

impl ObjectName {
    /// Build a name from its parts.
    pub fn new(kind: ObjectKind, name: &str) -> Result<Self, TypeError> {
        if !kind.accepts(name) {
            return Err(TypeError::InvalidObjectName {
                value: format!("{}_{}", kind.prefix(), name),
                reason: "malformed name".into(),
            });
        }
        Ok(Self {
            kind,
            name: name.to_string(),
        })
    }

    /// Parse `"<prefix>_<name>"`.
    ///
    /// A language reference carrying a render modifier (`l4_Ejs_warn`)
    /// parses to its canonical name (`l4_warn`).
    pub fn parse(value: &str) -> Result<Self, TypeError> {
        let invalid = |reason: &str| TypeError::InvalidObjectName {
            value: value.to_string(),
            reason: reason.to_string(),
        };
        let (prefix, rest) = value.split_once('_').ok_or_else(|| invalid("missing `_`"))?;
        let kind = ObjectKind::from_prefix(prefix).ok_or_else(|| invalid("unknown prefix"))?;
        let name = match (kind, rest.split_once('_')) {
            (ObjectKind::Lgcode, Some((_, name))) => name,
            _ => rest,
        };
        if !kind.accepts(name) {
            return Err(invalid("malformed name"));
        }
        Ok(Self {
            kind,
            name: name.to_string(),
        })
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// The bare name without prefix (`"GREET"`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The store bucket (`"m4"`).
    pub fn bucket(&self) -> &'static str {
        self.kind.prefix()
    }
}

impl fmt::Debug for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectName({self})")
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.kind.prefix(), self.name)
    }
}

impl TryFrom<String> for ObjectName {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ObjectName> for String {
    fn from(name: ObjectName) -> Self {
        name.to_string()
    }
}

impl std::str::FromStr for ObjectName {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let name = ObjectName::parse("m4_GREET").unwrap();
        assert_eq!(name.kind(), ObjectKind::Macro);
        assert_eq!(name.name(), "GREET");
        assert_eq!(name.bucket(), "m4");
        assert_eq!(name.to_string(), "m4_GREET");
    }

    #[test]
    fn lgcode_modifier_is_dropped() {
        let name = ObjectName::parse("l4_Ejs_warn").unwrap();
        assert_eq!(name.to_string(), "l4_warn");
    }

    #[test]
    fn registry_keys_allow_underscores() {
        let name = ObjectName::parse("r4_web_base_url").unwrap();
        assert_eq!(name.name(), "web_base_url");
        assert!(ObjectName::parse("r4_Upper").is_err());
    }

    #[test]
    fn rejects_malformed_names() {
        for bad in ["GREET", "x4_GREET", "m4_", "m4_1abc", "m4_a-b", "i4_a_b"] {
            assert!(ObjectName::parse(bad).is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn ordering_groups_by_kind() {
        let mut names = vec![
            ObjectName::parse("l4_b").unwrap(),
            ObjectName::parse("m4_a").unwrap(),
            ObjectName::parse("m4_Z").unwrap(),
        ];
        names.sort();
        let shown: Vec<String> = names.iter().map(ToString::to_string).collect();
        assert_eq!(shown, vec!["m4_Z", "m4_a", "l4_b"]);
    }

    #[test]
    fn mode_letters_roundtrip() {
        for kind in ObjectKind::ALL {
            assert_eq!(ObjectKind::from_mode_letter(kind.mode_letter()), Some(kind));
        }
        assert!(ObjectKind::Macro.is_stored());
        assert!(!ObjectKind::Registry.is_stored());
    }
}
