use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Canonical release identifier, e.g. `"5.10"`.
///
/// Canonical form is `<major>.<two-digit minor>`. Trailing release-stage
/// markers (`beta`, `BETA`, spaces, `-`, `_`) are stripped before
/// validation, so `"5.10beta"` and `"5.10"` name the same release.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReleaseId(String);

impl ReleaseId {
    /// Parse and canonicalize a release id.
    pub fn parse(value: &str) -> Result<Self, TypeError> {
        let canon = value
            .trim()
            .trim_end_matches(|c: char| " -_".contains(c) || "betaBETA".contains(c));
        let invalid = || TypeError::InvalidRelease {
            value: value.to_string(),
        };
        let (major, minor) = canon.split_once('.').ok_or_else(invalid)?;
        let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
        if !digits(major) || minor.len() != 2 || !digits(minor) {
            return Err(invalid());
        }
        Ok(Self(canon.to_string()))
    }

    /// The canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ReleaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReleaseId({})", self.0)
    }
}

impl fmt::Display for ReleaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ReleaseId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ReleaseId> for String {
    fn from(id: ReleaseId) -> Self {
        id.0
    }
}

impl std::str::FromStr for ReleaseId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_ids() {
        assert_eq!(ReleaseId::parse("5.10").unwrap().as_str(), "5.10");
        assert_eq!(ReleaseId::parse("12.00").unwrap().as_str(), "12.00");
    }

    #[test]
    fn strips_stage_markers() {
        assert_eq!(ReleaseId::parse("5.10beta").unwrap().as_str(), "5.10");
        assert_eq!(ReleaseId::parse(" 5.10 - BETA").unwrap().as_str(), "5.10");
    }

    #[test]
    fn rejects_malformed_ids() {
        for bad in ["", "5", "5.1", "5.100", "a.10", ".10", "5,10"] {
            assert!(ReleaseId::parse(bad).is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn serde_uses_plain_string() {
        let id = ReleaseId::parse("1.00").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"1.00\"");
        let back: ReleaseId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<ReleaseId>("\"1.0\"").is_err());
    }
}
