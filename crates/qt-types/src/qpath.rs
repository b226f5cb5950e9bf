use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Canonical absolute path of a source inside a release.
///
/// A `QPath` always starts with `/`, never ends with `/` (except the root
/// itself), uses `/` as the only separator, and contains no empty, `.` or
/// `..` segments.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QPath(String);

impl QPath {
    /// Parse and canonicalize a path. A missing leading `/` is added and
    /// repeated separators are collapsed.
    pub fn parse(value: &str) -> Result<Self, TypeError> {
        let invalid = |reason: &str| TypeError::InvalidPath {
            value: value.to_string(),
            reason: reason.to_string(),
        };
        if value.contains('\\') {
            return Err(invalid("backslash in path"));
        }
        let mut canon = String::with_capacity(value.len() + 1);
        for segment in value.split('/').filter(|s| !s.is_empty()) {
            if segment == "." || segment == ".." {
                return Err(invalid("relative segment"));
            }
            if segment.trim() != segment {
                return Err(invalid("segment with surrounding whitespace"));
            }
            canon.push('/');
            canon.push_str(segment);
        }
        if canon.is_empty() {
            return Err(invalid("empty path"));
        }
        Ok(Self(canon))
    }

    /// The canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Directory part and basename, e.g. `("/a/b", "c.m")`.
    pub fn partition(&self) -> (&str, &str) {
        match self.0.rfind('/') {
            Some(0) => ("/", &self.0[1..]),
            Some(idx) => (&self.0[..idx], &self.0[idx + 1..]),
            None => ("/", &self.0),
        }
    }

    /// The last path segment.
    pub fn base_name(&self) -> &str {
        self.partition().1
    }

    /// The parent directory, or `None` for a top-level path.
    pub fn parent(&self) -> Option<QPath> {
        match self.partition().0 {
            "/" => None,
            dir => Some(Self(dir.to_string())),
        }
    }

    /// Extension of the basename without the dot (`"m"` for `/a/b.m`).
    pub fn extension(&self) -> Option<&str> {
        let base = self.base_name();
        match base.rfind('.') {
            Some(0) | None => None,
            Some(idx) => Some(&base[idx + 1..]),
        }
    }

    /// Append a relative segment list.
    pub fn join(&self, rel: &str) -> Result<QPath, TypeError> {
        Self::parse(&format!("{}/{}", self.0, rel))
    }

    /// The path relative to `dir`, or `None` if `self` is not below it.
    pub fn strip_dir(&self, dir: &QPath) -> Option<&str> {
        self.0
            .strip_prefix(dir.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
    }

    /// All proper ancestor directories, nearest first.
    pub fn ancestors(&self) -> impl Iterator<Item = QPath> + '_ {
        std::iter::successors(self.parent(), |p| p.parent())
    }
}

impl fmt::Debug for QPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QPath({})", self.0)
    }
}

impl fmt::Display for QPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for QPath {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<QPath> for String {
    fn from(path: QPath) -> Self {
        path.0
    }
}

impl std::str::FromStr for QPath {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
