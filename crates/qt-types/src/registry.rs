use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Flat key/value snapshot consulted by `r4_` substitution.
///
/// The registry is never written by qt itself; it is loaded once per
/// session from a JSON object of strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Registry(BTreeMap<String, String>);

impl Registry {
    /// Key holding the base URL prefixed to relative values on request.
    pub const WEB_BASE_URL: &'static str = "web-base-url";

    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON object of string values.
    pub fn from_json(data: &[u8]) -> Result<Self, TypeError> {
        serde_json::from_slice(data).map_err(|e| TypeError::Registry(e.to_string()))
    }

    /// Load a registry file.
    pub fn load(path: &Path) -> Result<Self, TypeError> {
        let data = std::fs::read(path)
            .map_err(|e| TypeError::Registry(format!("{}: {e}", path.display())))?;
        Self::from_json(&data)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for Registry {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
