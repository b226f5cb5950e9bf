use serde::{Deserialize, Serialize};

/// Literal content inlined by `i4_NAME`, resolved again after inlining.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Include {
    pub id: String,
    #[serde(default)]
    pub content: String,
}

impl Include {
    pub fn new(id: &str, content: &str) -> Self {
        Self {
            id: id.to_string(),
            content: content.to_string(),
        }
    }
}
