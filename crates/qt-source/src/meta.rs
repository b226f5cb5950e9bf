use chrono::{DateTime, SecondsFormat, Utc};
use qt_crypto::ContentHasher;
use qt_types::QPath;
use qt_vfs::ReleaseFs;
use serde::{Deserialize, Serialize};

/// Audit record of a source: who created and last modified it, and when.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub source: String,
    /// Creator.
    #[serde(default)]
    pub cu: String,
    /// Last modifier.
    #[serde(default)]
    pub mu: String,
    /// Created at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ct: Option<DateTime<Utc>>,
    /// Modified at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mt: Option<DateTime<Utc>>,
    /// Content digest of the source bytes; not persisted.
    #[serde(skip)]
    pub digest: String,
}

impl Meta {
    pub fn new(source: &QPath) -> Self {
        Self {
            source: source.to_string(),
            ..Self::default()
        }
    }

    /// Release-relative place of the meta record of `source`.
    pub fn place(source: &QPath) -> String {
        let digest = ContentHasher::META.hash(source.as_str().as_bytes());
        let (head, tail) = digest.fan_out();
        format!("{}/{head}/{tail}.json", ReleaseFs::META_DIR)
    }

    /// Record a modification by `user` at `at`; the first one also sets the
    /// creation fields.
    pub fn touch(&mut self, user: &str, at: DateTime<Utc>) {
        if self.ct.is_none() {
            self.ct = Some(at);
        }
        if self.cu.is_empty() {
            self.cu = user.to_string();
        }
        self.mt = Some(at);
        self.mu = user.to_string();
    }

    /// Modification time as RFC 3339, empty if never modified.
    pub fn modified(&self) -> String {
        self.mt
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_default()
    }
}
