//! Basename uniqueness index.
//!
//! Layout: `unique/<h(base)[0..2]>/<h(base)[2..]>/<h(path)>` holding
//! `{"path": "<qpath>"}`, one entry per source with that basename.

use qt_crypto::ContentHasher;
use qt_types::QPath;
use qt_vfs::{ReleaseFs, VfsResult};
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct UniqueEntry {
    path: String,
}

fn base_dir(base: &str) -> String {
    let digest = ContentHasher::UNIQUE.hash(base.as_bytes());
    let (head, tail) = digest.fan_out();
    format!("{}/{head}/{tail}", ReleaseFs::UNIQUE_DIR)
}

fn entry_place(path: &QPath) -> String {
    let leaf = ContentHasher::UNIQUE.hex(path.as_str().as_bytes());
    format!("{}/{leaf}", base_dir(path.base_name()))
}

/// Every registered source with basename `base`, sorted.
pub fn owners(fs: &ReleaseFs, base: &str) -> VfsResult<Vec<String>> {
    let dir = base_dir(base);
    let mut owners = Vec::new();
    for leaf in fs.read_dir(&dir)? {
        let data = fs.read(&format!("{dir}/{leaf}"))?;
        match serde_json::from_slice::<UniqueEntry>(&data) {
            Ok(entry) => owners.push(entry.path),
            Err(e) => warn!(dir = %dir, leaf = %leaf, error = %e, "skipping unreadable unique entry"),
        }
    }
    owners.sort();
    Ok(owners)
}

/// Another source already owning the basename of `path`, if any.
pub fn other_owner(fs: &ReleaseFs, path: &QPath) -> VfsResult<Option<String>> {
    Ok(owners(fs, path.base_name())?
        .into_iter()
        .find(|owner| owner != path.as_str()))
}

pub fn register(fs: &ReleaseFs, path: &QPath) -> VfsResult<bool> {
    let data = serde_json::json!({ "path": path.as_str() }).to_string();
    Ok(fs.store(&entry_place(path), data.as_bytes(), None)?.changed)
}

pub fn unregister(fs: &ReleaseFs, path: &QPath) -> VfsResult<bool> {
    fs.waste(&entry_place(path))
}
