//! Record of the plan a set of part files was written for.
//!
//! Stored beside the parts as `<base>.manifest`. Parts are only resumed when
//! the stored plan matches the current one; a different size, chunk count or
//! remote validator means the old parts describe other byte ranges.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::part::{base_name, temp_dir_for};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartManifest {
    pub size: u64,
    pub chunks: usize,
    /// ETag, else Last-Modified, of the remote resource.
    #[serde(default)]
    pub validator: Option<String>,
}

pub fn manifest_path(destination: &Path) -> PathBuf {
    temp_dir_for(destination).join(format!("{}.manifest", base_name(destination)))
}

impl PartManifest {
    /// The stored manifest, or `None` when it is missing or unreadable.
    pub fn load(destination: &Path) -> Option<Self> {
        let text = fs::read_to_string(manifest_path(destination)).ok()?;
        serde_json::from_str(&text).ok()
    }

    pub fn store(&self, destination: &Path) -> io::Result<()> {
        let text = serde_json::to_string(self).map_err(io::Error::other)?;
        fs::write(manifest_path(destination), text)
    }
}
