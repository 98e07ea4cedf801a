//! Non-clobbering destination names.

use std::path::{Path, PathBuf};

/// First `name (N).ext` next to `path` that does not exist yet (N from 1).
pub fn next_free_name(path: &Path) -> PathBuf {
    numbered_names(path)
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| path.to_path_buf())
}

/// Numbered siblings that already exist: `name (1).ext`, `name (2).ext`, ...
/// up to the first gap. These are the names earlier runs saved under.
pub fn taken_numbered_names(path: &Path) -> impl Iterator<Item = PathBuf> {
    numbered_names(path).take_while(|candidate| candidate.exists())
}

fn numbered_names(path: &Path) -> impl Iterator<Item = PathBuf> {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let parent = path.parent().unwrap_or_else(|| Path::new("")).to_path_buf();
    (1u32..).map(move |n| parent.join(format!("{} ({}){}", stem, n, ext)))
}
