//! Part-file naming and cleanup.
//!
//! Layout: `<dest dir>/.mdm-temp/<dest file name>.part<index>`. The name must
//! stay stable across runs; it is how a restarted transfer finds its chunks.

use std::io;
use std::path::{Path, PathBuf};

/// Directory (sibling of the destination) holding in-progress part files.
pub const TEMP_DIR_NAME: &str = ".mdm-temp";

const PART_MARKER: &str = ".part";

/// Temp directory for a destination: `<dest dir>/.mdm-temp`.
pub fn temp_dir_for(destination: &Path) -> PathBuf {
    let dir = match destination.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    dir.join(TEMP_DIR_NAME)
}

pub(super) fn base_name(destination: &Path) -> String {
    destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string())
}

/// Part file for chunk `index` of `destination`.
pub fn part_path(destination: &Path, index: usize) -> PathBuf {
    temp_dir_for(destination).join(format!("{}{}{}", base_name(destination), PART_MARKER, index))
}

/// Temp file for a single-stream (non-range) transfer: `<base>.part`.
pub fn stream_part_path(destination: &Path) -> PathBuf {
    temp_dir_for(destination).join(format!("{}{}", base_name(destination), PART_MARKER))
}

/// Chunk index encoded in a part file name (`name.bin.part3` → 3).
pub fn part_index(path: &Path) -> Option<usize> {
    let name = path.file_name()?.to_str()?;
    let (_, digits) = name.rsplit_once(PART_MARKER)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Deletes every part file belonging to `destination` (and the plain
/// single-stream `.part` file and the plan manifest), then the temp dir if
/// nothing else is left in it. Returns the number of part files removed.
pub fn clean_temp_files(destination: &Path) -> io::Result<usize> {
    remove_parts(destination, |_| true)
}

/// Deletes indexed part files whose index is `first` or above; they belong
/// to a plan with more chunks. Returns the number removed.
pub fn remove_parts_from(destination: &Path, first: usize) -> io::Result<usize> {
    remove_parts(destination, |index| index.is_some_and(|i| i >= first))
}

/// Removes parts for which `select(index)` holds; the single-stream part has
/// index `None`. Selecting everything also drops the manifest and the empty dir.
fn remove_parts(destination: &Path, select: impl Fn(Option<usize>) -> bool) -> io::Result<usize> {
    let dir = temp_dir_for(destination);
    let prefix = format!("{}{}", base_name(destination), PART_MARKER);
    let entries = match std::fs::read_dir(&dir) {
        Ok(e) => e,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(rest) = name.strip_prefix(&prefix) else {
            continue;
        };
        if !rest.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        if select(rest.parse().ok()) {
            std::fs::remove_file(entry.path())?;
            tracing::debug!(path = %entry.path().display(), "removed part file");
            removed += 1;
        }
    }
    if select(None) {
        match std::fs::remove_file(super::manifest_path(destination)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        remove_dir_if_empty(&dir);
    }
    Ok(removed)
}

/// Removes the temp dir when it no longer holds anything.
pub(crate) fn remove_dir_if_empty(dir: &Path) {
    // remove_dir refuses non-empty directories, which is exactly the check we want.
    if std::fs::remove_dir(dir).is_ok() {
        tracing::debug!(path = %dir.display(), "removed empty temp dir");
    }
}
