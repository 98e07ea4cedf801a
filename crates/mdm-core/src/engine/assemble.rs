//! Concatenates completed part files into the destination.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::chunk::{part_index, remove_dir_if_empty};

#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("no part files to assemble")]
    Empty,
    #[error("part file name carries no chunk index: {0}")]
    BadPartName(String),
    /// Indices are not exactly `0..n`.
    #[error("part {0} is missing or duplicated")]
    MissingPart(usize),
    #[error("copied {copied} bytes from {path}, which holds {expected}")]
    PartMismatch { path: String, expected: u64, copied: u64 },
    #[error("assembled {actual} bytes, expected {expected}")]
    TotalMismatch { expected: u64, actual: u64 },
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> AssembleError + '_ {
    move |source| AssembleError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Orders part files by the index in their names (`.part<N>`).
fn order_parts(parts: &[PathBuf]) -> Result<Vec<&Path>, AssembleError> {
    let mut indexed = parts
        .iter()
        .map(|p| {
            part_index(p)
                .map(|i| (i, p.as_path()))
                .ok_or_else(|| AssembleError::BadPartName(p.display().to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    indexed.sort_by_key(|(i, _)| *i);
    for (expected, (index, _)) in indexed.iter().enumerate() {
        if *index != expected {
            return Err(AssembleError::MissingPart(expected));
        }
    }
    Ok(indexed.into_iter().map(|(_, p)| p).collect())
}

fn copy_parts(ordered: &[&Path], destination: &Path, expected_total: u64) -> Result<u64, AssembleError> {
    let out = File::create(destination).map_err(io_err(destination))?;
    let mut out = BufWriter::new(out);
    let mut total = 0u64;

    for path in ordered {
        let mut part = File::open(path).map_err(io_err(path))?;
        let expected = part.metadata().map_err(io_err(path))?.len();
        let copied = io::copy(&mut part, &mut out).map_err(io_err(path))?;
        if copied != expected {
            return Err(AssembleError::PartMismatch {
                path: path.display().to_string(),
                expected,
                copied,
            });
        }
        total += copied;
    }

    out.flush().map_err(io_err(destination))?;
    out.get_ref().sync_all().map_err(io_err(destination))?;
    if total != expected_total {
        return Err(AssembleError::TotalMismatch {
            expected: expected_total,
            actual: total,
        });
    }
    Ok(total)
}

/// Writes `parts` in index order to `destination` and verifies the byte
/// counts, then deletes the parts and their directory if it is left empty.
///
/// On any error the parts are kept and the partially written destination
/// is removed.
pub fn assemble(parts: &[PathBuf], destination: &Path, expected_total: u64) -> Result<u64, AssembleError> {
    if parts.is_empty() {
        return Err(AssembleError::Empty);
    }
    let ordered = order_parts(parts)?;

    let total = match copy_parts(&ordered, destination, expected_total) {
        Ok(total) => total,
        Err(e) => {
            let _ = fs::remove_file(destination);
            return Err(e);
        }
    };

    for path in &ordered {
        fs::remove_file(path).map_err(io_err(path))?;
    }
    if let Some(dir) = ordered[0].parent() {
        remove_dir_if_empty(dir);
    }
    tracing::debug!(
        path = %destination.display(),
        parts = ordered.len(),
        bytes = total,
        "assembled destination"
    );
    Ok(total)
}
