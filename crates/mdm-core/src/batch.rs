//! Batch input: a map from job type to a list of entries.
//!
//! ```json
//! { "http": [ { "link": "https://example.com/a.iso", "output-path": "isos/a.iso" } ],
//!   "git":  [ { "link": "https://example.com/r.git", "depth": 1 } ] }
//! ```
//!
//! JSON by default; a `.toml` file is read as TOML with the same shape.
//! Sections with an unknown type name are skipped with a warning.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::job::{GitOptions, Job, JobId, JobKind};

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid JSON batch: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid TOML batch: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchFormat {
    Json,
    Toml,
}

impl BatchFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => BatchFormat::Toml,
            _ => BatchFormat::Json,
        }
    }
}

/// One download request within a section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BatchEntry {
    pub link: String,
    #[serde(default)]
    pub output_path: Option<PathBuf>,
    /// Overrides the global connection count for this job.
    #[serde(default)]
    pub connections: Option<usize>,
    #[serde(default)]
    pub depth: Option<u32>,
    #[serde(default)]
    pub branch: Option<String>,
}

/// Jobs parsed from a batch file, plus the sections that were skipped.
#[derive(Debug, Default)]
pub struct Batch {
    pub jobs: Vec<Job>,
    pub warnings: Vec<String>,
}

enum Section {
    Json(serde_json::Value),
    Toml(toml::Value),
}

impl Section {
    fn entries(self) -> Result<Vec<BatchEntry>, BatchError> {
        Ok(match self {
            Section::Json(v) => serde_json::from_value(v)?,
            Section::Toml(v) => v.try_into()?,
        })
    }
}

fn sections(text: &str, format: BatchFormat) -> Result<Vec<(String, Section)>, BatchError> {
    Ok(match format {
        BatchFormat::Json => serde_json::from_str::<BTreeMap<String, serde_json::Value>>(text)?
            .into_iter()
            .map(|(k, v)| (k, Section::Json(v)))
            .collect(),
        BatchFormat::Toml => toml::from_str::<BTreeMap<String, toml::Value>>(text)?
            .into_iter()
            .map(|(k, v)| (k, Section::Toml(v)))
            .collect(),
    })
}

fn job_for(kind: JobKind, id: JobId, entry: BatchEntry, default_connections: usize) -> Job {
    match kind {
        JobKind::Http => Job::http(
            id,
            entry.link,
            entry.output_path,
            entry.connections.unwrap_or(default_connections),
        ),
        JobKind::Git => Job::git(
            id,
            entry.link,
            entry.output_path,
            GitOptions {
                depth: entry.depth,
                branch: entry.branch,
            },
        ),
    }
}

/// Parses batch `text`. Job ids are assigned in order starting at 1.
pub fn parse_batch(text: &str, format: BatchFormat, default_connections: usize) -> Result<Batch, BatchError> {
    let mut batch = Batch::default();
    let mut next_id = 1;
    for (name, section) in sections(text, format)? {
        let kind = match name.parse::<JobKind>() {
            Ok(kind) => kind,
            Err(_) => {
                let warning = format!("skipping unknown job type {:?}", name);
                tracing::warn!("{}", warning);
                batch.warnings.push(warning);
                continue;
            }
        };
        for entry in section.entries()? {
            batch.jobs.push(job_for(kind, JobId(next_id), entry, default_connections));
            next_id += 1;
        }
    }
    tracing::debug!(jobs = batch.jobs.len(), skipped = batch.warnings.len(), "parsed batch");
    Ok(batch)
}

/// Reads and parses a batch file; the format follows the extension.
pub fn load_batch(path: &Path, default_connections: usize) -> Result<Batch, BatchError> {
    let text = fs::read_to_string(path).map_err(|source| BatchError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_batch(&text, BatchFormat::from_path(path), default_connections)
}
