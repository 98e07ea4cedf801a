//! Jobs: the unit of work the scheduler hands to a protocol downloader.
//!
//! A [`Job`] is created from CLI or batch input with only the caller's
//! request filled in. [`Downloader::build`] resolves the destination and
//! expected size; [`Downloader::execute`] performs the transfer.

mod contract;
mod error;
mod registry;

pub use contract::{BuildOutcome, Downloader, ExecContext};
pub use error::JobError;
pub use registry::Registry;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Stable identifier of a job within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Job-type tag; selects the downloader from the [`Registry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Http,
    Git,
}

impl JobKind {
    pub const ALL: [JobKind; 2] = [JobKind::Http, JobKind::Git];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Http => "http",
            JobKind::Git => "git",
        }
    }

    /// Best guess for a bare locator: git remotes by scheme, scp-style
    /// syntax or a `.git` suffix, everything else HTTP.
    pub fn infer(source: &str) -> JobKind {
        let s = source.trim();
        let scp_style = !s.contains("://") && s.split_once(':').is_some_and(|(host, _)| host.contains('@'));
        if s.starts_with("git://") || s.starts_with("ssh://") || scp_style || s.trim_end_matches('/').ends_with(".git") {
            JobKind::Git
        } else {
            JobKind::Http
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" | "https" => Ok(JobKind::Http),
            "git" => Ok(JobKind::Git),
            other => Err(format!("unknown job type: {}", other)),
        }
    }
}

/// How a job's progress is displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressMode {
    /// Byte counter with a bar when the size is known.
    Bar,
    /// Free-form status lines from an external tool.
    LineStream,
}

/// Lifecycle state, in order. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Validating,
    Building,
    Downloading,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Validating => "validating",
            JobState::Building => "building",
            JobState::Downloading => "downloading",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for `git clone`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitOptions {
    /// Shallow clone depth (`--depth`).
    pub depth: Option<u32>,
    /// Branch or tag to check out (`--branch`).
    pub branch: Option<String>,
}

/// Protocol-specific options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOptions {
    Http,
    Git(GitOptions),
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    /// Remote locator (URL).
    pub source: String,
    /// Output path requested by the user, if any. Relative paths are
    /// resolved against the download directory.
    pub output: Option<PathBuf>,
    /// Desired parallel connections for chunked transfers.
    pub connections: usize,
    pub progress_mode: ProgressMode,
    pub options: JobOptions,
    /// Final path, set by `build`.
    pub destination: Option<PathBuf>,
    /// Expected size in bytes, set by `build` when the server reports it.
    pub expected_size: Option<u64>,
    /// Whether the server accepts byte-range requests, set by `build`.
    pub accept_ranges: bool,
    /// ETag or Last-Modified reported by the server, set by `build`.
    pub validator: Option<String>,
}

impl Job {
    fn new(id: JobId, kind: JobKind, source: String, output: Option<PathBuf>, options: JobOptions) -> Self {
        let progress_mode = match kind {
            JobKind::Http => ProgressMode::Bar,
            JobKind::Git => ProgressMode::LineStream,
        };
        Self {
            id,
            kind,
            source,
            output,
            connections: 1,
            progress_mode,
            options,
            destination: None,
            expected_size: None,
            accept_ranges: false,
            validator: None,
        }
    }

    pub fn http(id: JobId, source: impl Into<String>, output: Option<PathBuf>, connections: usize) -> Self {
        let mut job = Self::new(id, JobKind::Http, source.into(), output, JobOptions::Http);
        job.connections = connections.max(1);
        job
    }

    pub fn git(id: JobId, source: impl Into<String>, output: Option<PathBuf>, options: GitOptions) -> Self {
        Self::new(id, JobKind::Git, source.into(), output, JobOptions::Git(options))
    }

    /// Display label: the destination file name once known, else the output
    /// path or source.
    pub fn label(&self) -> String {
        let named = self
            .destination
            .as_deref()
            .or(self.output.as_deref())
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned());
        named.unwrap_or_else(|| self.source.clone())
    }
}
