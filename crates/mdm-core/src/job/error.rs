use std::io;
use thiserror::Error;

use crate::engine::TransferError;

use super::JobKind;

/// Failure of one job phase. Recorded by the scheduler; never aborts other jobs.
#[derive(Debug, Error)]
pub enum JobError {
    /// Rejected by `validate`.
    #[error("invalid job: {0}")]
    Invalid(String),
    /// Metadata lookup failed during `build`.
    #[error("metadata lookup failed: {0:#}")]
    Probe(anyhow::Error),
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
    #[error("no downloader registered for job type {0}")]
    Unsupported(JobKind),
    /// An external tool reported failure.
    #[error("{0}")]
    Protocol(String),
    /// Another job in the same run already resolved to this path.
    #[error("destination {0} is already used by another job")]
    DuplicateDestination(String),
    /// The downloader panicked; the run carries on without it.
    #[error("downloader panicked: {0}")]
    Panicked(String),
    #[error("cancelled")]
    Cancelled,
}

impl JobError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        JobError::Io {
            context: context.into(),
            source,
        }
    }
}
