//! HTTP(S) downloads through the chunked transfer engine.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::engine::{Transfer, TransferError};
use crate::fetch::{HttpClient, ProbeResult};
use crate::job::{BuildOutcome, Downloader, ExecContext, Job, JobError};
use crate::url_model::{derive_filename, next_free_name, taken_numbered_names};

use super::DownloadSettings;

pub struct HttpDownloader {
    client: Arc<dyn HttpClient>,
    settings: DownloadSettings,
}

impl HttpDownloader {
    pub fn new(client: Arc<dyn HttpClient>, settings: DownloadSettings) -> Self {
        Self { client, settings }
    }

    /// Requested output, or a name derived from the response inside the
    /// download directory. An output naming an existing directory gets the
    /// derived name inside it.
    fn destination(&self, job: &Job, probe: &ProbeResult) -> PathBuf {
        let derived = || derive_filename(&job.source, probe.content_disposition.as_deref());
        match &job.output {
            Some(output) => {
                let path = self.settings.resolve(output);
                if path.is_dir() {
                    path.join(derived())
                } else {
                    path
                }
            }
            None => self.settings.download_dir.join(derived()),
        }
    }
}

/// A numbered sibling (`name (N).ext`) an earlier run saved with exactly
/// `size` bytes.
fn complete_sibling(destination: &Path, size: u64) -> Option<PathBuf> {
    taken_numbered_names(destination).find(|p| fs::metadata(p).is_ok_and(|m| m.is_file() && m.len() == size))
}

impl Downloader for HttpDownloader {
    fn validate(&self, job: &Job) -> Result<(), JobError> {
        let url = url::Url::parse(&job.source)
            .map_err(|e| JobError::Invalid(format!("{}: {}", job.source, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(JobError::Invalid(format!(
                "unsupported scheme {:?} for an http job",
                url.scheme()
            )));
        }
        if job.connections == 0 {
            return Err(JobError::Invalid("connection count must be at least 1".to_string()));
        }
        Ok(())
    }

    fn build(&self, job: &mut Job) -> Result<BuildOutcome, JobError> {
        let probe = self.client.probe(&job.source).map_err(JobError::Probe)?;
        job.expected_size = probe.content_length;
        job.accept_ranges = probe.accept_ranges;
        job.validator = probe.validator().map(str::to_string);
        let mut destination = self.destination(job, &probe);

        match fs::metadata(&destination) {
            Ok(meta) if meta.is_file() && Some(meta.len()) == probe.content_length => {
                tracing::info!(job = %job.id, path = %destination.display(), "destination already complete");
                job.destination = Some(destination);
                return Ok(BuildOutcome::AlreadySatisfied);
            }
            Ok(_) => {
                if let Some(earlier) = probe.content_length.and_then(|size| complete_sibling(&destination, size)) {
                    tracing::info!(job = %job.id, path = %earlier.display(), "destination already complete");
                    job.destination = Some(earlier);
                    return Ok(BuildOutcome::AlreadySatisfied);
                }
                let free = next_free_name(&destination);
                tracing::info!(
                    job = %job.id,
                    taken = %destination.display(),
                    path = %free.display(),
                    "destination exists with different content, saving under a new name"
                );
                destination = free;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(JobError::io(format!("stat {}", destination.display()), e)),
        }

        tracing::debug!(
            job = %job.id,
            path = %destination.display(),
            size = ?job.expected_size,
            accept_ranges = job.accept_ranges,
            validator = ?job.validator,
            "resolved destination"
        );
        job.destination = Some(destination);
        Ok(BuildOutcome::Ready)
    }

    fn execute(&self, job: &mut Job, ctx: &ExecContext) -> Result<(), JobError> {
        let destination = job
            .destination
            .clone()
            .ok_or_else(|| JobError::Invalid("destination not resolved".to_string()))?;
        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| JobError::io(format!("create {}", parent.display()), e))?;
        }
        ctx.reporter.total(job.expected_size);

        let transfer = Transfer {
            client: self.client.as_ref(),
            policy: self.settings.retry,
            reporter: &ctx.reporter,
            cancel: &ctx.cancel,
            validator: job.validator.as_deref(),
        };
        match transfer.run(
            &job.source,
            &destination,
            job.expected_size,
            job.accept_ranges,
            job.connections,
            self.settings.min_chunk_size,
        ) {
            Ok(_) => Ok(()),
            Err(TransferError::Cancelled) => Err(JobError::Cancelled),
            Err(e) => Err(e.into()),
        }
    }
}
