//! Chunk worker: brings one part file to exactly `chunk.len()` bytes.
//!
//! The part file's size is the checkpoint. A full part file short-circuits
//! without a request; a shorter one is resumed from its end. Attempts are
//! retried under the [`RetryPolicy`], re-checking the file against the tracked
//! count before every retry.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::chunk::Chunk;
use crate::control::CancelToken;
use crate::fetch::{FetchError, HttpClient};
use crate::progress::Reporter;
use crate::retry::{RetryDecision, RetryPolicy};

/// Appends to a file, reporting every write as a progress delta.
///
/// With a limit set, refuses any write that would take the total past it,
/// and fails every write once cancellation is requested.
pub(super) struct PartSink<'a> {
    file: File,
    reporter: &'a Reporter,
    cancel: &'a CancelToken,
    limit: Option<u64>,
    written: u64,
}

impl<'a> PartSink<'a> {
    pub(super) fn new(file: File, reporter: &'a Reporter, cancel: &'a CancelToken, limit: Option<u64>) -> Self {
        Self {
            file,
            reporter,
            cancel,
            limit,
            written: 0,
        }
    }

    pub(super) fn written(&self) -> u64 {
        self.written
    }

    pub(super) fn sync(&self) -> io::Result<()> {
        self.file.sync_data()
    }
}

impl Write for PartSink<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.cancel.is_cancelled() {
            // Not Interrupted: write_all would retry that.
            return Err(io::Error::new(io::ErrorKind::Other, "transfer cancelled"));
        }
        if let Some(limit) = self.limit {
            if self.written + buf.len() as u64 > limit {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("server sent more than the {} requested bytes", limit),
                ));
            }
        }
        self.file.write_all(buf)?;
        self.written += buf.len() as u64;
        self.reporter.bytes(buf.len() as i64);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

pub(super) fn file_len(path: &Path) -> io::Result<u64> {
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e),
    }
}

pub(super) fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Makes the part file and `chunk.downloaded` agree before a retry.
///
/// On disagreement the file is deleted, the tracked bytes are reported back
/// as a negative delta and the chunk restarts from zero.
pub(crate) fn reconcile_part_file(path: &Path, chunk: &mut Chunk, reporter: &Reporter) -> io::Result<()> {
    let on_disk = file_len(path)?;
    if on_disk == chunk.downloaded && on_disk <= chunk.len() {
        return Ok(());
    }
    tracing::warn!(
        chunk = chunk.index,
        on_disk,
        tracked = chunk.downloaded,
        path = %path.display(),
        "part file disagrees with tracked progress, restarting chunk"
    );
    remove_if_exists(path)?;
    reporter.bytes(-(chunk.downloaded as i64));
    chunk.downloaded = 0;
    Ok(())
}

/// Downloads one chunk into its part file.
pub struct ChunkWorker<'a> {
    pub client: &'a dyn HttpClient,
    pub url: &'a str,
    pub part_path: PathBuf,
    pub policy: RetryPolicy,
    pub reporter: Reporter,
    pub cancel: &'a CancelToken,
}

impl ChunkWorker<'_> {
    /// On success the part file holds exactly `chunk.len()` bytes and
    /// `chunk.completed` is set. On error `chunk.completed` is false and the
    /// part file keeps whatever was flushed, for the next run to resume.
    pub fn run(&self, chunk: &mut Chunk) -> Result<(), FetchError> {
        chunk.completed = false;
        let expected = chunk.len();
        let on_disk = file_len(&self.part_path).map_err(FetchError::Storage)?;

        if on_disk == expected {
            tracing::debug!(chunk = chunk.index, bytes = on_disk, "part file already complete");
            chunk.downloaded = expected;
            chunk.completed = true;
            self.reporter.bytes(expected as i64);
            return Ok(());
        }
        if on_disk > expected {
            tracing::warn!(
                chunk = chunk.index,
                on_disk,
                expected,
                "part file larger than its chunk, discarding"
            );
            remove_if_exists(&self.part_path).map_err(FetchError::Storage)?;
            chunk.downloaded = 0;
        } else {
            if on_disk > 0 {
                tracing::debug!(chunk = chunk.index, bytes = on_disk, "resuming part file");
                self.reporter.bytes(on_disk as i64);
            }
            chunk.downloaded = on_disk;
        }

        let mut attempt = 1;
        loop {
            if self.cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            if attempt > 1 {
                reconcile_part_file(&self.part_path, chunk, &self.reporter).map_err(FetchError::Storage)?;
            }
            let err = match self.attempt(chunk) {
                Ok(()) => {
                    chunk.completed = true;
                    tracing::debug!(chunk = chunk.index, attempt, "chunk complete");
                    return Ok(());
                }
                Err(_) if self.cancel.is_cancelled() => FetchError::Cancelled,
                Err(e) => e,
            };
            match self.policy.decide(attempt, err.is_retryable()) {
                RetryDecision::NoRetry => {
                    tracing::warn!(chunk = chunk.index, attempt, "chunk failed: {}", err);
                    return Err(err);
                }
                RetryDecision::RetryAfter(delay) => {
                    tracing::debug!(chunk = chunk.index, attempt, ?delay, "attempt failed: {}; retrying", err);
                    if !self.cancel.sleep(delay) {
                        return Err(FetchError::Cancelled);
                    }
                    attempt += 1;
                }
            }
        }
    }

    fn attempt(&self, chunk: &mut Chunk) -> Result<(), FetchError> {
        let remaining = chunk.remaining();
        if remaining == 0 {
            return Ok(());
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.part_path)
            .map_err(FetchError::Storage)?;
        let mut sink = PartSink::new(file, &self.reporter, self.cancel, Some(remaining));
        let result = self
            .client
            .get_range(self.url, chunk.start + chunk.downloaded, chunk.end, &mut sink);
        let received = sink.written();
        chunk.downloaded += received;
        result?;
        sink.sync().map_err(FetchError::Storage)?;

        if received != remaining || chunk.downloaded != chunk.len() {
            return Err(FetchError::PartialTransfer {
                expected: remaining,
                received,
            });
        }
        Ok(())
    }
}
