//! Plain GET into `<temp dir>/<name>.part`, renamed into place when done.
//!
//! Without range support there is nothing to resume from, so every attempt
//! starts over and takes back the progress it reported.

use std::fs::{self, File};
use std::path::Path;

use crate::chunk::{remove_dir_if_empty, stream_part_path};
use crate::fetch::FetchError;
use crate::retry::RetryDecision;

use super::worker::PartSink;
use super::{create_temp_dir, Transfer, TransferError};

impl Transfer<'_> {
    pub(super) fn stream(&self, url: &str, destination: &Path, size: Option<u64>) -> Result<u64, TransferError> {
        let temp_dir = create_temp_dir(destination)?;
        let temp = stream_part_path(destination);
        tracing::info!(job = %self.reporter.job(), path = %destination.display(), ?size, "starting single-stream transfer");

        let mut attempt = 1;
        let bytes = loop {
            if self.cancel.is_cancelled() {
                return Err(TransferError::Cancelled);
            }
            let err = match self.stream_attempt(url, &temp, size) {
                Ok(bytes) => break bytes,
                Err(_) if self.cancel.is_cancelled() => return Err(TransferError::Cancelled),
                Err(e) => e,
            };
            match self.policy.decide(attempt, err.is_retryable()) {
                RetryDecision::NoRetry => {
                    tracing::warn!(job = %self.reporter.job(), attempt, "download failed: {}", err);
                    return Err(err.into());
                }
                RetryDecision::RetryAfter(delay) => {
                    tracing::debug!(job = %self.reporter.job(), attempt, ?delay, "attempt failed: {}; retrying", err);
                    if !self.cancel.sleep(delay) {
                        return Err(TransferError::Cancelled);
                    }
                    attempt += 1;
                }
            }
        };

        fs::rename(&temp, destination)
            .map_err(|e| TransferError::io(format!("move {} into place", temp.display()), e))?;
        remove_dir_if_empty(&temp_dir);
        tracing::info!(job = %self.reporter.job(), path = %destination.display(), bytes, "transfer complete");
        Ok(bytes)
    }

    fn stream_attempt(&self, url: &str, temp: &Path, size: Option<u64>) -> Result<u64, FetchError> {
        let file = File::create(temp).map_err(FetchError::Storage)?;
        let mut sink = PartSink::new(file, self.reporter, self.cancel, size);
        let result = self.client.get(url, &mut sink);
        let written = sink.written();

        let checked = result.and_then(|declared| {
            sink.sync().map_err(FetchError::Storage)?;
            match size.or(declared) {
                Some(expected) if expected != written => Err(FetchError::PartialTransfer {
                    expected,
                    received: written,
                }),
                _ => Ok(written),
            }
        });
        if checked.is_err() {
            // The next attempt truncates the file and counts from zero.
            self.reporter.bytes(-(written as i64));
        }
        checked
    }
}
