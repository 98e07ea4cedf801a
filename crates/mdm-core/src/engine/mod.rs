//! Transfer engine: chunked and single-stream drivers.
//!
//! A chunked transfer plans `connections` byte ranges, runs one
//! [`ChunkWorker`] thread per range and assembles the part files in index
//! order. A single-stream transfer either runs as one resumable chunk (when
//! the server supports ranges) or as a plain GET into a temp file that is
//! renamed into place once the byte count checks out.

mod assemble;
mod single;
mod strategy;
mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use assemble::{assemble, AssembleError};
pub use strategy::{choose_strategy, TransferStrategy};
pub use worker::ChunkWorker;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::thread;
use thiserror::Error;

use crate::chunk::{
    clean_temp_files, manifest_path, part_path, plan_chunks, remove_dir_if_empty, remove_parts_from, temp_dir_for,
    PartManifest,
};
use crate::control::CancelToken;
use crate::fetch::{FetchError, HttpClient};
use crate::progress::Reporter;
use crate::retry::RetryPolicy;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("cannot split {size} bytes into {connections} chunks")]
    InvalidPlan { size: u64, connections: usize },
    /// Some chunk workers gave up; their part files are kept for resume.
    #[error("chunks {failed:?} of {total} did not complete: {last_error}")]
    IncompleteChunks {
        failed: Vec<usize>,
        total: usize,
        last_error: String,
    },
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("assembly failed: {0}")]
    Assemble(#[from] AssembleError),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
    #[error("transfer cancelled")]
    Cancelled,
}

impl TransferError {
    fn io(context: impl Into<String>, source: io::Error) -> Self {
        TransferError::Io {
            context: context.into(),
            source,
        }
    }
}

fn create_temp_dir(destination: &Path) -> Result<PathBuf, TransferError> {
    let dir = temp_dir_for(destination);
    fs::create_dir_all(&dir).map_err(|e| TransferError::io(format!("create {}", dir.display()), e))?;
    Ok(dir)
}

/// Everything a transfer needs besides the URL and destination.
pub struct Transfer<'a> {
    pub client: &'a dyn HttpClient,
    pub policy: RetryPolicy,
    pub reporter: &'a Reporter,
    pub cancel: &'a CancelToken,
    /// ETag or Last-Modified of the resource; part files written under a
    /// different validator are discarded.
    pub validator: Option<&'a str>,
}

impl Transfer<'_> {
    /// Picks a strategy with [`choose_strategy`] and runs it. Returns the
    /// number of bytes in the finished destination.
    pub fn run(
        &self,
        url: &str,
        destination: &Path,
        size: Option<u64>,
        accept_ranges: bool,
        connections: usize,
        min_chunk_size: u64,
    ) -> Result<u64, TransferError> {
        let strategy = choose_strategy(size, accept_ranges, connections, min_chunk_size);
        tracing::debug!(job = %self.reporter.job(), ?strategy, ?size, accept_ranges, "transfer strategy");
        match (strategy, size) {
            (TransferStrategy::Chunked { connections }, Some(size)) => self.chunked(url, destination, size, connections),
            _ => self.single(url, destination, size, accept_ranges),
        }
    }

    /// Single stream: one resumable chunk when ranges work and the size is
    /// known, else a plain GET.
    pub fn single(
        &self,
        url: &str,
        destination: &Path,
        size: Option<u64>,
        accept_ranges: bool,
    ) -> Result<u64, TransferError> {
        match size {
            Some(size) if size > 0 && accept_ranges => self.chunked(url, destination, size, 1),
            _ => self.stream(url, destination, size),
        }
    }

    /// Fetches `size` bytes as `connections` parallel chunks and assembles them.
    pub fn chunked(&self, url: &str, destination: &Path, size: u64, connections: usize) -> Result<u64, TransferError> {
        let chunks = plan_chunks(size, connections);
        if chunks.is_empty() {
            return Err(TransferError::InvalidPlan { size, connections });
        }
        let total = chunks.len();
        self.prepare_parts(destination, size, total)?;
        tracing::info!(
            job = %self.reporter.job(),
            path = %destination.display(),
            size,
            chunks = total,
            "starting chunked transfer"
        );

        let completed: Mutex<Vec<PathBuf>> = Mutex::new(Vec::with_capacity(total));
        let outcomes: Vec<(usize, thread::Result<Result<(), FetchError>>)> = thread::scope(|s| {
            let handles: Vec<_> = chunks
                .into_iter()
                .map(|mut chunk| {
                    let index = chunk.index;
                    let worker = ChunkWorker {
                        client: self.client,
                        url,
                        part_path: part_path(destination, index),
                        policy: self.policy,
                        reporter: self.reporter.clone(),
                        cancel: self.cancel,
                    };
                    let completed = &completed;
                    let handle = s.spawn(move || {
                        let result = worker.run(&mut chunk);
                        if chunk.completed {
                            completed
                                .lock()
                                .unwrap_or_else(PoisonError::into_inner)
                                .push(worker.part_path.clone());
                        }
                        result
                    });
                    (index, handle)
                })
                .collect();
            handles.into_iter().map(|(index, h)| (index, h.join())).collect()
        });

        let mut failed = Vec::new();
        let mut last_error = String::new();
        for (index, outcome) in outcomes {
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failed.push(index);
                    last_error = e.to_string();
                }
                Err(_) => {
                    failed.push(index);
                    last_error = "chunk thread panicked".to_string();
                }
            }
        }
        if !failed.is_empty() {
            if self.cancel.is_cancelled() {
                return Err(TransferError::Cancelled);
            }
            return Err(TransferError::IncompleteChunks {
                failed,
                total,
                last_error,
            });
        }

        let parts = completed.into_inner().unwrap_or_else(PoisonError::into_inner);
        let bytes = assemble(&parts, destination, size)?;
        let _ = fs::remove_file(manifest_path(destination));
        remove_dir_if_empty(&temp_dir_for(destination));
        tracing::info!(job = %self.reporter.job(), path = %destination.display(), bytes, "transfer complete");
        Ok(bytes)
    }

    /// Makes the temp dir hold only parts that belong to this plan: parts
    /// from another size, chunk count or remote version are discarded, and
    /// indices past the last chunk are removed.
    fn prepare_parts(&self, destination: &Path, size: u64, chunks: usize) -> Result<(), TransferError> {
        let manifest = PartManifest {
            size,
            chunks,
            validator: self.validator.map(str::to_string),
        };
        let stored = PartManifest::load(destination);
        if stored.as_ref() != Some(&manifest) {
            let removed = clean_temp_files(destination).map_err(|e| TransferError::io("discard stale parts", e))?;
            if removed > 0 {
                tracing::info!(
                    job = %self.reporter.job(),
                    path = %destination.display(),
                    removed,
                    ?stored,
                    "part files belong to another plan, starting over"
                );
            }
        }
        create_temp_dir(destination)?;
        manifest
            .store(destination)
            .map_err(|e| TransferError::io(format!("write {}", manifest_path(destination).display()), e))?;
        remove_parts_from(destination, chunks).map_err(|e| TransferError::io("remove surplus parts", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{stream_part_path, TEMP_DIR_NAME};
    use crate::job::JobId;
    use crate::progress::ProgressEvent;
    use std::sync::mpsc::Receiver;
    use super::testing::{FakeClient, Failure};

    fn progress_sum(rx: &Receiver<ProgressEvent>) -> i64 {
        rx.try_iter()
            .map(|e| match e {
                ProgressEvent::Bytes { delta, .. } => delta,
                _ => 0,
            })
            .sum()
    }

    fn transfer<'a>(client: &'a FakeClient, reporter: &'a Reporter, cancel: &'a CancelToken) -> Transfer<'a> {
        Transfer {
            client,
            policy: RetryPolicy::immediate(5),
            reporter,
            cancel,
            validator: None,
        }
    }

    fn store_manifest(dest: &Path, size: u64, chunks: usize) {
        PartManifest {
            size,
            chunks,
            validator: None,
        }
        .store(dest)
        .unwrap();
    }

    fn temp_dir_is_gone(dest: &Path) -> bool {
        !temp_dir_for(dest).exists()
    }

    #[test]
    fn ten_mib_with_a_flaky_chunk() {
        const SIZE: usize = 10_485_760;
        let client = FakeClient::with_len(SIZE);
        // Chunk 2 is [5242880, 7864319].
        client.fail_range(7_864_319, Failure::Refuse, 2);
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("big.iso");
        let (reporter, rx) = Reporter::channel(JobId(1));
        let cancel = CancelToken::new();

        let bytes = transfer(&client, &reporter, &cancel)
            .run("http://fake/big.iso", &dest, Some(SIZE as u64), true, 4, 1024)
            .unwrap();

        assert_eq!(bytes, SIZE as u64);
        assert_eq!(fs::metadata(&dest).unwrap().len(), SIZE as u64);
        assert!(fs::read(&dest).unwrap() == client.data);
        assert_eq!(client.requests_ending_at(7_864_319), 3);
        assert_eq!(client.requests_ending_at(2_621_439), 1);
        assert_eq!(progress_sum(&rx), SIZE as i64);
        assert!(!dir.path().join(TEMP_DIR_NAME).exists());
    }

    #[test]
    fn failed_chunk_fails_transfer_and_keeps_parts() {
        let client = FakeClient::with_len(4000);
        client.fail_range(1999, Failure::Refuse, u32::MAX);
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("f.bin");
        let (reporter, _rx) = Reporter::channel(JobId(1));
        let cancel = CancelToken::new();

        let err = transfer(&client, &reporter, &cancel)
            .chunked("http://fake/f.bin", &dest, 4000, 4)
            .unwrap_err();

        match err {
            TransferError::IncompleteChunks { failed, total, .. } => {
                assert_eq!(failed, vec![1]);
                assert_eq!(total, 4);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(client.requests_ending_at(1999), 5);
        assert!(!dest.exists());
        for i in [0, 2, 3] {
            assert_eq!(fs::metadata(part_path(&dest, i)).unwrap().len(), 1000);
        }
    }

    #[test]
    fn rerun_after_failure_only_fetches_missing_chunk() {
        let client = FakeClient::with_len(4000);
        client.fail_range(1999, Failure::Refuse, 5);
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("f.bin");
        let (reporter, _rx) = Reporter::channel(JobId(1));
        let cancel = CancelToken::new();
        let t = transfer(&client, &reporter, &cancel);

        assert!(t.chunked("http://fake/f.bin", &dest, 4000, 4).is_err());
        let before = client.range_requests().len();
        t.chunked("http://fake/f.bin", &dest, 4000, 4).unwrap();

        assert_eq!(client.range_requests()[before..], [(1000, 1999)]);
        assert!(fs::read(&dest).unwrap() == client.data);
    }

    #[test]
    fn complete_parts_assemble_without_requests() {
        let client = FakeClient::with_len(3000);
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("f.bin");
        fs::create_dir_all(temp_dir_for(&dest)).unwrap();
        for i in 0..3 {
            fs::write(part_path(&dest, i), &client.data[i * 1000..(i + 1) * 1000]).unwrap();
        }
        store_manifest(&dest, 3000, 3);
        let (reporter, rx) = Reporter::channel(JobId(1));
        let cancel = CancelToken::new();

        transfer(&client, &reporter, &cancel)
            .chunked("http://fake/f.bin", &dest, 3000, 3)
            .unwrap();

        assert_eq!(client.body_requests(), 0);
        assert_eq!(progress_sum(&rx), 3000);
        assert!(fs::read(&dest).unwrap() == client.data);
        assert!(temp_dir_is_gone(&dest));
    }

    #[test]
    fn rerun_with_fewer_connections_discards_old_parts() {
        let client = FakeClient::with_len(4000);
        client.fail_range(1999, Failure::Truncate, 5);
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("f.bin");
        let (reporter, _rx) = Reporter::channel(JobId(1));
        let cancel = CancelToken::new();
        let t = transfer(&client, &reporter, &cancel);

        assert!(t.chunked("http://fake/f.bin", &dest, 4000, 4).is_err());
        assert!(part_path(&dest, 3).exists());
        let before = client.range_requests().len();
        t.chunked("http://fake/f.bin", &dest, 4000, 2).unwrap();

        let mut rerun = client.range_requests()[before..].to_vec();
        rerun.sort();
        assert_eq!(rerun, [(0, 1999), (2000, 3999)]);
        assert!(fs::read(&dest).unwrap() == client.data);
        assert!(temp_dir_is_gone(&dest));
    }

    #[test]
    fn changed_validator_discards_parts() {
        let client = FakeClient::with_len(2000);
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("f.bin");
        fs::create_dir_all(temp_dir_for(&dest)).unwrap();
        // Same length, different content: an older version of the file.
        fs::write(part_path(&dest, 0), vec![b'x'; 1000]).unwrap();
        PartManifest {
            size: 2000,
            chunks: 2,
            validator: Some("v1".to_string()),
        }
        .store(&dest)
        .unwrap();
        let (reporter, _rx) = Reporter::channel(JobId(1));
        let cancel = CancelToken::new();
        let t = Transfer {
            validator: Some("v2"),
            ..transfer(&client, &reporter, &cancel)
        };

        t.chunked("http://fake/f.bin", &dest, 2000, 2).unwrap();

        assert_eq!(client.requests_ending_at(999), 1);
        assert!(fs::read(&dest).unwrap() == client.data);
    }

    #[test]
    fn surplus_part_indices_are_removed() {
        let client = FakeClient::with_len(2000);
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("f.bin");
        fs::create_dir_all(temp_dir_for(&dest)).unwrap();
        fs::write(part_path(&dest, 5), b"left over").unwrap();
        store_manifest(&dest, 2000, 2);
        let (reporter, _rx) = Reporter::channel(JobId(1));
        let cancel = CancelToken::new();

        transfer(&client, &reporter, &cancel)
            .chunked("http://fake/f.bin", &dest, 2000, 2)
            .unwrap();

        assert!(fs::read(&dest).unwrap() == client.data);
        assert!(!part_path(&dest, 5).exists());
        assert!(temp_dir_is_gone(&dest));
    }

    #[test]
    fn single_stream_with_ranges_uses_one_chunk() {
        let client = FakeClient::with_len(5000);
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("f.bin");
        let (reporter, _rx) = Reporter::channel(JobId(1));
        let cancel = CancelToken::new();

        transfer(&client, &reporter, &cancel)
            .run("http://fake/f.bin", &dest, Some(5000), true, 1, 1024)
            .unwrap();

        assert_eq!(client.range_requests(), vec![(0, 4999)]);
        assert_eq!(client.gets(), 0);
        assert!(fs::read(&dest).unwrap() == client.data);
    }

    #[test]
    fn plain_get_without_ranges() {
        let client = FakeClient::with_len(5000).without_ranges();
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("f.bin");
        let (reporter, rx) = Reporter::channel(JobId(1));
        let cancel = CancelToken::new();

        let bytes = transfer(&client, &reporter, &cancel)
            .run("http://fake/f.bin", &dest, Some(5000), false, 8, 1)
            .unwrap();

        assert_eq!(bytes, 5000);
        assert_eq!(client.gets(), 1);
        assert!(client.range_requests().is_empty());
        assert!(fs::read(&dest).unwrap() == client.data);
        assert!(!stream_part_path(&dest).exists());
        assert_eq!(progress_sum(&rx), 5000);
    }

    #[test]
    fn plain_get_restarts_after_truncation() {
        let client = FakeClient::with_len(5000).without_ranges();
        client.fail_range(4999, Failure::Truncate, 1);
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("f.bin");
        let (reporter, rx) = Reporter::channel(JobId(1));
        let cancel = CancelToken::new();

        transfer(&client, &reporter, &cancel)
            .single("http://fake/f.bin", &dest, Some(5000), false)
            .unwrap();

        assert_eq!(client.gets(), 2);
        assert!(fs::read(&dest).unwrap() == client.data);
        assert_eq!(progress_sum(&rx), 5000);
    }

    #[test]
    fn plain_get_with_unknown_size_trusts_body() {
        let client = FakeClient::with_len(700).without_ranges();
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("f.bin");
        let (reporter, _rx) = Reporter::channel(JobId(1));
        let cancel = CancelToken::new();

        let bytes = transfer(&client, &reporter, &cancel)
            .run("http://fake/f.bin", &dest, None, false, 4, 1)
            .unwrap();
        assert_eq!(bytes, 700);
    }

    #[test]
    fn cancelled_transfer_reports_cancellation() {
        let client = FakeClient::with_len(4000);
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("f.bin");
        let (reporter, _rx) = Reporter::channel(JobId(1));
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = transfer(&client, &reporter, &cancel)
            .chunked("http://fake/f.bin", &dest, 4000, 4)
            .unwrap_err();
        assert!(matches!(err, TransferError::Cancelled));
        assert_eq!(client.body_requests(), 0);
    }

    #[test]
    fn degenerate_plan_is_rejected() {
        let client = FakeClient::with_len(3);
        let dir = tempfile::tempdir().unwrap();
        let (reporter, _rx) = Reporter::channel(JobId(1));
        let cancel = CancelToken::new();
        let err = transfer(&client, &reporter, &cancel)
            .chunked("http://fake/x", &dir.path().join("x"), 3, 4)
            .unwrap_err();
        assert!(matches!(err, TransferError::InvalidPlan { size: 3, connections: 4 }));
    }
}
