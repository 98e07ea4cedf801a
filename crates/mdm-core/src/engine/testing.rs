//! In-memory [`HttpClient`] for engine and downloader tests.

use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::fetch::{FetchError, HttpClient, ProbeResult};

/// What an injected failure looks like on the wire.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Failure {
    /// 503 before any body byte.
    Refuse,
    /// Half of the requested bytes, then the connection drops.
    Truncate,
    /// The requested bytes followed by bytes nobody asked for.
    Overflow,
}

/// Serves `data` from memory. Failures are keyed by the last byte of the
/// requested range, which stays the same across retries of a chunk.
pub(crate) struct FakeClient {
    pub data: Vec<u8>,
    pub accept_ranges: bool,
    pub content_disposition: Option<String>,
    failures: Mutex<HashMap<u64, (Failure, u32)>>,
    range_requests: Mutex<Vec<(u64, u64)>>,
    gets: AtomicUsize,
    probes: AtomicUsize,
}

impl FakeClient {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            accept_ranges: true,
            content_disposition: None,
            failures: Mutex::new(HashMap::new()),
            range_requests: Mutex::new(Vec::new()),
            gets: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
        }
    }

    /// Deterministic, non-repeating-looking payload of `len` bytes.
    pub fn with_len(len: usize) -> Self {
        Self::new((0..len).map(|i| (i * 31 % 251) as u8).collect())
    }

    pub fn without_ranges(mut self) -> Self {
        self.accept_ranges = false;
        self
    }

    /// Fail the next `times` requests whose range ends at `end`.
    pub fn fail_range(&self, end: u64, failure: Failure, times: u32) {
        self.failures.lock().unwrap().insert(end, (failure, times));
    }

    pub fn range_requests(&self) -> Vec<(u64, u64)> {
        self.range_requests.lock().unwrap().clone()
    }

    pub fn requests_ending_at(&self, end: u64) -> usize {
        self.range_requests().iter().filter(|(_, e)| *e == end).count()
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    /// Total body requests of either kind.
    pub fn body_requests(&self) -> usize {
        self.gets() + self.range_requests().len()
    }

    fn take_failure(&self, end: u64) -> Option<Failure> {
        let mut failures = self.failures.lock().unwrap();
        let (failure, left) = failures.get_mut(&end)?;
        if *left == 0 {
            return None;
        }
        *left -= 1;
        Some(*failure)
    }
}

fn send(body: &mut dyn Write, data: &[u8]) -> Result<(), FetchError> {
    for piece in data.chunks(16 * 1024) {
        body.write_all(piece).map_err(FetchError::Storage)?;
    }
    Ok(())
}

impl HttpClient for FakeClient {
    fn probe(&self, _url: &str) -> anyhow::Result<ProbeResult> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        Ok(ProbeResult {
            content_length: Some(self.data.len() as u64),
            accept_ranges: self.accept_ranges,
            content_disposition: self.content_disposition.clone(),
            ..ProbeResult::default()
        })
    }

    fn get_range(&self, _url: &str, start: u64, end: u64, body: &mut dyn Write) -> Result<(), FetchError> {
        self.range_requests.lock().unwrap().push((start, end));
        if !self.accept_ranges {
            return Err(FetchError::Status(200));
        }
        let len = self.data.len() as u64;
        if start > end || end >= len {
            return Err(FetchError::Status(416));
        }
        let slice = &self.data[start as usize..=end as usize];
        match self.take_failure(end) {
            None => send(body, slice),
            Some(Failure::Refuse) => Err(FetchError::Status(503)),
            Some(Failure::Truncate) => {
                let half = slice.len() / 2;
                send(body, &slice[..half])?;
                Err(FetchError::PartialTransfer {
                    expected: slice.len() as u64,
                    received: half as u64,
                })
            }
            Some(Failure::Overflow) => {
                send(body, slice)?;
                send(body, b"trailing garbage")
            }
        }
    }

    fn get(&self, _url: &str, body: &mut dyn Write) -> Result<Option<u64>, FetchError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let len = self.data.len() as u64;
        if let Some(failure) = self.take_failure(len.saturating_sub(1)) {
            return match failure {
                Failure::Refuse => Err(FetchError::Status(503)),
                Failure::Truncate | Failure::Overflow => {
                    send(body, &self.data[..self.data.len() / 2])?;
                    Err(FetchError::PartialTransfer {
                        expected: len,
                        received: len / 2,
                    })
                }
            };
        }
        send(body, &self.data)?;
        Ok(Some(len))
    }
}
