//! Error for one HTTP request attempt.

use thiserror::Error;

/// Failure of a single request attempt. Chunk workers retry on any of these
/// except `Cancelled`.
#[derive(Debug, Error)]
pub enum FetchError {
    /// libcurl reported an error (timeout, connection, TLS, etc.).
    #[error("{0}")]
    Curl(#[from] curl::Error),
    /// Status other than the one the request requires (206 for ranges, 2xx otherwise).
    #[error("unexpected HTTP status {0}")]
    Status(u32),
    /// 206 without `Content-Range`: the server may have ignored the range.
    #[error("response has no Content-Range header")]
    MissingContentRange,
    /// `Content-Range` names different bytes than requested.
    #[error("server sent range {got}, requested bytes {start}-{end}")]
    RangeMismatch { start: u64, end: u64, got: String },
    /// Body length differs from what was expected (server closed early, or sent too much).
    #[error("partial transfer: expected {expected} bytes, got {received}")]
    PartialTransfer { expected: u64, received: u64 },
    /// Writing the body to disk failed.
    #[error("storage: {0}")]
    Storage(#[source] std::io::Error),
    /// The transfer was stopped by a cancellation request.
    #[error("cancelled")]
    Cancelled,
}

impl FetchError {
    /// True when another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::Cancelled)
    }
}
