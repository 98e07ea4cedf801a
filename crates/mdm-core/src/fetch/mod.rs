//! HTTP access: metadata probe, range GETs and plain GETs.
//!
//! Everything that touches the network goes through [`HttpClient`]; the
//! production implementation is [`CurlClient`] (libcurl via the `curl`
//! crate). Engine tests substitute an in-memory client.

mod curl_client;
mod error;
mod parse;

pub use curl_client::CurlClient;
pub use error::FetchError;

use std::io::Write;

/// Remote resource metadata needed to plan a transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeResult {
    /// Total size in bytes, if the server reported it.
    pub content_length: Option<u64>,
    /// True if the server supports `Range: bytes=` requests.
    pub accept_ranges: bool,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    /// `Content-Disposition` value if present (filename hint).
    pub content_disposition: Option<String>,
}

impl ProbeResult {
    /// Identifies the remote version: the ETag, else Last-Modified.
    pub fn validator(&self) -> Option<&str> {
        self.etag.as_deref().or(self.last_modified.as_deref())
    }
}

/// Blocking HTTP operations used by downloaders and chunk workers.
///
/// Implementations must be shareable across chunk threads.
pub trait HttpClient: Send + Sync {
    /// Fetch size, range support and filename hints for `url`.
    fn probe(&self, url: &str) -> anyhow::Result<ProbeResult>;

    /// GET `bytes=start-end` (inclusive) and stream the body into `body`.
    ///
    /// Fails unless the response is `206 Partial Content` with a
    /// `Content-Range` naming exactly the requested bytes; nothing is
    /// written to `body` in that case.
    fn get_range(&self, url: &str, start: u64, end: u64, body: &mut dyn Write) -> Result<(), FetchError>;

    /// Plain GET streaming the whole body into `body`. Returns the declared
    /// `Content-Length`, if any.
    fn get(&self, url: &str, body: &mut dyn Write) -> Result<Option<u64>, FetchError>;
}
