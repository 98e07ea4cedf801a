//! libcurl-backed [`HttpClient`].

use anyhow::{Context, Result};
use std::cell::RefCell;
use std::io::{self, Write};
use std::str;
use std::time::Duration;

use crate::config::HttpConfig;

use super::error::FetchError;
use super::parse::{check_range_response, parse_content_range, parse_headers, parse_http_status};
use super::{HttpClient, ProbeResult};

const DEFAULT_USER_AGENT: &str = concat!("mdm/", env!("CARGO_PKG_VERSION"));

/// HTTP client configured once from [`HttpConfig`] and shared by every job.
#[derive(Debug, Clone)]
pub struct CurlClient {
    config: HttpConfig,
    /// Receive buffer handed to libcurl; one progress event per filled buffer.
    buffer_size: Option<usize>,
}

fn collect_header(headers: &RefCell<Vec<String>>, data: &[u8]) {
    if let Ok(s) = str::from_utf8(data) {
        let line = s.trim_end();
        let mut headers = headers.borrow_mut();
        if line.starts_with("HTTP/") {
            headers.clear();
        }
        if !line.is_empty() {
            headers.push(line.to_string());
        }
    }
}

fn status_ok(lines: &[String]) -> Result<(), FetchError> {
    match parse_http_status(lines) {
        Some(code) if (200..300).contains(&code) => Ok(()),
        Some(code) => Err(FetchError::Status(code)),
        None => Err(FetchError::Status(0)),
    }
}

impl CurlClient {
    pub fn new(config: HttpConfig) -> Self {
        Self {
            config,
            buffer_size: None,
        }
    }

    pub fn with_buffer_size(mut self, bytes: usize) -> Self {
        self.buffer_size = Some(bytes);
        self
    }

    /// A handle with redirects, timeouts, proxy and buffer size applied.
    fn easy(&self, url: &str) -> Result<curl::easy::Easy, curl::Error> {
        let mut easy = curl::easy::Easy::new();
        easy.url(url)?;
        easy.follow_location(true)?;
        easy.max_redirections(10)?;
        easy.connect_timeout(Duration::from_secs(self.config.connect_timeout_secs))?;
        // Prefer a low-speed timeout over a short hard timeout so large chunks on slow links survive.
        easy.low_speed_limit(1024)?;
        easy.low_speed_time(Duration::from_secs(self.config.low_speed_time_secs))?;
        easy.timeout(Duration::from_secs(self.config.timeout_secs))?;
        if let Some(proxy) = &self.config.proxy {
            easy.proxy(proxy)?;
        }
        easy.useragent(self.config.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT))?;
        if let Some(size) = self.buffer_size {
            easy.buffer_size(size)?;
        }
        Ok(easy)
    }

    /// Performs a request, discarding the body, and returns the header lines
    /// of the final response.
    fn headers_only(&self, mut easy: curl::easy::Easy) -> Result<Vec<String>> {
        let headers = RefCell::new(Vec::new());
        {
            let mut transfer = easy.transfer();
            transfer.header_function(|data| {
                collect_header(&headers, data);
                true
            })?;
            transfer.write_function(|data| Ok(data.len()))?;
            transfer.perform()?;
        }
        Ok(headers.into_inner())
    }

    fn probe_head(&self, url: &str) -> Result<ProbeResult> {
        let mut easy = self.easy(url).context("invalid URL")?;
        easy.nobody(true)?;
        let lines = self.headers_only(easy).context("HEAD request failed")?;
        status_ok(&lines).with_context(|| format!("HEAD {}", url))?;
        Ok(parse_headers(&lines))
    }

    /// Fallback for servers that refuse HEAD: GET the first byte and read the
    /// total size from `Content-Range`.
    fn probe_range(&self, url: &str) -> Result<ProbeResult> {
        let mut easy = self.easy(url).context("invalid URL")?;
        easy.range("0-0")?;
        let lines = self.headers_only(easy).context("range probe failed")?;
        status_ok(&lines).with_context(|| format!("GET {}", url))?;
        let mut result = parse_headers(&lines);
        if parse_http_status(&lines) == Some(206) {
            let total = lines.iter().find_map(|l| {
                let (name, value) = l.split_once(':')?;
                if !name.trim().eq_ignore_ascii_case("content-range") {
                    return None;
                }
                parse_content_range(value).and_then(|(_, _, total)| total)
            });
            result.content_length = total;
            result.accept_ranges = total.is_some();
        } else {
            result.accept_ranges = false;
        }
        Ok(result)
    }
}

impl HttpClient for CurlClient {
    fn probe(&self, url: &str) -> Result<ProbeResult> {
        match self.probe_head(url) {
            Ok(result) => Ok(result),
            Err(e) => {
                tracing::debug!(url, "HEAD probe failed ({:#}), trying range GET", e);
                self.probe_range(url)
            }
        }
    }

    fn get_range(&self, url: &str, start: u64, end: u64, body: &mut dyn Write) -> Result<(), FetchError> {
        let mut easy = self.easy(url)?;
        // curl takes "start-end" (inclusive), not "bytes=start-end".
        easy.range(&format!("{}-{}", start, end))?;

        let headers = RefCell::new(Vec::new());
        let verdict: RefCell<Option<Result<(), FetchError>>> = RefCell::new(None);
        let write_error: RefCell<Option<io::Error>> = RefCell::new(None);
        let performed = {
            let mut transfer = easy.transfer();
            transfer.header_function(|data| {
                collect_header(&headers, data);
                true
            })?;
            transfer.write_function(|data| {
                let mut verdict = verdict.borrow_mut();
                let checked = verdict.get_or_insert_with(|| check_range_response(&headers.borrow(), start, end));
                if checked.is_err() {
                    // Returning a short count aborts the transfer before any byte lands on disk.
                    return Ok(0);
                }
                match body.write_all(data) {
                    Ok(()) => Ok(data.len()),
                    Err(e) => {
                        *write_error.borrow_mut() = Some(e);
                        Ok(0)
                    }
                }
            })?;
            transfer.perform()
        };

        if let Some(Err(e)) = verdict.into_inner() {
            return Err(e);
        }
        if let Some(e) = write_error.into_inner() {
            return Err(FetchError::Storage(e));
        }
        performed?;
        // An empty body never reaches the write callback.
        let lines = headers.into_inner();
        check_range_response(&lines, start, end)
    }

    fn get(&self, url: &str, body: &mut dyn Write) -> Result<Option<u64>, FetchError> {
        let mut easy = self.easy(url)?;

        let headers = RefCell::new(Vec::new());
        let verdict: RefCell<Option<Result<(), FetchError>>> = RefCell::new(None);
        let write_error: RefCell<Option<io::Error>> = RefCell::new(None);
        let performed = {
            let mut transfer = easy.transfer();
            transfer.header_function(|data| {
                collect_header(&headers, data);
                true
            })?;
            transfer.write_function(|data| {
                let mut verdict = verdict.borrow_mut();
                if verdict.get_or_insert_with(|| status_ok(&headers.borrow())).is_err() {
                    return Ok(0);
                }
                match body.write_all(data) {
                    Ok(()) => Ok(data.len()),
                    Err(e) => {
                        *write_error.borrow_mut() = Some(e);
                        Ok(0)
                    }
                }
            })?;
            transfer.perform()
        };

        if let Some(Err(e)) = verdict.into_inner() {
            return Err(e);
        }
        if let Some(e) = write_error.into_inner() {
            return Err(FetchError::Storage(e));
        }
        performed?;
        let lines = headers.into_inner();
        status_ok(&lines)?;
        Ok(parse_headers(&lines).content_length)
    }
}
