//! Local names for remote resources.
//!
//! The destination file name comes from `Content-Disposition` when the
//! server sends one, else from the last URL path segment, and is always
//! sanitized for Linux. Existing files are never clobbered: see
//! [`next_free_name`].

mod disposition;
mod sanitize;
mod unique;

pub use disposition::filename_from_disposition;
pub use sanitize::sanitize_filename;
pub use unique::{next_free_name, taken_numbered_names};

/// Used when neither the headers nor the URL yield a usable name.
pub const DEFAULT_FILENAME: &str = "download.bin";

/// Last non-empty path segment of `url`, percent-decoded.
pub fn filename_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    Some(disposition::percent_decode(segment))
}

/// File name to save `url` under, given the response's `Content-Disposition`.
pub fn derive_filename(url: &str, content_disposition: Option<&str>) -> String {
    content_disposition
        .and_then(filename_from_disposition)
        .and_then(|n| sanitize_filename(&n))
        .or_else(|| filename_from_url(url).and_then(|n| sanitize_filename(&n)))
        .unwrap_or_else(|| DEFAULT_FILENAME.to_string())
}

/// Directory name `git clone` would pick: the last path component of the
/// remote, without a trailing `.git`. Handles URLs and scp-style remotes
/// (`git@host:owner/repo.git`).
pub fn repo_dir_name(source: &str) -> Option<String> {
    let path = match url::Url::parse(source) {
        Ok(u) if u.has_host() || u.scheme() == "file" => u.path().to_string(),
        _ => source.rsplit_once(':').map_or(source, |(_, p)| p).to_string(),
    };
    let last = path.trim_end_matches('/').rsplit('/').next()?;
    let name = last.strip_suffix(".git").unwrap_or(last);
    sanitize_filename(name)
}
