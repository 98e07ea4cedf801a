//! Parse HTTP response header lines.

use super::error::FetchError;
use super::ProbeResult;

/// Status code from the last `HTTP/x y` line (redirect hops start new blocks).
pub(crate) fn parse_http_status(lines: &[String]) -> Option<u32> {
    lines
        .iter()
        .rev()
        .find(|l| l.starts_with("HTTP/"))
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|code| code.parse().ok())
}

fn header_value<'a>(lines: &'a [String], wanted: &str) -> Option<&'a str> {
    lines.iter().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.trim()
            .eq_ignore_ascii_case(wanted)
            .then(|| value.trim())
    })
}

/// Parses `Content-Range: bytes START-END/TOTAL` into `(start, end, total)`.
/// `TOTAL` may be `*` (unknown).
pub(crate) fn parse_content_range(value: &str) -> Option<(u64, u64, Option<u64>)> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (range, total) = rest.split_once('/')?;
    let (start, end) = range.trim().split_once('-')?;
    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse().ok()?),
    };
    Some((start.trim().parse().ok()?, end.trim().parse().ok()?, total))
}

/// Accepts a response to `Range: bytes=start-end` only if it is a 206 whose
/// `Content-Range` names exactly that range.
pub(crate) fn check_range_response(lines: &[String], start: u64, end: u64) -> Result<(), FetchError> {
    match parse_http_status(lines) {
        Some(206) => {}
        Some(code) => return Err(FetchError::Status(code)),
        None => return Err(FetchError::Status(0)),
    }
    let raw = header_value(lines, "content-range").ok_or(FetchError::MissingContentRange)?;
    match parse_content_range(raw) {
        Some((s, e, _)) if s == start && e == end => Ok(()),
        _ => Err(FetchError::RangeMismatch {
            start,
            end,
            got: raw.to_string(),
        }),
    }
}

/// Collected header lines into probe metadata.
pub(crate) fn parse_headers(lines: &[String]) -> ProbeResult {
    let mut result = ProbeResult::default();

    for line in lines {
        let line = line.trim();
        if line.starts_with("HTTP/") {
            // New response block (redirect hop): forget the previous one.
            result = ProbeResult::default();
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            result.content_length = value.parse::<u64>().ok();
        } else if name.eq_ignore_ascii_case("accept-ranges") {
            result.accept_ranges = value.eq_ignore_ascii_case("bytes");
        } else if name.eq_ignore_ascii_case("etag") {
            result.etag = Some(value.trim_matches('"').to_string());
        } else if name.eq_ignore_ascii_case("last-modified") {
            result.last_modified = Some(value.to_string());
        } else if name.eq_ignore_ascii_case("content-disposition") {
            result.content_disposition = Some(value.to_string());
        }
    }

    result
}
