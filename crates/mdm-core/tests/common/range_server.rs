//! Minimal HTTP/1.1 server that supports HEAD and Range GET for integration tests.
//!
//! Serves a single static body on every path. Responds to HEAD with
//! Content-Length and Accept-Ranges: bytes; responds to GET with Range with
//! 206 Partial Content. Every GET is logged so tests can assert on the
//! requests the client actually made.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RangeServerOptions {
    /// If false, HEAD returns 405 (simulates servers that block HEAD).
    pub head_allowed: bool,
    /// If false, GET ignores Range and always returns 200 with the full body.
    pub support_ranges: bool,
    /// Answer the first `n` range GETs starting at `offset` with 503.
    pub fail_range: Option<(u64, usize)>,
}

impl Default for RangeServerOptions {
    fn default() -> Self {
        Self {
            head_allowed: true,
            support_ranges: true,
            fail_range: None,
        }
    }
}

/// One GET as seen by the server: the requested range, if any.
pub type Request = Option<(u64, u64)>;

pub struct RangeServer {
    /// Base URL, e.g. "http://127.0.0.1:12345/".
    pub url: String,
    gets: Arc<Mutex<Vec<Request>>>,
}

impl RangeServer {
    pub fn file_url(&self, name: &str) -> String {
        format!("{}{}", self.url, name)
    }

    pub fn gets(&self) -> Vec<Request> {
        self.gets.lock().unwrap().clone()
    }
}

struct State {
    body: Vec<u8>,
    opts: RangeServerOptions,
    gets: Arc<Mutex<Vec<Request>>>,
    failures_left: Mutex<usize>,
}

/// Starts a server in a background thread serving `body`. The server runs
/// until the process exits.
pub fn start(body: Vec<u8>) -> RangeServer {
    start_with_options(body, RangeServerOptions::default())
}

/// Like `start` but allows customizing server behavior (HEAD blocked, ranges missing, etc.).
pub fn start_with_options(body: Vec<u8>, opts: RangeServerOptions) -> RangeServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let gets = Arc::new(Mutex::new(Vec::new()));
    let state = Arc::new(State {
        body,
        opts,
        gets: Arc::clone(&gets),
        failures_left: Mutex::new(opts.fail_range.map_or(0, |(_, n)| n)),
    });
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let state = Arc::clone(&state);
            thread::spawn(move || handle(stream, &state));
        }
    });
    RangeServer {
        url: format!("http://127.0.0.1:{}/", port),
        gets,
    }
}

fn respond(stream: &mut TcpStream, status: &str, headers: &[String], body: &[u8]) {
    let mut head = format!("HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n", status, body.len());
    for h in headers {
        head.push_str(h);
        head.push_str("\r\n");
    }
    head.push_str("\r\n");
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(body);
}

fn handle(mut stream: TcpStream, state: &State) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let Ok(request) = std::str::from_utf8(&buf[..n]) else {
        return;
    };
    let (method, range) = parse_request(request);
    let body = &state.body;
    let total = body.len() as u64;
    let accept_ranges = if state.opts.support_ranges {
        vec!["Accept-Ranges: bytes".to_string()]
    } else {
        Vec::new()
    };

    if method.eq_ignore_ascii_case("HEAD") {
        if !state.opts.head_allowed {
            respond(&mut stream, "405 Method Not Allowed", &[], b"");
            return;
        }
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n{}\r\n",
            total,
            accept_ranges.iter().map(|h| format!("{}\r\n", h)).collect::<String>()
        );
        let _ = stream.write_all(head.as_bytes());
        return;
    }
    if !method.eq_ignore_ascii_case("GET") {
        respond(&mut stream, "405 Method Not Allowed", &[], b"");
        return;
    }

    state.gets.lock().unwrap().push(range);
    let range = range.filter(|_| state.opts.support_ranges);
    if let (Some((start, _)), Some((fail_at, _))) = (range, state.opts.fail_range) {
        let mut left = state.failures_left.lock().unwrap();
        if start == fail_at && *left > 0 {
            *left -= 1;
            respond(&mut stream, "503 Service Unavailable", &[], b"");
            return;
        }
    }

    match range {
        Some((start, end_incl)) => {
            let end_incl = end_incl.min(total.saturating_sub(1));
            if start >= total || start > end_incl {
                respond(
                    &mut stream,
                    "416 Range Not Satisfiable",
                    &[format!("Content-Range: bytes */{}", total)],
                    b"",
                );
                return;
            }
            let slice = &body[start as usize..=end_incl as usize];
            let mut headers = accept_ranges;
            headers.push(format!("Content-Range: bytes {}-{}/{}", start, end_incl, total));
            respond(&mut stream, "206 Partial Content", &headers, slice);
        }
        None => respond(&mut stream, "200 OK", &accept_ranges, body),
    }
}

/// Method plus the `Range: bytes=a-b` header, if any. An open-ended range
/// ends at `u64::MAX`.
fn parse_request(request: &str) -> (&str, Option<(u64, u64)>) {
    let mut lines = request.split("\r\n");
    let method = lines
        .next()
        .and_then(|l| l.split_whitespace().next())
        .unwrap_or("");
    let range = lines
        .take_while(|l| !l.is_empty())
        .filter_map(|l| l.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("range"))
        .and_then(|(_, value)| value.trim().strip_prefix("bytes="))
        .and_then(|spec| spec.split_once('-'))
        .map(|(a, b)| {
            let start = a.trim().parse::<u64>().unwrap_or(0);
            let end = b.trim().parse::<u64>().unwrap_or(u64::MAX);
            (start, end)
        });
    (method, range)
}
