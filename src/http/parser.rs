//! Incremental HTTP/1.1 request parsing.
//!
//! A single TCP read rarely delivers a whole request, so the parser keeps its
//! progress between invocations: a parsed request line or header block is
//! never re-parsed, and body bytes accumulate across reads until
//! `Content-Length` is satisfied.

use std::collections::HashMap;
use std::mem;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::BytesMut;

use crate::http::request::Request;

/// Fixed caps for the request-line tokens. Longer tokens are truncated.
const MAX_METHOD_LEN: usize = 64;
const MAX_URI_LEN: usize = 128;
const MAX_PROTOCOL_LEN: usize = 64;

/// Outcome of one parse step.
#[derive(Debug)]
pub enum ParseStatus {
    /// A full request was parsed and consumed from the input buffer.
    Complete(Request),
    /// Not enough buffered data; call again after the next read.
    Incomplete,
    /// The request is malformed; respond with this status and close.
    /// 400 for a bad request line, 411 for a missing `Content-Length`.
    Failed(u16),
}

/// Resumable parser for a single request.
///
/// One parser instance lives for one request cycle; the connection creates a
/// fresh one when the next request begins.
#[derive(Debug)]
pub struct RequestParser {
    method: String,
    uri: String,
    protocol: String,
    headers: HashMap<String, String>,
    parsed_request_line: bool,
    parsed_headers: bool,
    body: Option<BytesMut>,
    body_length: usize,
    timestamp_ms: u64,
}

impl RequestParser {
    pub fn new() -> Self {
        Self {
            method: String::new(),
            uri: String::new(),
            protocol: String::new(),
            headers: HashMap::new(),
            parsed_request_line: false,
            parsed_headers: false,
            body: None,
            body_length: 0,
            timestamp_ms: now_ms(),
        }
    }

    /// Consumes as much of `input` as possible, resuming from prior state.
    pub fn parse(&mut self, input: &mut BytesMut) -> ParseStatus {
        if !self.parsed_request_line {
            let Some(line) = read_line(input) else {
                return ParseStatus::Incomplete;
            };

            let tokens: Vec<&str> = line.split_ascii_whitespace().collect();
            if tokens.len() != 3 {
                return ParseStatus::Failed(400);
            }

            self.method = capped(tokens[0], MAX_METHOD_LEN);
            self.uri = capped(tokens[1], MAX_URI_LEN);
            self.protocol = capped(tokens[2], MAX_PROTOCOL_LEN);
            self.parsed_request_line = true;
        }

        if !self.parsed_headers {
            // All-or-nothing: the blank-line terminator must already be
            // buffered, so a partial header set is never parsed twice.
            if !header_block_complete(input) {
                return ParseStatus::Incomplete;
            }

            loop {
                let Some(line) = read_line(input) else {
                    return ParseStatus::Incomplete;
                };
                if line.is_empty() {
                    break;
                }
                // A line without the separator ends the header block.
                let Some((name, value)) = line.split_once(": ") else {
                    break;
                };
                self.headers
                    .insert(name.to_ascii_lowercase(), value.to_ascii_lowercase());
            }

            self.parsed_headers = true;
        }

        // A body is required for PUT and POST requests.
        if self.method.starts_with('P') {
            if self.body.is_none() {
                let Some(length) = self.headers.get("content-length") else {
                    return ParseStatus::Failed(411);
                };
                self.body_length = length.trim().parse().unwrap_or(0);
                self.body = Some(BytesMut::with_capacity(self.body_length));
            }

            if let Some(body) = self.body.as_mut() {
                let needed = self.body_length - body.len();
                let take = needed.min(input.len());
                body.extend_from_slice(&input.split_to(take));

                if body.len() < self.body_length {
                    return ParseStatus::Incomplete;
                }
            }
        }

        ParseStatus::Complete(Request::new(
            mem::take(&mut self.method),
            mem::take(&mut self.uri),
            mem::take(&mut self.protocol),
            mem::take(&mut self.headers),
            self.body.take().map(BytesMut::freeze),
            self.timestamp_ms,
        ))
    }
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Extracts the next CRLF-terminated line, or `None` if no line is complete.
/// A bare LF terminator is tolerated, like the original line reader.
fn read_line(input: &mut BytesMut) -> Option<String> {
    let pos = input.iter().position(|&b| b == b'\n')?;
    let line = input.split_to(pos + 1);

    let mut end = line.len() - 1;
    if end > 0 && line[end - 1] == b'\r' {
        end -= 1;
    }

    Some(String::from_utf8_lossy(&line[..end]).into_owned())
}

/// True once the header block's blank-line terminator is buffered. An
/// immediate CRLF means an empty header block.
fn header_block_complete(input: &[u8]) -> bool {
    input.starts_with(b"\r\n") || input.windows(4).any(|w| w == b"\r\n\r\n")
}

/// Truncates a token to `cap` bytes without splitting a character.
fn capped(token: &str, cap: usize) -> String {
    if token.len() <= cap {
        return token.to_owned();
    }
    let mut end = cap;
    while !token.is_char_boundary(end) {
        end -= 1;
    }
    token[..end].to_owned()
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_get() {
        let mut input = BytesMut::from(&b"GET /x HTTP/1.1\r\nHost: a\r\n\r\n"[..]);
        let mut parser = RequestParser::new();

        match parser.parse(&mut input) {
            ParseStatus::Complete(request) => {
                assert_eq!(request.method(), "GET");
                assert_eq!(request.uri(), "/x");
                assert_eq!(request.protocol(), "HTTP/1.1");
                assert_eq!(request.header("Host"), Some("a"));
                assert!(request.body().is_none());
            }
            other => panic!("expected complete request, got {other:?}"),
        }
        assert!(input.is_empty());
    }

    #[test]
    fn consumed_bytes_stop_at_request_boundary() {
        let mut input =
            BytesMut::from(&b"GET /a HTTP/1.1\r\nHost: a\r\n\r\nGET /b HTTP/1.1\r\n"[..]);
        let mut parser = RequestParser::new();

        assert!(matches!(
            parser.parse(&mut input),
            ParseStatus::Complete(_)
        ));
        assert_eq!(&input[..], b"GET /b HTTP/1.1\r\n");
    }
}
