use std::collections::HashMap;

use bytes::Bytes;

/// A parsed HTTP request.
///
/// Built incrementally by [`RequestParser`](crate::http::parser::RequestParser);
/// at most one request per connection is in flight at a time. Header names and
/// values are normalized to lower-case during parsing, and duplicate header
/// names overwrite earlier ones.
#[derive(Debug, Clone)]
pub struct Request {
    method: String,
    uri: String,
    protocol: String,
    headers: HashMap<String, String>,
    body: Option<Bytes>,
    timestamp_ms: u64,
}

impl Request {
    pub(crate) fn new(
        method: String,
        uri: String,
        protocol: String,
        headers: HashMap<String, String>,
        body: Option<Bytes>,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            method,
            uri,
            protocol,
            headers,
            body,
            timestamp_ms,
        }
    }

    /// The HTTP method, e.g. "GET".
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The request URI, e.g. "/index.html".
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The protocol token from the request line, e.g. "HTTP/1.1".
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Looks up a header value. The name is matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// All request headers, lower-cased.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// The request body, present only for methods that carry one.
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Arrival timestamp in milliseconds since the Unix epoch, taken when
    /// parsing of this request began.
    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }
}
