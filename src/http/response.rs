use crate::http::connection::{ConnCmd, ConnSender};

/// An HTTP response bound to one connection and one request.
///
/// The response holds no byte buffer of its own: every write goes straight to
/// the owning connection's output path, so large responses stream back without
/// blocking the reactor. The status line and a `Server` header are emitted
/// lazily on the first write, which means [`set_status`](Response::set_status)
/// only has an effect before any header or body is written.
///
/// Dropping the response finishes the request/response cycle on the
/// connection; a status of 400 or above forces the connection to close after
/// the response is flushed.
#[derive(Debug)]
pub struct Response {
    status: u16,
    initialized: bool,
    close: bool,
    sender: ConnSender,
}

impl Response {
    pub(crate) fn new(sender: ConnSender, status: u16) -> Self {
        Self {
            status,
            initialized: false,
            close: false,
            sender,
        }
    }

    /// The numeric status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Sets the status code. Ignored once the status line has been written.
    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    /// Writes a header line.
    pub fn add_header(&mut self, name: &str, value: &str) {
        self.init();
        self.send(format!("{name}: {value}\r\n").into_bytes());
    }

    /// Writes `Content-Length` and the body, completing the response.
    ///
    /// `None` sends an empty body with `Content-Length: 0`. Must be called
    /// exactly once per response; that is the embedder's contract.
    pub fn set_body(&mut self, body: Option<&[u8]>) {
        self.init();

        if self.status >= 400 {
            self.close = true;
        }

        match body {
            None => {
                self.add_header("Content-Length", "0");
                self.send(b"\r\n".to_vec());
            }
            Some(bytes) => {
                self.add_header("Content-Length", &bytes.len().to_string());
                self.send(b"\r\n".to_vec());
                self.send(bytes.to_vec());
            }
        }
    }

    fn init(&mut self) {
        if self.initialized {
            return;
        }
        self.initialized = true;

        self.send(format!("HTTP/1.1 {} {}\r\n", self.status, reason(self.status)).into_bytes());
        self.add_header(
            "Server",
            concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")),
        );
    }

    fn send(&self, bytes: Vec<u8>) {
        // The connection may already be gone; its output is simply discarded.
        let _ = self.sender.send(ConnCmd::Write(bytes.into()));
    }
}

impl Drop for Response {
    fn drop(&mut self) {
        let _ = self.sender.send(ConnCmd::Finish { close: self.close });
    }
}

/// The standard reason phrase for a status code, or "" if unknown.
pub fn reason(status: u16) -> &'static str {
    match status {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        203 => "Non-Authoritative Information",
        204 => "No Content",
        205 => "Reset Content",
        206 => "Partial Content",
        300 => "Multiple Choices",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        305 => "Use Proxy",
        307 => "Temporary Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        402 => "Payment Required",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        407 => "Proxy Authentication Required",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length Required",
        412 => "Precondition Failed",
        413 => "Request Entity Too Large",
        414 => "Request-URI Too Long",
        415 => "Unsupported Media Type",
        416 => "Requested Range Not Satisfiable",
        417 => "Expectation Failed",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn drain(rx: &mut mpsc::UnboundedReceiver<ConnCmd>) -> (Vec<u8>, Vec<bool>) {
        let mut bytes = Vec::new();
        let mut finishes = Vec::new();
        while let Ok(cmd) = rx.try_recv() {
            match cmd {
                ConnCmd::Write(chunk) => bytes.extend_from_slice(&chunk),
                ConnCmd::Finish { close } => finishes.push(close),
            }
        }
        (bytes, finishes)
    }

    #[test]
    fn not_found_wire_format() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut response = Response::new(tx, 200);
        response.set_status(404);
        response.set_body(None);
        drop(response);

        let (bytes, finishes) = drain(&mut rx);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains("Content-Length: 0\r\n\r\n"));
        assert_eq!(finishes, vec![true]);
    }

    #[test]
    fn ok_with_body_keeps_connection_open() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut response = Response::new(tx, 200);
        response.add_header("Content-Type", "text/plain");
        response.set_body(Some(b"hello"));
        drop(response);

        let (bytes, finishes) = drain(&mut rx);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains(concat!(
            "Server: ",
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION"),
            "\r\n"
        )));
        assert!(text.contains("Content-Type: text/plain\r\n"));
        assert!(text.contains("Content-Length: 5\r\n\r\nhello"));
        assert_eq!(finishes, vec![false]);
    }

    #[test]
    fn status_change_after_init_is_ignored() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut response = Response::new(tx, 200);
        response.add_header("X-First", "1");
        response.set_status(500);
        response.set_body(None);
        drop(response);

        let (bytes, _) = drain(&mut rx);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    }

    #[test]
    fn dropped_without_body_writes_nothing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let response = Response::new(tx, 200);
        drop(response);

        let (bytes, finishes) = drain(&mut rx);
        assert!(bytes.is_empty());
        assert_eq!(finishes, vec![false]);
    }
}
