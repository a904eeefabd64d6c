//! Per-connection driver.
//!
//! Each accepted socket becomes one [`Connection`], driven by a single task on
//! its connection group's reactor thread. The task owns the socket and all
//! buffers outright; the only things other threads ever hold are clones of the
//! connection's command sender (inside an in-flight [`Response`], or in the
//! broadcast registry). When the task returns, the socket and buffers are
//! freed on the reactor's own thread — a connection can never be freed while a
//! worker still references it, and never from a foreign thread.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::http::parser::{ParseStatus, RequestParser};
use crate::http::response::Response;
use crate::server::pool::Dispatcher;

const READ_BUFFER_SIZE: usize = 4096;

/// Commands posted to a connection's driver task from other threads.
#[derive(Debug)]
pub(crate) enum ConnCmd {
    /// Append bytes to the connection's output.
    Write(Bytes),
    /// The in-flight response is complete; close afterwards if asked.
    Finish { close: bool },
}

pub(crate) type ConnSender = mpsc::UnboundedSender<ConnCmd>;

/// Registry of live connections in one connection group, used for broadcast.
pub(crate) type ConnRegistry = Arc<Mutex<HashMap<u64, ConnSender>>>;

pub(crate) struct Connection {
    stream: TcpStream,
    dispatcher: Dispatcher,
    cmd_tx: ConnSender,
    cmd_rx: mpsc::UnboundedReceiver<ConnCmd>,
    read_timeout_secs: u64,
    write_timeout_secs: u64,
    registry: Option<(ConnRegistry, u64)>,
}

impl Connection {
    pub(crate) fn new(
        stream: TcpStream,
        dispatcher: Dispatcher,
        read_timeout_secs: u64,
        write_timeout_secs: u64,
        registry: Option<(ConnRegistry, u64)>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        Self {
            stream,
            dispatcher,
            cmd_tx,
            cmd_rx,
            read_timeout_secs,
            write_timeout_secs,
            registry,
        }
    }

    /// A handle to this connection's output path.
    pub(crate) fn sender(&self) -> ConnSender {
        self.cmd_tx.clone()
    }

    /// Drives the connection until it closes. Runs on the owning reactor.
    pub(crate) async fn run(self) {
        let Connection {
            stream,
            dispatcher,
            cmd_tx,
            mut cmd_rx,
            read_timeout_secs,
            write_timeout_secs,
            registry,
        } = self;

        let (mut reader, mut writer) = stream.into_split();
        let mut input = BytesMut::with_capacity(READ_BUFFER_SIZE);
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        let mut parser: Option<RequestParser> = None;
        let mut need_close = false;
        let mut dispatched = false;

        let outcome: anyhow::Result<()> = async {
            loop {
                tokio::select! {
                    cmd = cmd_rx.recv() => match cmd {
                        Some(ConnCmd::Write(bytes)) => {
                            write_all(&mut writer, &bytes, write_timeout_secs).await?;
                        }
                        Some(ConnCmd::Finish { close }) => {
                            dispatched = false;
                            if close || need_close {
                                return Ok(());
                            }
                            // The next request may already be buffered.
                            advance(
                                &mut input,
                                &mut parser,
                                &dispatcher,
                                &cmd_tx,
                                &mut need_close,
                                &mut dispatched,
                            );
                        }
                        // Unreachable while we hold cmd_tx.
                        None => return Ok(()),
                    },
                    read = read_some(&mut reader, &mut buf, read_timeout_secs), if !dispatched => {
                        let count = read?;
                        if count == 0 {
                            return Ok(());
                        }
                        input.extend_from_slice(&buf[..count]);
                        advance(
                            &mut input,
                            &mut parser,
                            &dispatcher,
                            &cmd_tx,
                            &mut need_close,
                            &mut dispatched,
                        );
                    }
                }
            }
        }
        .await;

        if let Err(error) = outcome {
            tracing::debug!(error = %error, "connection closed");
        }

        if let Some((registry, id)) = registry {
            registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
        }

        let _ = writer.shutdown().await;
    }
}

/// Feeds buffered input to the parser and dispatches or rejects the request.
///
/// No-op while a request is already in flight: there is no pipelining, so
/// further input stays buffered until the current response finishes.
fn advance(
    input: &mut BytesMut,
    parser: &mut Option<RequestParser>,
    dispatcher: &Dispatcher,
    cmd_tx: &ConnSender,
    need_close: &mut bool,
    dispatched: &mut bool,
) {
    if *dispatched {
        return;
    }

    // The parser stamps the request's arrival time at creation, so it must
    // not exist before the first byte of the next request is buffered; on an
    // idle keep-alive connection that may be long after the previous
    // response finished.
    if parser.is_none() && input.is_empty() {
        return;
    }

    let active = parser.get_or_insert_with(RequestParser::new);
    match active.parse(input) {
        ParseStatus::Complete(request) => {
            *parser = None;
            if request.header("connection") == Some("close") {
                *need_close = true;
            }
            tracing::debug!(method = request.method(), uri = request.uri(), "request dispatched");
            *dispatched = true;
            dispatcher.process(request, Response::new(cmd_tx.clone(), 200));
        }
        ParseStatus::Incomplete => {}
        ParseStatus::Failed(status) => {
            *parser = None;
            *dispatched = true;
            tracing::debug!(status, "request rejected");

            // Status >= 400 makes set_body force the close flag, so the
            // Finish queued by the drop below ends the connection once the
            // error response has been flushed.
            let mut response = Response::new(cmd_tx.clone(), status);
            response.set_body(None);
        }
    }
}

async fn read_some(
    reader: &mut OwnedReadHalf,
    buf: &mut [u8],
    timeout_secs: u64,
) -> anyhow::Result<usize> {
    if timeout_secs == 0 {
        return Ok(reader.read(buf).await?);
    }
    match timeout(Duration::from_secs(timeout_secs), reader.read(buf)).await {
        Ok(read) => Ok(read?),
        Err(_) => anyhow::bail!("read timed out after {timeout_secs}s"),
    }
}

async fn write_all(
    writer: &mut OwnedWriteHalf,
    bytes: &[u8],
    timeout_secs: u64,
) -> anyhow::Result<()> {
    if timeout_secs == 0 {
        writer.write_all(bytes).await?;
        return Ok(());
    }
    match timeout(Duration::from_secs(timeout_secs), writer.write_all(bytes)).await {
        Ok(written) => Ok(written?),
        Err(_) => anyhow::bail!("write timed out after {timeout_secs}s"),
    }
}
