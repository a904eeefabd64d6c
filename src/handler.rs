use crate::http::request::Request;
use crate::http::response::Response;
use crate::server::pool::WorkerState;

/// The embedder's callback surface.
///
/// A single `Handler` instance is shared by all worker threads and the timer
/// thread, so the trait requires `Send + Sync`. Per-worker mutable state goes
/// into the associated [`Context`](Handler::Context) type instead: each worker
/// thread creates one with [`on_thread_started`](Handler::on_thread_started)
/// and it lives in that worker's [`WorkerState`] slot, behind a lock the
/// timer thread can also take.
pub trait Handler: Send + Sync + 'static {
    /// Per-worker state, created once per worker thread.
    type Context: Send + 'static;

    /// Invoked once on each worker thread before it processes any request.
    fn on_thread_started(&self) -> Self::Context;

    /// Invoked on a worker thread for every parsed request.
    ///
    /// Must eventually call [`Response::set_body`] exactly once; a response
    /// that is dropped without a body writes nothing to the client.
    ///
    /// A panic here is not caught by the worker pool: it is fatal to that
    /// worker thread. Protocol-level errors are the core's responsibility,
    /// application-level errors are the embedder's.
    fn on_request(
        &self,
        request: &Request,
        response: &mut Response,
        worker: &WorkerState<Self::Context>,
    );

    /// Invoked once per worker thread at pool shutdown, with the context
    /// created by [`on_thread_started`](Handler::on_thread_started).
    fn on_thread_stopped(&self, _context: Self::Context) {}

    /// Invoked on the timer thread every `interval_secs` seconds for each
    /// registered timer.
    ///
    /// `workers` are the per-worker state slots; the embedder takes each
    /// worker's lock before reading or resetting state the workers also
    /// mutate.
    fn on_timer(&self, _interval_secs: u64, _workers: &[WorkerState<Self::Context>]) {}
}
