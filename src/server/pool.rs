//! Fixed worker pool with a shared FIFO queue.
//!
//! Workers block on a crossbeam channel, the multi-consumer stand-in for the
//! usual mutex + counting-semaphore pair. Admission into the queue is FIFO;
//! completion order across workers is not guaranteed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use anyhow::Context;
use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::handler::Handler;
use crate::http::request::Request;
use crate::http::response::Response;

/// A queued request/response pair awaiting a worker.
pub(crate) struct WorkItem {
    pub(crate) request: Request,
    pub(crate) response: Response,
}

pub(crate) enum Task {
    Process(WorkItem),
    /// One per worker at shutdown, to unblock its queue wait.
    Shutdown,
}

/// Enqueues work items for the pool. Cloned into every connection.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    tx: Sender<Task>,
}

impl Dispatcher {
    /// The single hand-off point from a connection to the worker pool.
    pub(crate) fn process(&self, request: Request, response: Response) {
        let _ = self.tx.send(Task::Process(WorkItem { request, response }));
    }

    /// A dispatcher wired to a bare receiver, with no pool behind it.
    #[cfg(test)]
    pub(crate) fn detached() -> (Self, Receiver<Task>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }
}

/// One worker's state slot, shared between that worker and the timer thread.
///
/// The slot is empty until the worker thread has run
/// [`Handler::on_thread_started`], and empties again at shutdown.
pub struct WorkerState<C> {
    id: usize,
    slot: Arc<Mutex<Option<C>>>,
}

impl<C> Clone for WorkerState<C> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            slot: self.slot.clone(),
        }
    }
}

impl<C> WorkerState<C> {
    pub(crate) fn new(id: usize) -> Self {
        Self {
            id,
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Index of this worker within the pool.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Takes this worker's lock.
    pub fn lock(&self) -> MutexGuard<'_, Option<C>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct WorkerThread<C> {
    state: WorkerState<C>,
    thread: Option<thread::JoinHandle<()>>,
}

pub(crate) struct WorkerPool<H: Handler> {
    handler: Arc<H>,
    tx: Sender<Task>,
    rx: Receiver<Task>,
    stopping: Arc<AtomicBool>,
    workers: Vec<WorkerThread<H::Context>>,
}

impl<H: Handler> WorkerPool<H> {
    pub(crate) fn new(handler: Arc<H>) -> Self {
        let (tx, rx) = unbounded();
        Self {
            handler,
            tx,
            rx,
            stopping: Arc::new(AtomicBool::new(false)),
            workers: Vec::new(),
        }
    }

    pub(crate) fn dispatcher(&self) -> Dispatcher {
        Dispatcher {
            tx: self.tx.clone(),
        }
    }

    /// Spawns `count` worker threads.
    pub(crate) fn start(&mut self, count: usize) -> anyhow::Result<()> {
        for id in 0..count {
            let state = WorkerState::new(id);
            let handler = self.handler.clone();
            let rx = self.rx.clone();
            let stopping = self.stopping.clone();
            let worker_state = state.clone();

            let thread = thread::Builder::new()
                .name(format!("impeller-worker-{id}"))
                .spawn(move || worker_loop(handler, worker_state, rx, stopping))
                .context("failed to spawn worker thread")?;

            self.workers.push(WorkerThread {
                state,
                thread: Some(thread),
            });
        }

        tracing::debug!(workers = count, "worker pool started");
        Ok(())
    }

    /// State slots of all workers, for the timer thread.
    pub(crate) fn worker_states(&self) -> Vec<WorkerState<H::Context>> {
        self.workers
            .iter()
            .map(|worker| worker.state.clone())
            .collect()
    }

    /// Stops the pool: discards anything still queued, wakes every worker,
    /// joins them.
    ///
    /// In-flight requests finish; queued ones are dropped unanswered. That is
    /// deliberate — see DESIGN.md on the shutdown work-loss policy.
    pub(crate) fn stop(&mut self) {
        self.stopping.store(true, Ordering::SeqCst);

        let mut discarded = 0usize;
        while let Ok(task) = self.rx.try_recv() {
            // Dropping a work item finishes its response unsent and releases
            // the connection handle it carries.
            drop(task);
            discarded += 1;
        }

        for _ in &self.workers {
            let _ = self.tx.send(Task::Shutdown);
        }

        for worker in &mut self.workers {
            if let Some(thread) = worker.thread.take() {
                let _ = thread.join();
            }
        }

        tracing::debug!(discarded, "worker pool stopped");
    }
}

fn worker_loop<H: Handler>(
    handler: Arc<H>,
    state: WorkerState<H::Context>,
    rx: Receiver<Task>,
    stopping: Arc<AtomicBool>,
) {
    let context = handler.on_thread_started();
    *state.lock() = Some(context);
    tracing::debug!(worker = state.id(), "worker thread started");

    loop {
        match rx.recv() {
            Ok(Task::Process(item)) => {
                if stopping.load(Ordering::SeqCst) {
                    // Raced with stop; discard like the drained items.
                    drop(item);
                    continue;
                }

                let WorkItem {
                    request,
                    mut response,
                } = item;

                // A panic in the embedder's callback is deliberately not
                // caught; it takes this worker thread down.
                handler.on_request(&request, &mut response, &state);

                // Destroying the item completes the response and releases
                // the connection.
                drop(response);
                drop(request);
            }
            Ok(Task::Shutdown) | Err(_) => break,
        }
    }

    if let Some(context) = state.lock().take() {
        handler.on_thread_stopped(context);
    }
    tracing::debug!(worker = state.id(), "worker thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::connection::ConnCmd;
    use crate::http::parser::{ParseStatus, RequestParser};
    use bytes::BytesMut;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;
    use tokio::sync::mpsc as tokio_mpsc;

    fn make_request(raw: &[u8]) -> Request {
        let mut input = BytesMut::from(raw);
        match RequestParser::new().parse(&mut input) {
            ParseStatus::Complete(request) => request,
            other => panic!("fixture did not parse: {other:?}"),
        }
    }

    fn make_response() -> (Response, tokio_mpsc::UnboundedReceiver<ConnCmd>) {
        let (tx, rx) = tokio_mpsc::unbounded_channel();
        (Response::new(tx, 200), rx)
    }

    struct CountingHandler {
        started: AtomicUsize,
        stopped: AtomicUsize,
        processed: AtomicUsize,
        done: std_mpsc::Sender<()>,
    }

    impl Handler for CountingHandler {
        type Context = u64;

        fn on_thread_started(&self) -> u64 {
            self.started.fetch_add(1, Ordering::SeqCst);
            0
        }

        fn on_request(
            &self,
            _request: &Request,
            response: &mut Response,
            worker: &WorkerState<u64>,
        ) {
            if let Some(count) = worker.lock().as_mut() {
                *count += 1;
            }
            self.processed.fetch_add(1, Ordering::SeqCst);
            response.set_body(Some(b"ok"));
            let _ = self.done.send(());
        }

        fn on_thread_stopped(&self, _context: u64) {
            self.stopped.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn lifecycle_callbacks_fire_once_per_worker() {
        let (done_tx, _done_rx) = std_mpsc::channel();
        let handler = Arc::new(CountingHandler {
            started: AtomicUsize::new(0),
            stopped: AtomicUsize::new(0),
            processed: AtomicUsize::new(0),
            done: done_tx,
        });

        let mut pool = WorkerPool::new(handler.clone());
        pool.start(3).unwrap();
        pool.stop();

        assert_eq!(handler.started.load(Ordering::SeqCst), 3);
        assert_eq!(handler.stopped.load(Ordering::SeqCst), 3);
        assert_eq!(handler.processed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn processes_item_and_updates_worker_state() {
        let (done_tx, done_rx) = std_mpsc::channel();
        let handler = Arc::new(CountingHandler {
            started: AtomicUsize::new(0),
            stopped: AtomicUsize::new(0),
            processed: AtomicUsize::new(0),
            done: done_tx,
        });

        let mut pool = WorkerPool::new(handler.clone());
        pool.start(1).unwrap();

        let request = make_request(b"GET / HTTP/1.1\r\nHost: a\r\n\r\n");
        let (response, mut conn_rx) = make_response();
        pool.dispatcher().process(request, response);

        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        // Wait for the worker to drop the item and emit Finish.
        let mut saw_finish = false;
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while std::time::Instant::now() < deadline {
            match conn_rx.try_recv() {
                Ok(ConnCmd::Finish { close }) => {
                    assert!(!close);
                    saw_finish = true;
                    break;
                }
                Ok(ConnCmd::Write(_)) => continue,
                Err(_) => thread::sleep(Duration::from_millis(5)),
            }
        }
        assert!(saw_finish);

        let states = pool.worker_states();
        assert_eq!(*states[0].lock(), Some(1));

        pool.stop();
    }

    /// A handler that blocks in on_request until the test releases it.
    struct GatedHandler {
        gate: Mutex<std_mpsc::Receiver<()>>,
        entered: std_mpsc::Sender<()>,
        processed: AtomicUsize,
    }

    impl Handler for GatedHandler {
        type Context = ();

        fn on_thread_started(&self) {}

        fn on_request(&self, _request: &Request, response: &mut Response, _worker: &WorkerState<()>) {
            let _ = self.entered.send(());
            let _ = self.gate.lock().unwrap_or_else(PoisonError::into_inner).recv();
            response.set_body(None);
            self.processed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn stop_discards_queued_items_and_joins_workers() {
        let (gate_tx, gate_rx) = std_mpsc::channel();
        let (entered_tx, entered_rx) = std_mpsc::channel();
        let handler = Arc::new(GatedHandler {
            gate: Mutex::new(gate_rx),
            entered: entered_tx,
            processed: AtomicUsize::new(0),
        });

        let mut pool = WorkerPool::new(handler.clone());
        pool.start(1).unwrap();

        let mut finish_rxs = Vec::new();
        for _ in 0..5 {
            let request = make_request(b"GET / HTTP/1.1\r\nHost: a\r\n\r\n");
            let (response, conn_rx) = make_response();
            pool.dispatcher().process(request, response);
            finish_rxs.push(conn_rx);
        }

        // The single worker is now blocked inside the first item.
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let stopper = thread::spawn(move || {
            pool.stop();
            pool
        });

        // Release the in-flight request so the worker can exit.
        gate_tx.send(()).unwrap();
        let _pool = stopper.join().unwrap();

        assert_eq!(handler.processed.load(Ordering::SeqCst), 1);

        // Every response finished exactly once: one processed, four dropped
        // unanswered by the drain.
        for mut rx in finish_rxs {
            let mut finishes = 0;
            while let Ok(cmd) = rx.try_recv() {
                if matches!(cmd, ConnCmd::Finish { .. }) {
                    finishes += 1;
                }
            }
            assert_eq!(finishes, 1);
        }
    }
}
