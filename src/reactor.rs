//! Single-threaded event loops on dedicated OS threads.

use std::future::Future;
use std::sync::Arc;
use std::thread;

use anyhow::Context;
use tokio::sync::Notify;

/// A single-threaded event loop pinned to its own OS thread.
///
/// Connections, timers and cleanup for a reactor all run as tasks on that one
/// thread; [`spawn_task`](Reactor::spawn_task) is the only way work crosses
/// thread boundaries, and the posted future always runs on the reactor's own
/// thread on a later loop iteration, never synchronously in the caller.
pub struct Reactor {
    handle: tokio::runtime::Handle,
    shutdown: Arc<Notify>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Reactor {
    /// Builds the event loop and starts driving it on a new named thread.
    ///
    /// Failing to build the underlying runtime is a fatal construction error.
    pub fn spawn(name: &str) -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to build reactor runtime")?;

        let handle = runtime.handle().clone();
        let shutdown = Arc::new(Notify::new());
        let stop = shutdown.clone();

        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    stop.notified().await;
                });
                // The runtime drops here, on the reactor thread, cancelling
                // any tasks that are still pending.
            })
            .context("failed to spawn reactor thread")?;

        tracing::debug!(reactor = name, "reactor started");

        Ok(Self {
            handle,
            shutdown,
            thread: Some(thread),
        })
    }

    /// Schedules a future onto the reactor from any thread.
    pub fn spawn_task<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(future);
    }

    /// Stops the loop and joins its thread. Safe to call from any thread,
    /// and idempotent.
    pub fn stop(&mut self) {
        self.shutdown.notify_one();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        self.stop();
    }
}
