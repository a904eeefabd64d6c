//! Periodic callbacks on a dedicated reactor thread.
//!
//! Every registered interval gets its own task on one shared timer reactor.
//! Callbacks run on that thread, never on a worker, so a handler that wants
//! per-worker data reaches into the [`WorkerState`] slots it is given.

use std::sync::Arc;
use std::time::Duration;

use crate::handler::Handler;
use crate::reactor::Reactor;
use crate::server::pool::WorkerState;

pub(crate) struct TimerThread {
    reactor: Reactor,
}

impl TimerThread {
    /// Spawns the timer reactor and one ticking task per interval.
    ///
    /// The first callback for an interval fires after one full period, not
    /// immediately.
    pub(crate) fn start<H: Handler>(
        handler: Arc<H>,
        intervals: Vec<u64>,
        workers: Vec<WorkerState<H::Context>>,
    ) -> anyhow::Result<Self> {
        let reactor = Reactor::spawn("impeller-timer")?;
        let workers = Arc::new(workers);

        for secs in intervals {
            // A zero interval runs at the 1s floor, and the callback is told
            // the floored value, not the one it registered.
            let secs = secs.max(1);
            let handler = handler.clone();
            let workers = workers.clone();
            reactor.spawn_task(async move {
                let mut interval =
                    tokio::time::interval(Duration::from_secs(secs));
                // The first tick completes immediately; skip it.
                interval.tick().await;
                loop {
                    interval.tick().await;
                    handler.on_timer(secs, &workers);
                }
            });
        }

        Ok(Self { reactor })
    }

    pub(crate) fn stop(&mut self) {
        self.reactor.stop();
    }
}
