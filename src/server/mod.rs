//! Server orchestration.
//!
//! [`Server::start`] blocks the calling thread and brings up, in order: the
//! listener, the connection-group reactors, the worker pool, and the timer
//! thread. [`ServerHandle`] is the cloneable control surface other threads
//! use to stop the server or broadcast to live connections.

mod listener;
pub(crate) mod pool;
mod timer;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use anyhow::Context;
use bytes::Bytes;
use tokio::net::TcpListener;
use tokio::sync::Notify;

use crate::config::Config;
use crate::handler::Handler;
use crate::http::connection::{ConnCmd, ConnRegistry};
use crate::reactor::Reactor;

pub use pool::WorkerState;

/// One connection-group reactor and its broadcast registry.
pub(crate) struct Group {
    pub(crate) reactor: Reactor,
    pub(crate) registry: ConnRegistry,
}

/// The server core. Owns the reactors, the worker pool, and the timer thread
/// for as long as [`start`](Server::start) runs.
pub struct Server<H: Handler> {
    config: Config,
    handler: Arc<H>,
    pool: pool::WorkerPool<H>,
    timer_intervals: Vec<u64>,
    shutdown: Arc<Notify>,
    addr: Arc<OnceLock<SocketAddr>>,
    registries: Arc<Mutex<Vec<ConnRegistry>>>,
}

impl<H: Handler> Server<H> {
    pub fn new(config: Config, handler: H) -> Self {
        let handler = Arc::new(handler);
        let pool = pool::WorkerPool::new(handler.clone());
        Self {
            config,
            handler,
            pool,
            timer_intervals: Vec::new(),
            shutdown: Arc::new(Notify::new()),
            addr: Arc::new(OnceLock::new()),
            registries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Registers a periodic [`Handler::on_timer`] callback. Must be called
    /// before [`start`](Server::start).
    pub fn add_timer(&mut self, interval_secs: u64) {
        self.timer_intervals.push(interval_secs);
    }

    /// A control handle usable from any thread, including before `start`.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shutdown: self.shutdown.clone(),
            addr: self.addr.clone(),
            registries: self.registries.clone(),
        }
    }

    /// Runs the server. Blocks until [`ServerHandle::stop`] is called, then
    /// unwinds every thread the server started and returns.
    pub fn start(&mut self) -> anyhow::Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to build server runtime")?;

        runtime.block_on(self.run())
    }

    async fn run(&mut self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&self.config.listen_addr)
            .await
            .with_context(|| format!("failed to bind {}", self.config.listen_addr))?;
        let local_addr = listener.local_addr().context("listener has no local address")?;
        let _ = self.addr.set(local_addr);

        let group_count = self.config.connection_threads.max(1);
        let mut groups = Vec::with_capacity(group_count);
        for index in 0..group_count {
            let reactor = Reactor::spawn(&format!("impeller-conn-{index}"))?;
            let registry: ConnRegistry = Arc::new(Mutex::new(Default::default()));
            groups.push(Group { reactor, registry });
        }
        {
            let mut registries = self
                .registries
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            registries.clear();
            registries.extend(groups.iter().map(|group| group.registry.clone()));
        }

        self.pool.start(self.config.pool_threads.max(1))?;

        let mut timer = if self.timer_intervals.is_empty() {
            None
        } else {
            Some(timer::TimerThread::start(
                self.handler.clone(),
                self.timer_intervals.clone(),
                self.pool.worker_states(),
            )?)
        };

        tracing::info!(addr = %local_addr, groups = group_count, "server started");

        let groups = Arc::new(groups);
        listener::accept_loop(
            listener,
            groups.clone(),
            self.pool.dispatcher(),
            self.config.clone(),
            self.shutdown.clone(),
        )
        .await;

        // Unwind in dependency order: no new connections are accepted, so
        // stopping the groups drops every connection task, then the pool can
        // drain and the timer can go.
        // The accept loop has returned, so ours is the last reference.
        if let Ok(mut groups) = Arc::try_unwrap(groups) {
            for group in &mut groups {
                group.reactor.stop();
            }
        }
        self.pool.stop();
        if let Some(timer) = timer.as_mut() {
            timer.stop();
        }

        tracing::info!("server stopped");
        Ok(())
    }
}

/// Cloneable control surface for a [`Server`].
#[derive(Clone)]
pub struct ServerHandle {
    shutdown: Arc<Notify>,
    addr: Arc<OnceLock<SocketAddr>>,
    registries: Arc<Mutex<Vec<ConnRegistry>>>,
}

impl ServerHandle {
    /// Asks the server to shut down. Safe to call from any thread; idempotent
    /// in effect once the server has begun stopping.
    pub fn stop(&self) {
        self.shutdown.notify_one();
    }

    /// The bound listen address, once the server has started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.addr.get().copied()
    }

    /// Writes `data` to every live connection.
    ///
    /// Requires [`Config::store_connections`]; a no-op otherwise. Delivery is
    /// best effort: connections mid-close are skipped silently.
    pub fn broadcast(&self, data: &[u8]) {
        let payload = Bytes::copy_from_slice(data);
        let registries = self
            .registries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for registry in registries.iter() {
            let connections = registry.lock().unwrap_or_else(PoisonError::into_inner);
            for sender in connections.values() {
                let _ = sender.send(ConnCmd::Write(payload.clone()));
            }
        }
    }
}
