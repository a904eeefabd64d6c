//! Accept loop.
//!
//! Runs on the server's own runtime thread. Each accepted socket is wrapped
//! in a [`Connection`] and handed to a connection group picked round-robin;
//! from then on the socket lives entirely on that group's reactor thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::net::TcpListener;
use tokio::sync::Notify;

use crate::config::Config;
use crate::http::connection::Connection;
use crate::server::Group;
use crate::server::pool::Dispatcher;

pub(crate) async fn accept_loop(
    listener: TcpListener,
    groups: Arc<Vec<Group>>,
    dispatcher: Dispatcher,
    config: Config,
    shutdown: Arc<Notify>,
) {
    let next_group = AtomicUsize::new(0);
    let next_conn_id = AtomicUsize::new(0);

    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                tracing::info!("accept loop stopping");
                return;
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(error) => {
                        tracing::error!(%error, "accept failed");
                        continue;
                    }
                };

                let group_index =
                    next_group.fetch_add(1, Ordering::Relaxed) % groups.len();
                let group = &groups[group_index];

                let registry = if config.store_connections {
                    let id = next_conn_id.fetch_add(1, Ordering::Relaxed) as u64;
                    Some((group.registry.clone(), id))
                } else {
                    None
                };

                let connection = Connection::new(
                    stream,
                    dispatcher.clone(),
                    config.read_timeout_secs,
                    config.write_timeout_secs,
                    registry.clone(),
                );

                if let Some((registry, id)) = registry {
                    registry
                        .lock()
                        .unwrap_or_else(std::sync::PoisonError::into_inner)
                        .insert(id, connection.sender());
                }

                tracing::debug!(%peer, group = group_index, "connection accepted");
                group.reactor.spawn_task(connection.run());
            }
        }
    }
}
