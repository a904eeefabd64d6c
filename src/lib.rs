//! Embeddable event-driven TCP/HTTP server core.
//!
//! Impeller runs a fixed set of threads and moves requests between them:
//!
//! - one listener thread accepts sockets and deals them round-robin to
//!   connection groups;
//! - each connection group is a reactor thread that owns its sockets,
//!   reads and parses requests incrementally, and writes responses;
//! - a worker pool pulls parsed requests off a shared queue and runs the
//!   embedder's [`Handler::on_request`];
//! - an optional timer thread fires periodic [`Handler::on_timer`]
//!   callbacks with access to every worker's state slot.
//!
//! The embedder implements [`Handler`], builds a [`Server`] from a
//! [`Config`], and calls [`Server::start`], which blocks until a
//! [`ServerHandle::stop`] from another thread.
//!
//! ```no_run
//! use impeller::{Config, Handler, Request, Response, Server, WorkerState};
//!
//! struct Echo;
//!
//! impl Handler for Echo {
//!     type Context = ();
//!
//!     fn on_thread_started(&self) {}
//!
//!     fn on_request(&self, request: &Request, response: &mut Response, _: &WorkerState<()>) {
//!         response.set_body(request.body());
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut server = Server::new(Config::default(), Echo);
//!     server.start()
//! }
//! ```

pub mod config;
pub mod handler;
pub mod http;
pub mod reactor;
pub mod server;

pub use config::Config;
pub use handler::Handler;
pub use http::request::Request;
pub use http::response::Response;
pub use server::{Server, ServerHandle, WorkerState};
