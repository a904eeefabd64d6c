//! HTTP/1.1 protocol layer.
//!
//! - **`parser`**: incremental request parsing with a resumable state machine
//! - **`request`**: the parsed request handed to the embedder
//! - **`response`**: write-through response composition and the reason table
//! - **`connection`**: the per-connection driver task
//!
//! # Request cycle
//!
//! ```text
//!   Idle ──read──▶ Parsing ──complete──▶ Dispatched ──finish──▶ Idle
//!     │               │                      │
//!     └── error/timeout/close-signal/status ≥ 400 ──▶ Closing
//! ```
//!
//! Parsing is strictly sequential per connection: at most one request is in
//! flight, and the next one is not parsed until the response finishes.

pub(crate) mod connection;
pub mod parser;
pub mod request;
pub mod response;
