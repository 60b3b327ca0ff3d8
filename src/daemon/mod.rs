//! Daemon module: long-running process serving the permission graph.
//!
//! The daemon keeps one graph cache in memory, refreshes it in the
//! background, and answers queries over a Unix socket.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           permgraph serve               │
//! │  - snapshot in memory                   │
//! │  - refresh scheduler (checkpoint poll)  │
//! │  - Unix socket server                   │
//! └─────────────────────────────────────────┘
//!           ▲
//!           │ permgraph.sock
//!           ▼
//! ┌─────────────────────────────────────────┐
//! │           clients                       │
//! │  - one JSON request per line            │
//! │  - {checkpoint, checkpoint_time, data}  │
//! └─────────────────────────────────────────┘
//! ```
//!
//! A fatal refresh error stops the scheduler, which stops the daemon.

pub mod protocol;
pub mod server;

pub use protocol::{Request, Response};
pub use server::{is_daemon_running, process_request, send_request, start_daemon, DaemonState};
