//! DLT log daemon.
//!
//! Applications hand messages to the daemon over a Unix socket, a FIFO, UDP
//! or the shared-memory ring. The [`Multiplexer`] owns every descriptor and
//! dispatches readiness to a [`Handler`]; the [`Collector`] is the handler
//! that stores, forwards and buffers what arrives. [`Daemon`] wires both to
//! the endpoints named in a [`DaemonConfig`].

pub mod collector;
pub mod config;
pub mod connection;
pub mod daemon;
pub mod error;
pub mod handler;
pub mod multiplexer;
pub mod storage;

pub use collector::{Collector, CollectorStats};
pub use config::{DaemonConfig, RingConfig};
pub use connection::{
    Connection, ConnectionId, ConnectionKind, ConnectionState, Endpoint, TimerKind,
};
pub use daemon::Daemon;
pub use error::{DaemonError, Result};
pub use handler::{Clients, Handler};
pub use multiplexer::{Multiplexer, DEFAULT_POLL_TIMEOUT};
pub use storage::{open_storage, SizeRotation};
