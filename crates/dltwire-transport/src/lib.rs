//! Transport endpoints for DLT log collection.
//!
//! Every channel a log producer or a log consumer can use is opened here and
//! handed out as a [`DltStream`] (connected byte source/sink) or a
//! [`DltListener`] (accepting endpoint):
//! - TCP and UDP sockets for remote clients and producers
//! - Unix domain sockets and FIFOs for local applications
//! - Serial lines (termios configured)
//! - Timer descriptors used as periodic housekeeping events (Linux)
//!
//! This is the lowest layer of dltwire. Nothing here knows about framing.

pub mod error;
pub mod net;
pub mod traits;

#[cfg(unix)]
pub mod fifo;
#[cfg(unix)]
pub mod serial;
#[cfg(target_os = "linux")]
pub mod timer;
#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use net::{bind_udp, connect_tcp, TcpTransport};
pub use traits::{DltListener, DltStream};

#[cfg(unix)]
pub use fifo::open_fifo;
#[cfg(unix)]
pub use serial::{baud_rate, open_serial};
#[cfg(target_os = "linux")]
pub use timer::open_timer;
#[cfg(unix)]
pub use uds::UnixDomainSocket;
