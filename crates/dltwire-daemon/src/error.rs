use std::os::fd::RawFd;

use crate::connection::{ConnectionId, ConnectionKind};

/// Errors that can occur in the daemon event loop and collector.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] dltwire_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] dltwire_frame::FrameError),

    /// Ring buffer error.
    #[error("buffer error: {0}")]
    Buffer(#[from] dltwire_buffer::BufferError),

    /// Poller or file I/O error.
    #[error("daemon I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No connection is registered under this id.
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),

    /// No connection is registered for this descriptor.
    #[error("no connection for descriptor {0}")]
    UnknownDescriptor(RawFd),

    /// A listener was registered with a stream kind or the other way round.
    #[error("endpoint does not fit connection kind {0}")]
    EndpointMismatch(ConnectionKind),
}

pub type Result<T> = std::result::Result<T, DaemonError>;
