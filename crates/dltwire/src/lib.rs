//! DLT diagnostic log and trace transport.
//!
//! dltwire moves DLT messages between applications, a collecting daemon and
//! downstream viewers.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP, UDP, Unix socket, FIFO, serial and timer endpoints
//! - [`frame`]: message codec, receive buffer, stored-file reader and writer
//! - [`buffer`]: ring buffers, in process and in shared memory (behind `buffer` feature)
//! - [`daemon`]: event loop and collector (behind `daemon` feature)

/// Re-export transport types.
pub mod transport {
    pub use dltwire_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use dltwire_frame::*;
}

/// Re-export ring buffer types (requires `buffer` feature).
#[cfg(feature = "buffer")]
pub mod buffer {
    pub use dltwire_buffer::*;
}

/// Re-export daemon types (requires `daemon` feature).
#[cfg(feature = "daemon")]
pub mod daemon {
    pub use dltwire_daemon::*;
}
