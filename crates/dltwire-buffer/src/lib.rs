//! Record ring buffers for DLT log collection.
//!
//! A ring stores variable-length records in a fixed region. The region starts
//! with a 12-byte head of three native-endian `i32` values (write offset, read
//! offset, record count) followed by the data area. Each record is prefixed
//! with a 9-byte block header: the magic `SHM\0`, a status byte (`2` for a
//! complete record) and the payload length as a native-endian `i32`.
//!
//! The same layout is used for heap rings ([`RingBuffer::dynamic`]) and for
//! rings in a memory-mapped file shared with producer processes
//! ([`SharedRing`]).

pub mod error;
pub mod ring;
#[cfg(unix)]
pub mod shm;

pub use error::{BufferError, Result};
pub use ring::{Region, RingBuffer, BLOCK_HEADER_SIZE, HEAD_SIZE};
#[cfg(unix)]
pub use shm::{SharedRing, ShmGuard};
