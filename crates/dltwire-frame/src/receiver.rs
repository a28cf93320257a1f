use std::io::{ErrorKind, Read};

use tracing::{trace, warn};

use crate::error::{FrameError, Result};
use crate::user::USER_HEADER_SIZE;

/// Default receive buffer size of daemon connections.
pub const DEFAULT_RECEIVE_BUFFER: usize = 10_024;

/// How reads on the underlying descriptor relate to frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReceiveMode {
    /// Byte stream: frames may span reads and the window carries over.
    #[default]
    Stream,
    /// Datagrams: every read is self-contained, leftovers are dropped.
    Datagram,
}

/// Accumulates bytes from one descriptor into a contiguous window.
///
/// The window is the unconsumed part of the buffer. Callers decode from
/// [`Receiver::window`], drop what they decoded with [`Receiver::remove`]
/// and call [`Receiver::move_to_begin`] before the next [`Receiver::receive`].
pub struct Receiver<T> {
    inner: T,
    buf: Vec<u8>,
    start: usize,
    bytes_received: usize,
    last_batch_received: usize,
    total_bytes_received: u64,
    would_block: bool,
    mode: ReceiveMode,
}

impl<T: Read> Receiver<T> {
    /// Stream receiver with the default buffer size.
    pub fn new(inner: T) -> Self {
        Self::with_capacity(inner, DEFAULT_RECEIVE_BUFFER, ReceiveMode::Stream)
    }

    pub fn with_capacity(inner: T, capacity: usize, mode: ReceiveMode) -> Self {
        Self {
            inner,
            buf: vec![0u8; capacity],
            start: 0,
            bytes_received: 0,
            last_batch_received: 0,
            total_bytes_received: 0,
            would_block: false,
            mode,
        }
    }

    /// Perform exactly one read, appending after the current window.
    ///
    /// Returns the number of bytes read; `Ok(0)` means nothing was available
    /// (would block, or an empty datagram). [`Receiver::would_block`] tells
    /// the two apart. End of file on a stream is reported as
    /// [`FrameError::ConnectionClosed`].
    pub fn receive(&mut self) -> Result<usize> {
        if self.mode == ReceiveMode::Datagram && self.bytes_received > 0 {
            warn!(
                discarded = self.bytes_received,
                "dropping undecoded datagram tail"
            );
            self.clear();
        }

        if self.start + self.bytes_received == self.buf.len() {
            if self.start == 0 {
                return Err(FrameError::ReceiverFull {
                    capacity: self.buf.len(),
                });
            }
            self.move_to_begin();
        }

        let end = self.start + self.bytes_received;
        self.last_batch_received = 0;
        self.would_block = false;
        let read = loop {
            match self.inner.read(&mut self.buf[end..]) {
                Ok(n) => break n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    self.would_block = true;
                    return Ok(0);
                }
                Err(err) => return Err(FrameError::Io(err)),
            }
        };

        if read == 0 {
            return match self.mode {
                ReceiveMode::Stream => Err(FrameError::ConnectionClosed),
                ReceiveMode::Datagram => Ok(0),
            };
        }

        self.last_batch_received = read;
        self.bytes_received += read;
        self.total_bytes_received += read as u64;
        trace!(read, window = self.bytes_received, "received bytes");
        Ok(read)
    }
}

impl<T> Receiver<T> {
    /// Drop the first `n` bytes of the window.
    ///
    /// `n == 0` is rejected without touching the window. Asking for more than
    /// is available is rejected too, after discarding the whole window.
    pub fn remove(&mut self, n: usize) -> Result<()> {
        if n == 0 {
            return Err(FrameError::WrongParameter("cannot remove zero bytes"));
        }
        if n > self.bytes_received {
            warn!(
                requested = n,
                available = self.bytes_received,
                "remove beyond window, discarding all"
            );
            self.clear();
            return Err(FrameError::WrongParameter("remove exceeds received bytes"));
        }
        self.start += n;
        self.bytes_received -= n;
        if self.bytes_received == 0 {
            self.start = 0;
        }
        Ok(())
    }

    /// Move the unconsumed remainder to the start of the buffer.
    pub fn move_to_begin(&mut self) {
        if self.bytes_received == 0 {
            self.start = 0;
            return;
        }
        if self.start > 0 {
            self.buf
                .copy_within(self.start..self.start + self.bytes_received, 0);
            self.start = 0;
        }
    }

    /// Copy `dest.len()` bytes out of the window, optionally skipping a user
    /// header first and optionally removing what was copied.
    ///
    /// Fails with `WrongParameter` until enough bytes have been received.
    pub fn check_and_get(
        &mut self,
        dest: &mut [u8],
        skip_header: bool,
        remove: bool,
    ) -> Result<usize> {
        let skip = if skip_header { USER_HEADER_SIZE } else { 0 };
        let needed = dest.len() + skip;
        if dest.is_empty() || self.bytes_received < needed {
            return Err(FrameError::WrongParameter("not enough data in receiver"));
        }
        let from = self.start + skip;
        dest.copy_from_slice(&self.buf[from..from + dest.len()]);
        if remove {
            self.remove(needed)?;
        }
        Ok(dest.len())
    }

    /// Discard the whole window.
    pub fn clear(&mut self) {
        self.start = 0;
        self.bytes_received = 0;
    }

    /// The unconsumed bytes.
    pub fn window(&self) -> &[u8] {
        &self.buf[self.start..self.start + self.bytes_received]
    }

    pub fn bytes_received(&self) -> usize {
        self.bytes_received
    }

    pub fn last_batch_received(&self) -> usize {
        self.last_batch_received
    }

    pub fn total_bytes_received(&self) -> u64 {
        self.total_bytes_received
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn mode(&self) -> ReceiveMode {
        self.mode
    }

    /// Whether the last [`Receiver::receive`] stopped because the descriptor
    /// had nothing left to read.
    pub fn would_block(&self) -> bool {
        self.would_block
    }

    /// Borrow the underlying descriptor.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying descriptor.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the receiver and return the inner descriptor.
    pub fn into_inner(self) -> T {
        self.inner
    }
}
