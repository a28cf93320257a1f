use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use tracing::debug;

use crate::codec::encode_message;
use crate::error::{FrameError, Result};
use crate::header::StorageHeader;
use crate::message::Message;
use crate::protocol::{DltId, SERIAL_HEADER};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// How [`MessageWriter`] frames each message.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Prefix every frame with the serial marker `DLS\x01`.
    pub serial_header: bool,
    /// Write a storage header before every frame (stored trace files).
    ///
    /// Messages without one get a header stamped with the current time.
    pub storage_header: bool,
    /// ECU id stamped into storage headers for messages stored without one.
    pub ecu: DltId,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            serial_header: false,
            storage_header: false,
            ecu: DltId::new("ECU1"),
        }
    }
}

impl WriterConfig {
    /// Configuration for stored trace files.
    pub fn storage(ecu: DltId) -> Self {
        Self {
            storage_header: true,
            ecu,
            ..Self::default()
        }
    }
}

/// Decides when the sink of a [`MessageWriter`] is replaced.
///
/// Called after every successfully written frame with the number of bytes
/// written to the current sink. Returning a new sink rotates to it.
pub trait RotationPolicy<T> {
    fn after_write(&mut self, bytes_written: u64) -> std::io::Result<Option<T>>;
}

/// Writes complete DLT frames to any `Write` sink.
pub struct MessageWriter<T> {
    inner: T,
    buf: BytesMut,
    config: WriterConfig,
    rotation: Option<Box<dyn RotationPolicy<T> + Send>>,
    bytes_written: u64,
    messages_written: u64,
}

impl<T: Write> MessageWriter<T> {
    /// Create a writer that emits bare frames.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, WriterConfig::default())
    }

    pub fn with_config(inner: T, config: WriterConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
            rotation: None,
            bytes_written: 0,
            messages_written: 0,
        }
    }

    /// Install the hook consulted after every frame.
    pub fn set_rotation(&mut self, policy: Box<dyn RotationPolicy<T> + Send>) {
        self.rotation = Some(policy);
    }

    /// Encode and write one message (blocking).
    pub fn write_message(&mut self, message: &Message) -> Result<()> {
        self.buf.clear();
        if self.config.serial_header {
            self.buf.extend_from_slice(&SERIAL_HEADER);
        }

        if self.config.storage_header && message.storage.is_none() {
            StorageHeader::now(self.config.ecu).encode(&mut self.buf);
            encode_message(message, &mut self.buf)?;
        } else if !self.config.storage_header && message.storage.is_some() {
            let mut bare = message.clone();
            bare.storage = None;
            encode_message(&bare, &mut self.buf)?;
        } else {
            encode_message(message, &mut self.buf)?;
        }

        let frame = std::mem::take(&mut self.buf);
        let result = self.write_frame(&frame);
        self.buf = frame;
        result
    }

    /// Write an already encoded frame as-is.
    pub fn write_raw(&mut self, frame: &[u8]) -> Result<()> {
        self.write_frame(frame)
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < frame.len() {
            match self.inner.write(&frame[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
        self.flush()?;

        self.bytes_written += frame.len() as u64;
        self.messages_written += 1;

        if let Some(policy) = self.rotation.as_mut() {
            if let Some(next) = policy.after_write(self.bytes_written)? {
                debug!(
                    bytes = self.bytes_written,
                    messages = self.messages_written,
                    "rotating output"
                );
                self.flush()?;
                self.inner = next;
                self.bytes_written = 0;
            }
        }
        Ok(())
    }

    /// Flush the underlying sink.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Bytes written to the current sink.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Account for bytes the sink already held when it was handed over.
    pub fn set_bytes_written(&mut self, bytes: u64) {
        self.bytes_written = bytes;
    }

    /// Frames written since creation.
    pub fn messages_written(&self) -> u64 {
        self.messages_written
    }

    /// Borrow the underlying sink.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying sink.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner sink.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current writer configuration.
    pub fn config(&self) -> &WriterConfig {
        &self.config
    }
}
