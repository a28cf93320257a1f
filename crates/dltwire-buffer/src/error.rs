/// Errors reported by ring buffers.
#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    /// A caller supplied an argument outside the accepted range.
    #[error("wrong parameter: {0}")]
    WrongParameter(&'static str),

    /// Offsets or a record header were inconsistent; the ring has been reset.
    #[error("corrupt ring state: {0}")]
    CorruptState(&'static str),

    /// The record does not fit, even after growing to the maximum size.
    #[error("ring full ({needed} bytes needed, {free} free)")]
    CapacityExceeded { needed: usize, free: usize },

    /// An I/O error occurred on the backing file.
    #[error("ring I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BufferError>;
