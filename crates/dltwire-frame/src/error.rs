/// Errors that can occur while receiving, decoding or encoding DLT frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A caller supplied an argument outside the accepted range.
    #[error("wrong parameter: {0}")]
    WrongParameter(&'static str),

    /// The frame is internally inconsistent (lengths, argument layout).
    #[error("corrupt frame content: {0}")]
    Content(String),

    /// Resync was requested but no serial marker was found in the window.
    #[error("serial marker not found, {discard} bytes can be discarded")]
    MissingSerialMarker { discard: usize },

    /// A stored-file frame does not start with the storage magic.
    #[error("invalid storage header magic")]
    InvalidStorageHeader,

    /// The declared frame size exceeds the configured maximum.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// The receive buffer is full and no frame could be extracted from it.
    #[error("receive buffer full ({capacity} bytes)")]
    ReceiverFull { capacity: usize },

    /// The peer closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A message cannot be represented on the wire.
    #[error("cannot encode message: {0}")]
    Encode(String),
}

impl FrameError {
    pub(crate) fn content(msg: impl Into<String>) -> Self {
        Self::Content(msg.into())
    }

    pub(crate) fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
