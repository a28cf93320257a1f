//! DLT frame format: headers, verbose arguments, codec and stream reassembly.
//!
//! Every frame on the wire is laid out as:
//! - An optional 4-byte serial marker (`DLS\x01`)
//! - A 4-byte standard header (flags, counter, big-endian total length)
//! - Optional ECU id, session id and timestamp, announced by the flags
//! - An optional 10-byte extended header (message info, argument count, ids)
//! - A non-verbose (message id + bytes) or verbose (typed arguments) payload
//!
//! Stored trace files prefix every frame with a 16-byte storage header.
//! [`Receiver`] turns partial reads into a contiguous window that
//! [`decode_message`] frames; [`MessageWriter`] does the reverse.

pub mod argument;
pub mod codec;
pub mod error;
pub mod file;
pub mod filter;
pub mod header;
pub mod message;
pub mod protocol;
pub mod receiver;
pub mod user;
pub mod writer;

pub use argument::{
    decode_arguments, encode_arguments, Argument, Coding, FixedPoint, Value, VarInfo,
};
pub use codec::{
    decode_message, encode_message, find_serial_header, DecodeOptions, Decoded,
    DEFAULT_MAX_MESSAGE,
};
pub use error::{FrameError, Result};
pub use file::FileReader;
pub use filter::{Filter, FilterEntry};
pub use header::{ExtendedHeader, HeaderExtra, StandardHeader, StorageHeader};
pub use message::{Message, MessageBuilder, Payload};
pub use protocol::{DltId, LogLevel, MessageType, SERIAL_HEADER, STORAGE_MAGIC};
pub use receiver::{ReceiveMode, Receiver, DEFAULT_RECEIVE_BUFFER};
pub use user::{find_user_header, UserHeader, UserMessageKind, USER_HEADER_SIZE};
pub use writer::{MessageWriter, RotationPolicy, WriterConfig};
