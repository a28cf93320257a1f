//! Header of messages sent by local applications to the daemon.
//!
//! Every application message starts with the pattern `DUH\x01` and a 32-bit
//! message kind in host byte order.

use bytes::{BufMut, BytesMut};

use crate::error::{FrameError, Result};

pub const USER_HEADER_PATTERN: [u8; 4] = *b"DUH\x01";
pub const USER_HEADER_SIZE: usize = 8;

/// Kind of an application to daemon message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserMessageKind {
    /// One DLT message (without storage header) follows.
    Log,
    RegisterApplication,
    UnregisterApplication,
    RegisterContext,
    UnregisterContext,
    LogLevel,
    Injection,
    Overflow,
    AppLogLevelTraceStatus,
    /// Records are waiting in the shared ring; no body.
    LogShm,
    LogMode,
    LogState,
    Marker,
    Other(u32),
}

impl UserMessageKind {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::Log,
            2 => Self::RegisterApplication,
            3 => Self::UnregisterApplication,
            4 => Self::RegisterContext,
            5 => Self::UnregisterContext,
            6 => Self::LogLevel,
            7 => Self::Injection,
            8 => Self::Overflow,
            9 => Self::AppLogLevelTraceStatus,
            10 => Self::LogShm,
            11 => Self::LogMode,
            12 => Self::LogState,
            13 => Self::Marker,
            other => Self::Other(other),
        }
    }

    pub fn raw(self) -> u32 {
        match self {
            Self::Log => 1,
            Self::RegisterApplication => 2,
            Self::UnregisterApplication => 3,
            Self::RegisterContext => 4,
            Self::UnregisterContext => 5,
            Self::LogLevel => 6,
            Self::Injection => 7,
            Self::Overflow => 8,
            Self::AppLogLevelTraceStatus => 9,
            Self::LogShm => 10,
            Self::LogMode => 11,
            Self::LogState => 12,
            Self::Marker => 13,
            Self::Other(raw) => raw,
        }
    }
}

/// Application message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserHeader {
    pub kind: UserMessageKind,
}

impl UserHeader {
    pub fn new(kind: UserMessageKind) -> Self {
        Self { kind }
    }

    /// Decode the header at the start of `src`.
    ///
    /// Returns `Ok(None)` while fewer than eight bytes are available.
    pub fn decode(src: &[u8]) -> Result<Option<Self>> {
        if src.len() < USER_HEADER_SIZE {
            return Ok(None);
        }
        if src[..4] != USER_HEADER_PATTERN {
            return Err(FrameError::content("missing application header pattern"));
        }
        let raw = u32::from_ne_bytes([src[4], src[5], src[6], src[7]]);
        Ok(Some(Self {
            kind: UserMessageKind::from_raw(raw),
        }))
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(USER_HEADER_SIZE);
        dst.put_slice(&USER_HEADER_PATTERN);
        dst.put_slice(&self.kind.raw().to_ne_bytes());
    }
}

/// Position of the next header pattern in `src`.
pub fn find_user_header(src: &[u8]) -> Option<usize> {
    src.windows(USER_HEADER_PATTERN.len())
        .position(|window| window == USER_HEADER_PATTERN)
}
