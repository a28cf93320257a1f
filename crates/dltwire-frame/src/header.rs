use bytes::{BufMut, BytesMut};

use crate::error::{FrameError, Result};
use crate::protocol::{
    htyp, msin, DltId, LogLevel, MessageType, EXTENDED_HEADER_SIZE, STANDARD_HEADER_SIZE,
    STORAGE_HEADER_SIZE, STORAGE_MAGIC,
};

/// Local-only header prefixed to every message in a stored trace file.
///
/// Seconds and microseconds are little-endian; this header never travels on
/// a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageHeader {
    pub seconds: u32,
    pub microseconds: i32,
    pub ecu: DltId,
}

impl StorageHeader {
    /// Storage header stamped with the current wall-clock time.
    pub fn now(ecu: DltId) -> Self {
        let elapsed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            seconds: elapsed.as_secs() as u32,
            microseconds: elapsed.subsec_micros() as i32,
            ecu,
        }
    }

    pub fn decode(src: &[u8]) -> Result<Self> {
        if src.len() < STORAGE_HEADER_SIZE {
            return Err(FrameError::WrongParameter("storage header needs 16 bytes"));
        }
        if src[..4] != STORAGE_MAGIC {
            return Err(FrameError::InvalidStorageHeader);
        }
        Ok(Self {
            seconds: u32::from_le_bytes([src[4], src[5], src[6], src[7]]),
            microseconds: i32::from_le_bytes([src[8], src[9], src[10], src[11]]),
            ecu: DltId::from_bytes([src[12], src[13], src[14], src[15]]),
        })
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(STORAGE_HEADER_SIZE);
        dst.put_slice(&STORAGE_MAGIC);
        dst.put_u32_le(self.seconds);
        dst.put_i32_le(self.microseconds);
        dst.put_slice(self.ecu.as_bytes());
    }
}

/// The fixed four byte header every frame starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandardHeader {
    pub htyp: u8,
    pub counter: u8,
    /// Total frame length (header + payload), big-endian on the wire.
    pub len: u16,
}

impl StandardHeader {
    pub fn decode(src: &[u8]) -> Option<Self> {
        if src.len() < STANDARD_HEADER_SIZE {
            return None;
        }
        Some(Self {
            htyp: src[0],
            counter: src[1],
            len: u16::from_be_bytes([src[2], src[3]]),
        })
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u8(self.htyp);
        dst.put_u8(self.counter);
        dst.put_u16(self.len);
    }

    pub fn has_extended_header(&self) -> bool {
        self.htyp & htyp::UEH != 0
    }

    pub fn is_big_endian(&self) -> bool {
        self.htyp & htyp::MSBF != 0
    }

    pub fn version(&self) -> u8 {
        (self.htyp & htyp::VERSION_MASK) >> htyp::VERSION_SHIFT
    }

    /// Size of all headers (standard, extra and extended) announced by `htyp`.
    pub fn headers_size(&self) -> usize {
        let extended = if self.has_extended_header() {
            EXTENDED_HEADER_SIZE
        } else {
            0
        };
        STANDARD_HEADER_SIZE + extra_size(self.htyp) + extended
    }
}

/// Number of optional header-extra bytes announced by `htyp`.
pub fn extra_size(flags: u8) -> usize {
    let mut size = 0;
    if flags & htyp::WEID != 0 {
        size += 4;
    }
    if flags & htyp::WSID != 0 {
        size += 4;
    }
    if flags & htyp::WTMS != 0 {
        size += 4;
    }
    size
}

/// Optional fields following the standard header, in fixed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeaderExtra {
    pub ecu: Option<DltId>,
    pub session_id: Option<u32>,
    /// Timestamp in 0.1 ms units since ECU start.
    pub timestamp: Option<u32>,
}

impl HeaderExtra {
    /// Decode the extras announced by `flags`; `src` must hold `extra_size(flags)` bytes.
    pub fn decode(flags: u8, src: &[u8]) -> Result<Self> {
        if src.len() < extra_size(flags) {
            return Err(FrameError::content("header extra truncated"));
        }
        let mut pos = 0;
        let mut next = || {
            let word = [src[pos], src[pos + 1], src[pos + 2], src[pos + 3]];
            pos += 4;
            word
        };
        let ecu = (flags & htyp::WEID != 0).then(|| DltId::from_bytes(next()));
        let session_id = (flags & htyp::WSID != 0).then(|| u32::from_be_bytes(next()));
        let timestamp = (flags & htyp::WTMS != 0).then(|| u32::from_be_bytes(next()));
        Ok(Self {
            ecu,
            session_id,
            timestamp,
        })
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        if let Some(ecu) = self.ecu {
            dst.put_slice(ecu.as_bytes());
        }
        if let Some(session_id) = self.session_id {
            dst.put_u32(session_id);
        }
        if let Some(timestamp) = self.timestamp {
            dst.put_u32(timestamp);
        }
    }

    /// The `htyp` bits describing which extras are present.
    pub fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.ecu.is_some() {
            flags |= htyp::WEID;
        }
        if self.session_id.is_some() {
            flags |= htyp::WSID;
        }
        if self.timestamp.is_some() {
            flags |= htyp::WTMS;
        }
        flags
    }

    pub fn size(&self) -> usize {
        extra_size(self.flags())
    }
}

/// Extended header: message info, argument count and the app/context ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtendedHeader {
    pub msin: u8,
    pub noar: u8,
    pub apid: DltId,
    pub ctid: DltId,
}

impl ExtendedHeader {
    /// Extended header of a log message at `level`.
    pub fn log(level: LogLevel, apid: DltId, ctid: DltId, verbose: bool) -> Self {
        Self::new(MessageType::Log, level as u8, apid, ctid, verbose)
    }

    pub fn new(
        message_type: MessageType,
        subtype: u8,
        apid: DltId,
        ctid: DltId,
        verbose: bool,
    ) -> Self {
        let mut info = (message_type.bits() << msin::MSTP_SHIFT) & msin::MSTP_MASK;
        info |= (subtype << msin::MTIN_SHIFT) & msin::MTIN_MASK;
        if verbose {
            info |= msin::VERB;
        }
        Self {
            msin: info,
            noar: 0,
            apid,
            ctid,
        }
    }

    pub fn decode(src: &[u8]) -> Result<Self> {
        if src.len() < EXTENDED_HEADER_SIZE {
            return Err(FrameError::content("extended header truncated"));
        }
        Ok(Self {
            msin: src[0],
            noar: src[1],
            apid: DltId::from_bytes([src[2], src[3], src[4], src[5]]),
            ctid: DltId::from_bytes([src[6], src[7], src[8], src[9]]),
        })
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u8(self.msin);
        dst.put_u8(self.noar);
        dst.put_slice(self.apid.as_bytes());
        dst.put_slice(self.ctid.as_bytes());
    }

    pub fn is_verbose(&self) -> bool {
        self.msin & msin::VERB != 0
    }

    pub fn message_type(&self) -> MessageType {
        MessageType::from_bits((self.msin & msin::MSTP_MASK) >> msin::MSTP_SHIFT)
    }

    /// Message type info (log level, trace kind or control kind).
    pub fn subtype(&self) -> u8 {
        (self.msin & msin::MTIN_MASK) >> msin::MTIN_SHIFT
    }

    pub fn log_level(&self) -> Option<LogLevel> {
        match self.message_type() {
            MessageType::Log => LogLevel::from_bits(self.subtype()),
            _ => None,
        }
    }
}
