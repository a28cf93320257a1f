//! Wire constants of the DLT frame format.

/// Serial marker sent before each frame on serial lines and when resync is enabled.
pub const SERIAL_HEADER: [u8; 4] = *b"DLS\x01";
/// Magic of the storage header prefixed to every message in a stored file.
pub const STORAGE_MAGIC: [u8; 4] = *b"DLT\x01";

pub const STORAGE_HEADER_SIZE: usize = 16;
pub const STANDARD_HEADER_SIZE: usize = 4;
pub const EXTENDED_HEADER_SIZE: usize = 10;

/// Standard header `htyp` flag bits.
pub mod htyp {
    pub const UEH: u8 = 0x01;
    pub const MSBF: u8 = 0x02;
    pub const WEID: u8 = 0x04;
    pub const WSID: u8 = 0x08;
    pub const WTMS: u8 = 0x10;
    pub const VERSION_MASK: u8 = 0xE0;
    pub const VERSION_SHIFT: u8 = 5;
}

/// Protocol version written by this crate.
pub const PROTOCOL_VERSION: u8 = 1;

/// Extended header `msin` bit fields.
pub mod msin {
    pub const VERB: u8 = 0x01;
    pub const MSTP_MASK: u8 = 0x0E;
    pub const MSTP_SHIFT: u8 = 1;
    pub const MTIN_MASK: u8 = 0xF0;
    pub const MTIN_SHIFT: u8 = 4;
}

/// Verbose argument `type_info` bit fields.
pub mod type_info {
    pub const TYLE: u32 = 0x0000_000F;
    pub const BOOL: u32 = 0x0000_0010;
    pub const SINT: u32 = 0x0000_0020;
    pub const UINT: u32 = 0x0000_0040;
    pub const FLOA: u32 = 0x0000_0080;
    pub const ARAY: u32 = 0x0000_0100;
    pub const STRG: u32 = 0x0000_0200;
    pub const RAWD: u32 = 0x0000_0400;
    pub const VARI: u32 = 0x0000_0800;
    pub const FIXP: u32 = 0x0000_1000;
    pub const TRAI: u32 = 0x0000_2000;
    pub const STRU: u32 = 0x0000_4000;
    pub const SCOD: u32 = 0x0003_8000;
    pub const SCOD_SHIFT: u32 = 15;

    pub const TYLE_8BIT: u32 = 1;
    pub const TYLE_16BIT: u32 = 2;
    pub const TYLE_32BIT: u32 = 3;
    pub const TYLE_64BIT: u32 = 4;
    pub const TYLE_128BIT: u32 = 5;
}

/// Message type carried in the extended header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Log,
    AppTrace,
    NwTrace,
    Control,
    Reserved(u8),
}

impl MessageType {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => Self::Log,
            1 => Self::AppTrace,
            2 => Self::NwTrace,
            3 => Self::Control,
            other => Self::Reserved(other),
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            Self::Log => 0,
            Self::AppTrace => 1,
            Self::NwTrace => 2,
            Self::Control => 3,
            Self::Reserved(bits) => bits & 0x07,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::AppTrace => "app_trace",
            Self::NwTrace => "nw_trace",
            Self::Control => "control",
            Self::Reserved(_) => "reserved",
        }
    }
}

/// Log levels, the subtype of [`MessageType::Log`] messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LogLevel {
    Fatal = 1,
    Error = 2,
    Warn = 3,
    Info = 4,
    Debug = 5,
    Verbose = 6,
}

impl LogLevel {
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            1 => Some(Self::Fatal),
            2 => Some(Self::Error),
            3 => Some(Self::Warn),
            4 => Some(Self::Info),
            5 => Some(Self::Debug),
            6 => Some(Self::Verbose),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fatal => "fatal",
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Verbose => "verbose",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fatal" | "1" => Ok(Self::Fatal),
            "error" | "2" => Ok(Self::Error),
            "warn" | "3" => Ok(Self::Warn),
            "info" | "4" => Ok(Self::Info),
            "debug" | "5" => Ok(Self::Debug),
            "verbose" | "6" => Ok(Self::Verbose),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

/// Subtypes of [`MessageType::Control`] messages.
pub mod control {
    pub const REQUEST: u8 = 1;
    pub const RESPONSE: u8 = 2;
}

/// A four character identifier (ECU, application or context id).
///
/// Shorter names are padded with NUL bytes on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DltId([u8; 4]);

impl DltId {
    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Build an id from text, truncating to four bytes.
    pub fn new(name: &str) -> Self {
        let mut bytes = [0u8; 4];
        for (dst, src) in bytes.iter_mut().zip(name.bytes()) {
            *dst = src;
        }
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// Text form with NUL padding removed.
    pub fn as_str(&self) -> std::borrow::Cow<'_, str> {
        let end = self.0.iter().position(|b| *b == 0).unwrap_or(4);
        String::from_utf8_lossy(&self.0[..end])
    }

    pub fn is_empty(&self) -> bool {
        self.0[0] == 0
    }
}

impl std::fmt::Display for DltId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_str())
    }
}

impl std::fmt::Debug for DltId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DltId({:?})", self.as_str())
    }
}

impl From<&str> for DltId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_pads_and_truncates() {
        assert_eq!(DltId::new("AB").as_bytes(), b"AB\0\0");
        assert_eq!(DltId::new("ECU12").as_bytes(), b"ECU1");
        assert_eq!(DltId::new("AB").to_string(), "AB");
        assert!(DltId::default().is_empty());
    }

    #[test]
    fn message_type_bits_roundtrip() {
        for bits in 0..8u8 {
            assert_eq!(MessageType::from_bits(bits).bits(), bits);
        }
        assert_eq!(MessageType::from_bits(3), MessageType::Control);
    }

    #[test]
    fn log_level_parses_names_and_numbers() {
        assert_eq!("warn".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("6".parse::<LogLevel>().unwrap(), LogLevel::Verbose);
        assert!("loud".parse::<LogLevel>().is_err());
        assert!(LogLevel::Error < LogLevel::Info);
    }
}
