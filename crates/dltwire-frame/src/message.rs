use bytes::Bytes;

use crate::argument::Argument;
use crate::header::{ExtendedHeader, HeaderExtra, StandardHeader, StorageHeader};
use crate::protocol::{
    htyp, DltId, LogLevel, MessageType, EXTENDED_HEADER_SIZE, PROTOCOL_VERSION,
    STANDARD_HEADER_SIZE,
};

/// Message payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Message id followed by opaque bytes, described elsewhere.
    NonVerbose { message_id: u32, data: Bytes },
    /// Self-describing arguments.
    Verbose(Vec<Argument>),
}

impl Payload {
    pub fn is_verbose(&self) -> bool {
        matches!(self, Self::Verbose(_))
    }

    pub fn is_nonverbose(&self) -> bool {
        matches!(self, Self::NonVerbose { .. })
    }

    pub fn message_id(&self) -> Option<u32> {
        match self {
            Self::NonVerbose { message_id, .. } => Some(*message_id),
            Self::Verbose(_) => None,
        }
    }
}

/// One complete DLT message.
///
/// `htyp` and the total length are derived from the fields, so a message
/// can never announce headers it does not carry.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub storage: Option<StorageHeader>,
    pub version: u8,
    /// Payload fields are most significant byte first.
    pub big_endian: bool,
    pub counter: u8,
    pub extra: HeaderExtra,
    pub extended: Option<ExtendedHeader>,
    pub payload: Payload,
}

impl Message {
    /// A bare non-verbose message.
    pub fn non_verbose(message_id: u32, data: impl Into<Bytes>) -> Self {
        Self {
            storage: None,
            version: PROTOCOL_VERSION,
            big_endian: false,
            counter: 0,
            extra: HeaderExtra::default(),
            extended: None,
            payload: Payload::NonVerbose {
                message_id,
                data: data.into(),
            },
        }
    }

    /// `htyp` byte announcing exactly the headers this message carries.
    pub fn htyp(&self) -> u8 {
        let version = (self.version << htyp::VERSION_SHIFT) & htyp::VERSION_MASK;
        let mut flags = self.extra.flags() | version;
        if self.extended.is_some() {
            flags |= htyp::UEH;
        }
        if self.big_endian {
            flags |= htyp::MSBF;
        }
        flags
    }

    /// Size of standard, extra and extended headers.
    pub fn headers_size(&self) -> usize {
        let extended = if self.extended.is_some() {
            EXTENDED_HEADER_SIZE
        } else {
            0
        };
        STANDARD_HEADER_SIZE + self.extra.size() + extended
    }

    /// Standard header for a payload of `payload_len` bytes.
    pub fn standard_header(&self, payload_len: usize) -> Option<StandardHeader> {
        let len = u16::try_from(self.headers_size() + payload_len).ok()?;
        Some(StandardHeader {
            htyp: self.htyp(),
            counter: self.counter,
            len,
        })
    }

    pub fn is_verbose(&self) -> bool {
        self.extended.is_some_and(|ext| ext.is_verbose())
    }

    pub fn is_nonverbose(&self) -> bool {
        self.payload.is_nonverbose()
    }

    pub fn message_type(&self) -> Option<MessageType> {
        self.extended.map(|ext| ext.message_type())
    }

    pub fn log_level(&self) -> Option<LogLevel> {
        self.extended.and_then(|ext| ext.log_level())
    }

    pub fn apid(&self) -> Option<DltId> {
        self.extended.map(|ext| ext.apid)
    }

    pub fn ctid(&self) -> Option<DltId> {
        self.extended.map(|ext| ext.ctid)
    }

    /// ECU id from the header extra, falling back to the storage header.
    pub fn ecu(&self) -> Option<DltId> {
        self.extra.ecu.or(self.storage.map(|s| s.ecu))
    }

    /// Encoded payload length in bytes.
    pub fn payload_len(&self) -> usize {
        match &self.payload {
            Payload::NonVerbose { data, .. } => 4 + data.len(),
            Payload::Verbose(_) => {
                let mut buf = bytes::BytesMut::new();
                match self.write_payload(&mut buf) {
                    Ok(()) => buf.len(),
                    Err(_) => 0,
                }
            }
        }
    }

    pub(crate) fn write_payload(&self, dst: &mut bytes::BytesMut) -> crate::Result<()> {
        match &self.payload {
            Payload::NonVerbose { message_id, data } => {
                let mut writer = crate::argument::WireWriter::new(dst, self.big_endian);
                writer.u32(*message_id);
                writer.slice(data);
                Ok(())
            }
            Payload::Verbose(args) => crate::argument::encode_arguments(args, self.big_endian, dst),
        }
    }

    /// Same message prefixed by `storage` when persisted.
    pub fn with_storage_header(mut self, storage: StorageHeader) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Payload rendered as text, arguments separated by spaces.
    pub fn payload_text(&self) -> String {
        match &self.payload {
            Payload::Verbose(args) => args
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" "),
            Payload::NonVerbose { message_id, data } => {
                let hex: Vec<String> = data.iter().map(|b| format!("{b:02x}")).collect();
                format!("[{message_id}] {}", hex.join(" "))
            }
        }
    }
}

/// Builder for log, control and non-verbose messages.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    message: Message,
}

impl MessageBuilder {
    /// Verbose log message at `level` from `apid`/`ctid`.
    pub fn log(level: LogLevel, apid: impl Into<DltId>, ctid: impl Into<DltId>) -> Self {
        let mut message = Message::non_verbose(0, Bytes::new());
        message.extended = Some(ExtendedHeader::log(level, apid.into(), ctid.into(), true));
        message.payload = Payload::Verbose(Vec::new());
        Self { message }
    }

    /// Non-verbose control message carrying `service_id` and `data`.
    pub fn control(
        subtype: u8,
        apid: impl Into<DltId>,
        ctid: impl Into<DltId>,
        service_id: u32,
        data: impl Into<Bytes>,
    ) -> Self {
        let mut message = Message::non_verbose(service_id, data);
        message.extended = Some(ExtendedHeader::new(
            MessageType::Control,
            subtype,
            apid.into(),
            ctid.into(),
            false,
        ));
        Self { message }
    }

    /// Non-verbose message without an extended header.
    pub fn non_verbose(message_id: u32, data: impl Into<Bytes>) -> Self {
        Self {
            message: Message::non_verbose(message_id, data),
        }
    }

    /// Append a verbose argument; ignored on non-verbose messages.
    pub fn arg(mut self, argument: Argument) -> Self {
        if let Payload::Verbose(args) = &mut self.message.payload {
            args.push(argument);
        }
        self
    }

    pub fn ecu(mut self, ecu: impl Into<DltId>) -> Self {
        self.message.extra.ecu = Some(ecu.into());
        self
    }

    pub fn session_id(mut self, session_id: u32) -> Self {
        self.message.extra.session_id = Some(session_id);
        self
    }

    pub fn timestamp(mut self, timestamp: u32) -> Self {
        self.message.extra.timestamp = Some(timestamp);
        self
    }

    pub fn counter(mut self, counter: u8) -> Self {
        self.message.counter = counter;
        self
    }

    pub fn big_endian(mut self, big_endian: bool) -> Self {
        self.message.big_endian = big_endian;
        self
    }

    pub fn storage(mut self, storage: StorageHeader) -> Self {
        self.message.storage = Some(storage);
        self
    }

    /// Finish the message, setting the argument count.
    pub fn build(mut self) -> Message {
        if let (Some(ext), Payload::Verbose(args)) =
            (&mut self.message.extended, &self.message.payload)
        {
            ext.noar = u8::try_from(args.len()).unwrap_or(u8::MAX);
        }
        self.message
    }
}
