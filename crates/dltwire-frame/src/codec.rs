use bytes::{BufMut, Bytes, BytesMut};

use crate::argument::{decode_arguments, WireCursor};
use crate::error::{FrameError, Result};
use crate::header::{ExtendedHeader, HeaderExtra, StandardHeader, StorageHeader};
use crate::message::{Message, Payload};
use crate::protocol::{
    htyp, EXTENDED_HEADER_SIZE, SERIAL_HEADER, STANDARD_HEADER_SIZE, STORAGE_HEADER_SIZE,
};

/// Largest frame the 16-bit length field can describe.
pub const DEFAULT_MAX_MESSAGE: usize = u16::MAX as usize;

/// Options for [`decode_message`].
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /// Scan for the serial marker and require it before every frame.
    pub resync: bool,
    /// Frames are prefixed by a storage header (stored trace files).
    pub storage_header: bool,
    /// Frames announcing a larger total length are rejected.
    pub max_message_size: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            resync: false,
            storage_header: false,
            max_message_size: DEFAULT_MAX_MESSAGE,
        }
    }
}

impl DecodeOptions {
    /// Options for reading stored trace files.
    pub fn storage() -> Self {
        Self {
            storage_header: true,
            ..Self::default()
        }
    }

    /// Options for serial lines, where frames are found by their marker.
    pub fn serial() -> Self {
        Self {
            resync: true,
            ..Self::default()
        }
    }
}

/// A decoded message and how much of the window it used.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub message: Message,
    /// Bytes to remove from the window, including skipped garbage and markers.
    pub consumed: usize,
    /// Garbage bytes skipped before the serial marker.
    pub resync_offset: usize,
}

/// Decode one message from the start of `src`.
///
/// Returns `Ok(None)` if the window doesn't contain a complete message yet.
/// Nothing is consumed from `src`; the caller removes `consumed` bytes.
pub fn decode_message(src: &[u8], opts: &DecodeOptions) -> Result<Option<Decoded>> {
    let mut offset = 0usize;
    let mut resync_offset = 0usize;

    if opts.resync {
        match find_serial_header(src) {
            Some(pos) => {
                resync_offset = pos;
                offset = pos + SERIAL_HEADER.len();
            }
            None => {
                // Keep a possible partial marker at the end of the window.
                let discard = src.len().saturating_sub(SERIAL_HEADER.len() - 1);
                if discard == 0 {
                    return Ok(None);
                }
                return Err(FrameError::MissingSerialMarker { discard });
            }
        }
    } else if src.starts_with(&SERIAL_HEADER) {
        offset = SERIAL_HEADER.len();
    }

    let storage = if opts.storage_header {
        let Some(raw) = src.get(offset..offset + STORAGE_HEADER_SIZE) else {
            return Ok(None);
        };
        let storage = StorageHeader::decode(raw)?;
        offset += STORAGE_HEADER_SIZE;
        Some(storage)
    } else {
        None
    };

    let frame = &src[offset..];
    let Some(standard) = StandardHeader::decode(frame) else {
        return Ok(None);
    };
    let headers_size = standard.headers_size();
    if frame.len() < headers_size {
        return Ok(None);
    }

    let total = usize::from(standard.len);
    if total < headers_size {
        return Err(FrameError::content(format!(
            "length {total} smaller than headers ({headers_size} bytes)"
        )));
    }
    if total > opts.max_message_size {
        return Err(FrameError::MessageTooLarge {
            size: total,
            max: opts.max_message_size,
        });
    }
    if frame.len() < total {
        return Ok(None);
    }

    let extra_end = STANDARD_HEADER_SIZE + crate::header::extra_size(standard.htyp);
    let extra = HeaderExtra::decode(standard.htyp, &frame[STANDARD_HEADER_SIZE..extra_end])?;
    let extended = if standard.has_extended_header() {
        Some(ExtendedHeader::decode(
            &frame[extra_end..extra_end + EXTENDED_HEADER_SIZE],
        )?)
    } else {
        None
    };

    let big_endian = standard.is_big_endian();
    let payload = decode_payload(&frame[headers_size..total], extended.as_ref(), big_endian)?;

    Ok(Some(Decoded {
        message: Message {
            storage,
            version: standard.version(),
            big_endian,
            counter: standard.counter,
            extra,
            extended,
            payload,
        },
        consumed: offset + total,
        resync_offset,
    }))
}

fn decode_payload(
    raw: &[u8],
    extended: Option<&ExtendedHeader>,
    big_endian: bool,
) -> Result<Payload> {
    match extended {
        Some(ext) if ext.is_verbose() => {
            Ok(Payload::Verbose(decode_arguments(raw, ext.noar, big_endian)?))
        }
        _ => {
            let mut cursor = WireCursor::new(raw, big_endian);
            let message_id = cursor
                .u32()
                .map_err(|_| FrameError::content("non-verbose payload shorter than message id"))?;
            let data = Bytes::copy_from_slice(cursor.take(cursor.remaining())?);
            Ok(Payload::NonVerbose { message_id, data })
        }
    }
}

/// Position of the first serial marker in `src`, scanning byte by byte.
pub fn find_serial_header(src: &[u8]) -> Option<usize> {
    src.windows(SERIAL_HEADER.len())
        .position(|window| window == SERIAL_HEADER)
}

/// Encode `message` (storage header included when present).
///
/// This is the exact inverse of [`decode_message`].
pub fn encode_message(message: &Message, dst: &mut BytesMut) -> Result<()> {
    if message.version > (htyp::VERSION_MASK >> htyp::VERSION_SHIFT) {
        return Err(FrameError::encode(format!(
            "protocol version {} does not fit in 3 bits",
            message.version
        )));
    }
    match (&message.payload, message.extended) {
        (Payload::Verbose(args), Some(ext)) => {
            if !ext.is_verbose() {
                return Err(FrameError::encode(
                    "verbose payload needs the verbose bit in the extended header",
                ));
            }
            if usize::from(ext.noar) != args.len() {
                return Err(FrameError::encode(format!(
                    "argument count {} does not match {} arguments",
                    ext.noar,
                    args.len()
                )));
            }
        }
        (Payload::Verbose(_), None) => {
            return Err(FrameError::encode("verbose payload needs an extended header"));
        }
        (Payload::NonVerbose { .. }, Some(ext)) if ext.is_verbose() => {
            return Err(FrameError::encode(
                "non-verbose payload with the verbose bit set",
            ));
        }
        (Payload::NonVerbose { .. }, _) => {}
    }

    let mut payload = BytesMut::new();
    message.write_payload(&mut payload)?;
    let Some(standard) = message.standard_header(payload.len()) else {
        return Err(FrameError::encode(format!(
            "message of {} bytes exceeds the 16-bit length field",
            message.headers_size() + payload.len()
        )));
    };

    if let Some(storage) = &message.storage {
        storage.encode(dst);
    }
    standard.encode(dst);
    message.extra.encode(dst);
    if let Some(ext) = &message.extended {
        ext.encode(dst);
    }
    dst.put_slice(&payload);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::argument::{Argument, Value};
    use crate::message::MessageBuilder;
    use crate::protocol::{DltId, LogLevel};

    fn encode(message: &Message) -> BytesMut {
        let mut buf = BytesMut::new();
        encode_message(message, &mut buf).unwrap();
        buf
    }

    fn sample_messages() -> Vec<Message> {
        vec![
            Message::non_verbose(7, vec![1u8, 2, 3]),
            MessageBuilder::log(LogLevel::Info, "APP", "CTX")
                .ecu("ECU1")
                .session_id(42)
                .timestamp(123_456)
                .counter(9)
                .arg(Argument::string("hello"))
                .arg(Argument::new(Value::I32(-5)).with_name("v").with_unit("ms"))
                .build(),
            MessageBuilder::log(LogLevel::Debug, "APP", "CTX")
                .big_endian(true)
                .arg(Argument::new(Value::U64(0x0102_0304_0506_0708)))
                .arg(Argument::new(Value::F32(1.5)))
                .build(),
            MessageBuilder::control(2, "DA1", "DC1", 0xF01, vec![0u8; 5])
                .big_endian(true)
                .build(),
            MessageBuilder::log(LogLevel::Fatal, "A", "B").build(),
        ]
    }

    #[test]
    fn encode_decode_roundtrip() {
        for message in sample_messages() {
            let buf = encode(&message);
            let decoded = decode_message(&buf, &DecodeOptions::default())
                .unwrap()
                .unwrap();
            assert_eq!(decoded.message, message);
            assert_eq!(decoded.consumed, buf.len());
            assert_eq!(decoded.resync_offset, 0);
        }
    }

    #[test]
    fn roundtrip_with_storage_header() {
        let message = sample_messages().remove(1).with_storage_header(StorageHeader {
            seconds: 1_700_000_000,
            microseconds: 250,
            ecu: DltId::new("ECU1"),
        });
        let buf = encode(&message);
        assert_eq!(&buf[..4], b"DLT\x01");

        let decoded = decode_message(&buf, &DecodeOptions::storage())
            .unwrap()
            .unwrap();
        assert_eq!(decoded.message, message);
    }

    #[test]
    fn non_verbose_without_extended_header() {
        // htyp: version 1, no optional headers; len = 4 header + 4 id + 1 byte.
        let raw = [0x20, 0x00, 0x00, 0x09, 0x01, 0x00, 0x00, 0x00, 0x7F];
        let decoded = decode_message(&raw, &DecodeOptions::default())
            .unwrap()
            .unwrap();

        assert!(decoded.message.payload.is_nonverbose());
        assert!(decoded.message.extended.is_none());
        assert_eq!(decoded.message.payload.message_id(), Some(1));
        match decoded.message.payload {
            Payload::NonVerbose { data, .. } => assert_eq!(data.as_ref(), &[0x7F]),
            Payload::Verbose(_) => unreachable!(),
        }
        assert_eq!(decoded.consumed, 9);
    }

    #[test]
    fn every_prefix_needs_more_bytes() {
        let buf = encode(&sample_messages()[1]);
        for cut in 0..buf.len() {
            let result = decode_message(&buf[..cut], &DecodeOptions::default()).unwrap();
            assert!(result.is_none(), "prefix of {cut} bytes decoded");
        }
    }

    #[test]
    fn length_below_headers_is_corrupt() {
        let raw = [0x21, 0x00, 0x00, 0x06, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert!(matches!(
            decode_message(&raw, &DecodeOptions::default()),
            Err(FrameError::Content(_))
        ));
    }

    #[test]
    fn short_non_verbose_payload_is_corrupt() {
        let raw = [0x20, 0x00, 0x00, 0x06, 0x01, 0x00];
        assert!(matches!(
            decode_message(&raw, &DecodeOptions::default()),
            Err(FrameError::Content(_))
        ));
    }

    #[test]
    fn oversized_message_is_rejected() {
        let buf = encode(&Message::non_verbose(1, vec![0u8; 64]));
        let opts = DecodeOptions {
            max_message_size: 16,
            ..DecodeOptions::default()
        };
        assert!(matches!(
            decode_message(&buf, &opts),
            Err(FrameError::MessageTooLarge { size: 72, max: 16 })
        ));
    }

    #[test]
    fn resync_skips_garbage_before_marker() {
        let message = Message::non_verbose(3, vec![9u8]);
        let mut buf = BytesMut::from(&b"\xff\xfegarbage"[..]);
        buf.extend_from_slice(&SERIAL_HEADER);
        encode_message(&message, &mut buf).unwrap();

        let decoded = decode_message(&buf, &DecodeOptions::serial())
            .unwrap()
            .unwrap();
        assert_eq!(decoded.resync_offset, 9);
        assert_eq!(decoded.consumed, buf.len());
        assert_eq!(decoded.message, message);
    }

    #[test]
    fn resync_without_marker_reports_discard() {
        let garbage = b"no marker in here";
        match decode_message(garbage, &DecodeOptions::serial()) {
            Err(FrameError::MissingSerialMarker { discard }) => {
                assert_eq!(discard, garbage.len() - 3)
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(decode_message(b"DL", &DecodeOptions::serial())
            .unwrap()
            .is_none());
    }

    #[test]
    fn serial_marker_is_skipped_without_resync() {
        let message = Message::non_verbose(5, Vec::<u8>::new());
        let mut buf = BytesMut::from(&SERIAL_HEADER[..]);
        encode_message(&message, &mut buf).unwrap();

        let decoded = decode_message(&buf, &DecodeOptions::default())
            .unwrap()
            .unwrap();
        assert_eq!(decoded.consumed, buf.len());
        assert_eq!(decoded.message, message);
    }

    #[test]
    fn bad_storage_magic_is_reported() {
        let mut buf = BytesMut::from(&b"XXXX"[..]);
        buf.extend_from_slice(&[0u8; 12]);
        encode_message(&Message::non_verbose(1, Vec::<u8>::new()), &mut buf).unwrap();
        assert!(matches!(
            decode_message(&buf, &DecodeOptions::storage()),
            Err(FrameError::InvalidStorageHeader)
        ));
    }

    #[test]
    fn inconsistent_messages_are_not_encoded() {
        let mut message = MessageBuilder::log(LogLevel::Info, "APP", "CTX")
            .arg(Argument::string("x"))
            .build();
        message.extended.as_mut().unwrap().noar = 3;
        let mut buf = BytesMut::new();
        assert!(matches!(
            encode_message(&message, &mut buf),
            Err(FrameError::Encode(_))
        ));

        let mut headless = message.clone();
        headless.extended = None;
        assert!(encode_message(&headless, &mut buf).is_err());

        let too_big = Message::non_verbose(1, vec![0u8; 70_000]);
        assert!(encode_message(&too_big, &mut buf).is_err());
        assert!(buf.is_empty());
    }

    #[test]
    fn header_fields_are_big_endian_payload_follows_flag() {
        let message = MessageBuilder::non_verbose(0x0A0B_0C0D, Vec::<u8>::new())
            .session_id(0x0102_0304)
            .build();
        let buf = encode(&message);
        assert_eq!(&buf[2..4], &[0x00, 0x0C]);
        assert_eq!(&buf[4..8], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&buf[8..12], &[0x0D, 0x0C, 0x0B, 0x0A]);
    }

    #[test]
    fn encoded_header_is_the_derived_standard_header() {
        let message = MessageBuilder::log(LogLevel::Warn, "APP", "CTX")
            .ecu("ECU1")
            .counter(9)
            .arg(Argument::string("derived"))
            .build();
        let buf = encode(&message);

        let decoded = StandardHeader::decode(&buf).unwrap();
        let payload_len = buf.len() - message.headers_size();
        assert_eq!(Some(decoded), message.standard_header(payload_len));
        assert_eq!(usize::from(decoded.len), buf.len());
        assert_eq!(decoded.counter, 9);
    }
}
