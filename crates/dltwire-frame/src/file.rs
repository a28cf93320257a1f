use std::io::Read;

use tracing::{debug, warn};

use crate::codec::{decode_message, DecodeOptions, DEFAULT_MAX_MESSAGE};
use crate::error::{FrameError, Result};
use crate::filter::Filter;
use crate::message::Message;
use crate::protocol::{STORAGE_HEADER_SIZE, STORAGE_MAGIC};
use crate::receiver::{ReceiveMode, Receiver};

const FILE_BUFFER: usize = 2 * (STORAGE_HEADER_SIZE + DEFAULT_MAX_MESSAGE);

/// Reads messages from a stored trace file (storage header before every frame).
///
/// Damaged regions are skipped by searching for the next storage header.
pub struct FileReader<R> {
    receiver: Receiver<R>,
    options: DecodeOptions,
    filter: Filter,
    eof: bool,
    messages: u64,
    skipped_bytes: u64,
}

impl<R: Read> FileReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_filter(inner, Filter::default())
    }

    pub fn with_filter(inner: R, filter: Filter) -> Self {
        Self {
            receiver: Receiver::with_capacity(inner, FILE_BUFFER, ReceiveMode::Stream),
            options: DecodeOptions::storage(),
            filter,
            eof: false,
            messages: 0,
            skipped_bytes: 0,
        }
    }

    /// Next message passing the filter, or `None` at end of file.
    pub fn next_message(&mut self) -> Result<Option<Message>> {
        loop {
            match decode_message(self.receiver.window(), &self.options) {
                Ok(Some(decoded)) => {
                    self.receiver.remove(decoded.consumed)?;
                    self.messages += 1;
                    if self.filter.matches(&decoded.message) {
                        return Ok(Some(decoded.message));
                    }
                    continue;
                }
                Ok(None) => {}
                Err(FrameError::InvalidStorageHeader | FrameError::Content(_)) => {
                    self.skip_to_next_storage_header()?;
                    continue;
                }
                Err(err) => return Err(err),
            }

            if self.eof {
                let left = self.receiver.bytes_received();
                if left > 0 {
                    warn!(bytes = left, "truncated message at end of file");
                    self.skipped_bytes += left as u64;
                    self.receiver.clear();
                }
                return Ok(None);
            }

            self.receiver.move_to_begin();
            match self.receiver.receive() {
                Ok(_) => {}
                Err(FrameError::ConnectionClosed) => self.eof = true,
                Err(err) => return Err(err),
            }
        }
    }

    fn skip_to_next_storage_header(&mut self) -> Result<()> {
        let window = self.receiver.window();
        let skip = window
            .get(1..)
            .and_then(|rest| {
                rest.windows(STORAGE_MAGIC.len())
                    .position(|w| w == STORAGE_MAGIC)
            })
            .map(|pos| pos + 1)
            .unwrap_or(window.len().max(1));
        debug!(skip, "resynchronising on storage header");
        self.skipped_bytes += skip as u64;
        self.receiver.remove(skip)
    }

    /// Messages decoded so far, including filtered ones.
    pub fn messages(&self) -> u64 {
        self.messages
    }

    /// Bytes dropped while resynchronising.
    pub fn skipped_bytes(&self) -> u64 {
        self.skipped_bytes
    }
}

impl<R: Read> Iterator for FileReader<R> {
    type Item = Result<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_message().transpose()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BytesMut;

    use super::*;
    use crate::argument::Argument;
    use crate::filter::FilterEntry;
    use crate::header::StorageHeader;
    use crate::message::MessageBuilder;
    use crate::protocol::{DltId, LogLevel};
    use crate::writer::{MessageWriter, WriterConfig};

    fn stored(level: LogLevel, ctid: &str, text: &str) -> Message {
        MessageBuilder::log(level, "APP", ctid)
            .arg(Argument::string(text))
            .build()
            .with_storage_header(StorageHeader {
                seconds: 1,
                microseconds: 2,
                ecu: DltId::new("ECU1"),
            })
    }

    fn write_file(messages: &[Message]) -> Vec<u8> {
        let mut writer =
            MessageWriter::with_config(Vec::new(), WriterConfig::storage(DltId::new("ECU1")));
        for message in messages {
            writer.write_message(message).unwrap();
        }
        writer.into_inner()
    }

    #[test]
    fn reads_all_messages() {
        let messages = vec![
            stored(LogLevel::Info, "C1", "one"),
            stored(LogLevel::Warn, "C2", "two"),
            stored(LogLevel::Error, "C1", "three"),
        ];
        let reader = FileReader::new(Cursor::new(write_file(&messages)));
        let read: Vec<Message> = reader.map(|m| m.unwrap()).collect();
        assert_eq!(read, messages);
    }

    #[test]
    fn filter_is_applied() {
        let messages = vec![
            stored(LogLevel::Info, "C1", "one"),
            stored(LogLevel::Warn, "C2", "two"),
            stored(LogLevel::Error, "C1", "three"),
        ];
        let filter = Filter::new(vec![FilterEntry {
            ctid: Some(DltId::new("C1")),
            ..FilterEntry::default()
        }]);
        let mut reader = FileReader::with_filter(Cursor::new(write_file(&messages)), filter);

        let read: Vec<Message> = reader.by_ref().map(|m| m.unwrap()).collect();
        assert_eq!(read, vec![messages[0].clone(), messages[2].clone()]);
        assert_eq!(reader.messages(), 3);
    }

    #[test]
    fn garbage_between_messages_is_skipped() {
        let first = stored(LogLevel::Info, "C1", "before");
        let second = stored(LogLevel::Info, "C1", "after");

        let mut bytes = write_file(&[first.clone()]);
        bytes.extend_from_slice(b"\x00garbage\xff");
        bytes.extend_from_slice(&write_file(&[second.clone()]));

        let mut reader = FileReader::new(Cursor::new(bytes));
        assert_eq!(reader.next_message().unwrap(), Some(first));
        assert_eq!(reader.next_message().unwrap(), Some(second));
        assert_eq!(reader.next_message().unwrap(), None);
        assert_eq!(reader.skipped_bytes(), 9);
    }

    #[test]
    fn truncated_tail_ends_cleanly() {
        let message = stored(LogLevel::Info, "C1", "complete");
        let mut bytes = write_file(&[message.clone(), message.clone()]);
        bytes.truncate(bytes.len() - 5);

        let mut reader = FileReader::new(Cursor::new(bytes));
        assert_eq!(reader.next_message().unwrap(), Some(message));
        assert_eq!(reader.next_message().unwrap(), None);
        assert!(reader.skipped_bytes() > 0);
    }

    #[test]
    fn empty_file_has_no_messages() {
        let mut reader = FileReader::new(Cursor::new(BytesMut::new().to_vec()));
        assert!(reader.next_message().unwrap().is_none());
    }
}
