use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use dltwire_frame::{DltId, MessageWriter, RotationPolicy, WriterConfig};

use crate::error::Result;

/// Moves the stored trace file aside once it reaches `max_bytes`.
///
/// The previous generation is kept as `<path>.1` and replaced on the next
/// rotation.
pub struct SizeRotation {
    path: PathBuf,
    max_bytes: u64,
}

impl SizeRotation {
    pub fn new(path: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            path: path.into(),
            max_bytes,
        }
    }

    pub fn rotated_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".1");
        PathBuf::from(name)
    }
}

impl RotationPolicy<File> for SizeRotation {
    fn after_write(&mut self, bytes_written: u64) -> std::io::Result<Option<File>> {
        if bytes_written < self.max_bytes {
            return Ok(None);
        }
        let rotated = self.rotated_path();
        std::fs::rename(&self.path, &rotated)?;
        debug!(from = %self.path.display(), to = %rotated.display(), "stored trace rotated");
        File::create(&self.path).map(Some)
    }
}

/// Open (appending) the stored trace file at `path`.
pub fn open_storage(
    path: &Path,
    ecu: DltId,
    max_bytes: Option<u64>,
) -> Result<MessageWriter<File>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let existing = file.metadata()?.len();
    let mut writer = MessageWriter::with_config(file, WriterConfig::storage(ecu));
    writer.set_bytes_written(existing);
    if let Some(max_bytes) = max_bytes {
        writer.set_rotation(Box::new(SizeRotation::new(path, max_bytes)));
    }
    info!(path = %path.display(), existing, ?max_bytes, "storing messages");
    Ok(writer)
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use dltwire_frame::{Argument, FileReader, LogLevel, MessageBuilder};

    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "dltwire-storage-{name}-{}-{nanos}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn messages_are_stored_with_storage_header() {
        let dir = temp_dir("store");
        let path = dir.join("trace.dlt");
        let mut writer = open_storage(&path, DltId::new("ECU9"), None).unwrap();
        let message = MessageBuilder::log(LogLevel::Warn, "APP", "CTX")
            .arg(Argument::string("stored"))
            .build();
        writer.write_message(&message).unwrap();
        drop(writer);

        let mut reader = FileReader::new(File::open(&path).unwrap());
        let read = reader.next_message().unwrap().unwrap();
        assert_eq!(read.storage.unwrap().ecu, DltId::new("ECU9"));
        assert_eq!(read.payload_text(), message.payload_text());
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn rotation_moves_full_file_aside() {
        let dir = temp_dir("rotate");
        let path = dir.join("trace.dlt");
        let mut writer = open_storage(&path, DltId::new("ECU1"), Some(1)).unwrap();
        let message = MessageBuilder::log(LogLevel::Info, "APP", "CTX")
            .arg(Argument::string("rotated"))
            .build();
        writer.write_message(&message).unwrap();

        let rotated = SizeRotation::new(&path, 1).rotated_path();
        assert!(std::fs::metadata(&rotated).unwrap().len() > 0);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
        assert_eq!(writer.bytes_written(), 0);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn reopened_file_counts_toward_rotation() {
        let dir = temp_dir("reopen");
        let path = dir.join("trace.dlt");
        let message = MessageBuilder::log(LogLevel::Info, "APP", "CTX")
            .arg(Argument::string("again"))
            .build();

        let mut first = open_storage(&path, DltId::new("ECU1"), None).unwrap();
        first.write_message(&message).unwrap();
        let one = first.bytes_written();
        drop(first);

        let mut second = open_storage(&path, DltId::new("ECU1"), Some(one * 3 / 2)).unwrap();
        assert_eq!(second.bytes_written(), one);
        second.write_message(&message).unwrap();

        let rotated = SizeRotation::new(&path, 1).rotated_path();
        assert_eq!(std::fs::metadata(&rotated).unwrap().len(), one * 2);
        assert_eq!(second.bytes_written(), 0);
        std::fs::remove_dir_all(dir).unwrap();
    }
}
