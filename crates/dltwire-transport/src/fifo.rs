use std::ffi::CString;
use std::fs::OpenOptions;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::path::Path;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::DltStream;

/// Default permission mode for a created FIFO.
pub const DEFAULT_FIFO_MODE: u32 = 0o620;

/// Create (if needed) and open a named pipe for reading application logs.
///
/// The FIFO is opened read-write so the descriptor never reports end of file
/// while no writer is attached, and non-blocking so it can sit in a poll set.
pub fn open_fifo(path: impl AsRef<Path>, mode: u32) -> Result<DltStream> {
    let path = path.as_ref();
    let open_err = |source: std::io::Error| TransportError::Open {
        path: path.to_path_buf(),
        source,
    };

    match std::fs::symlink_metadata(path) {
        Ok(metadata) if metadata.file_type().is_fifo() => {
            debug!(?path, "reusing existing fifo");
        }
        Ok(_) => {
            return Err(open_err(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "existing path is not a fifo",
            )));
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| {
                open_err(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "path contains an interior NUL byte",
                ))
            })?;
            // SAFETY: `c_path` is a valid NUL terminated string for the duration of the call.
            if unsafe { libc::mkfifo(c_path.as_ptr(), mode as libc::mode_t) } != 0 {
                return Err(open_err(std::io::Error::last_os_error()));
            }
            std::fs::set_permissions(
                path,
                std::os::unix::fs::PermissionsExt::from_mode(mode),
            )
            .map_err(open_err)?;
        }
        Err(err) => return Err(open_err(err)),
    }

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
        .map_err(open_err)?;

    info!(?path, "opened fifo");
    Ok(DltStream::from_file(file))
}
