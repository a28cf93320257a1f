use std::fs::OpenOptions;
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use tracing::info;

use crate::error::{Result, TransportError};
use crate::traits::DltStream;

/// Baud rate used when none is configured.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Map a numeric baud rate onto its termios speed constant.
pub fn baud_rate(baud: u32) -> Result<libc::speed_t> {
    let speed = match baud {
        300 => libc::B300,
        600 => libc::B600,
        1200 => libc::B1200,
        2400 => libc::B2400,
        4800 => libc::B4800,
        9600 => libc::B9600,
        19_200 => libc::B19200,
        38_400 => libc::B38400,
        57_600 => libc::B57600,
        115_200 => libc::B115200,
        230_400 => libc::B230400,
        #[cfg(target_os = "linux")]
        460_800 => libc::B460800,
        #[cfg(target_os = "linux")]
        921_600 => libc::B921600,
        other => return Err(TransportError::InvalidBaudRate(other)),
    };
    Ok(speed)
}

/// Open a serial line in raw mode at the given baud rate.
///
/// The descriptor is non-blocking and not the controlling terminal.
pub fn open_serial(path: impl AsRef<Path>, baud: u32) -> Result<DltStream> {
    let path = path.as_ref();
    let speed = baud_rate(baud)?;
    let open_err = |source: std::io::Error| TransportError::Open {
        path: path.to_path_buf(),
        source,
    };

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
        .open(path)
        .map_err(open_err)?;

    configure_raw(file.as_raw_fd(), speed).map_err(open_err)?;
    info!(?path, baud, "opened serial line");
    Ok(DltStream::from_file(file))
}

fn configure_raw(fd: std::os::fd::RawFd, speed: libc::speed_t) -> std::io::Result<()> {
    // SAFETY: termios is plain data; zeroed is a valid value that tcgetattr overwrites.
    let mut tio: libc::termios = unsafe { std::mem::zeroed() };
    // SAFETY: `fd` is an open descriptor and `tio` is a valid termios out-parameter.
    if unsafe { libc::tcgetattr(fd, &mut tio) } != 0 {
        return Err(std::io::Error::last_os_error());
    }

    // SAFETY: `tio` was initialised by tcgetattr above.
    unsafe {
        libc::cfmakeraw(&mut tio);
        if libc::cfsetispeed(&mut tio, speed) != 0 || libc::cfsetospeed(&mut tio, speed) != 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    tio.c_cflag |= libc::CLOCAL | libc::CREAD;
    tio.c_cc[libc::VMIN] = 0;
    tio.c_cc[libc::VTIME] = 0;

    // SAFETY: `fd` is open and `tio` is fully initialised.
    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &tio) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}
