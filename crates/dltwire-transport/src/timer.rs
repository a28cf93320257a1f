use std::fs::File;
use std::os::fd::FromRawFd;
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::DltStream;

/// Open a periodic timer descriptor that becomes readable every `interval`.
///
/// Each readable event carries an 8-byte expiration count which the reader
/// must consume to re-arm readiness.
pub fn open_timer(interval: Duration) -> Result<DltStream> {
    if interval.is_zero() {
        return Err(TransportError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "timer interval must be non-zero",
        )));
    }

    // SAFETY: plain syscall; the returned descriptor is checked before use.
    let fd = unsafe {
        libc::timerfd_create(
            libc::CLOCK_MONOTONIC,
            libc::TFD_NONBLOCK | libc::TFD_CLOEXEC,
        )
    };
    if fd < 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    // SAFETY: `fd` was just created and is exclusively owned here.
    let file = unsafe { File::from_raw_fd(fd) };

    let spec = libc::timespec {
        tv_sec: interval.as_secs() as libc::time_t,
        tv_nsec: interval.subsec_nanos() as libc::c_long,
    };
    let value = libc::itimerspec {
        it_interval: spec,
        it_value: spec,
    };
    // SAFETY: `fd` is a valid timerfd and `value` outlives the call.
    if unsafe { libc::timerfd_settime(fd, 0, &value, std::ptr::null_mut()) } != 0 {
        return Err(std::io::Error::last_os_error().into());
    }

    debug!(?interval, "armed timer");
    Ok(DltStream::from_file(file))
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;

    #[test]
    fn timer_fires_and_reports_expirations() {
        let mut timer = open_timer(Duration::from_millis(10)).unwrap();
        std::thread::sleep(Duration::from_millis(40));

        let mut buf = [0u8; 8];
        let n = timer.read(&mut buf).unwrap();
        assert_eq!(n, 8);
        assert!(u64::from_ne_bytes(buf) >= 1);

        let err = timer.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::WouldBlock);
    }

    #[test]
    fn zero_interval_is_rejected() {
        assert!(open_timer(Duration::ZERO).is_err());
    }
}
