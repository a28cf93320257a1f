use std::fs::File;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, UdpSocket};

use tracing::debug;

use crate::error::{Result, TransportError};

/// A connected log transport. Implements Read + Write.
///
/// This is the fundamental I/O type returned by transport operations. Every
/// variant is backed by exactly one file descriptor, so a stream can be put
/// into a poll set directly.
pub struct DltStream {
    inner: DltStreamInner,
}

enum DltStreamInner {
    Tcp(TcpStream),
    Udp(UdpSocket),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
    /// FIFOs, serial ttys and timer descriptors.
    Fd(File),
}

impl Read for DltStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            DltStreamInner::Tcp(stream) => stream.read(buf),
            DltStreamInner::Udp(socket) => socket.recv_from(buf).map(|(n, _)| n),
            #[cfg(unix)]
            DltStreamInner::Unix(stream) => stream.read(buf),
            DltStreamInner::Fd(file) => file.read(buf),
        }
    }
}

impl Write for DltStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            DltStreamInner::Tcp(stream) => stream.write(buf),
            DltStreamInner::Udp(socket) => socket.send(buf),
            #[cfg(unix)]
            DltStreamInner::Unix(stream) => stream.write(buf),
            DltStreamInner::Fd(file) => file.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            DltStreamInner::Tcp(stream) => stream.flush(),
            DltStreamInner::Udp(_) => Ok(()),
            #[cfg(unix)]
            DltStreamInner::Unix(stream) => stream.flush(),
            DltStreamInner::Fd(file) => file.flush(),
        }
    }
}

impl DltStream {
    pub(crate) fn from_tcp(stream: TcpStream) -> Self {
        Self {
            inner: DltStreamInner::Tcp(stream),
        }
    }

    pub(crate) fn from_udp(socket: UdpSocket) -> Self {
        Self {
            inner: DltStreamInner::Udp(socket),
        }
    }

    /// Wrap a connected Unix domain socket stream.
    #[cfg(unix)]
    pub fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: DltStreamInner::Unix(stream),
        }
    }

    /// Wrap an already opened descriptor (FIFO, tty, timer).
    pub fn from_file(file: File) -> Self {
        Self {
            inner: DltStreamInner::Fd(file),
        }
    }

    /// Switch the underlying descriptor between blocking and non-blocking mode.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        match &self.inner {
            DltStreamInner::Tcp(stream) => stream.set_nonblocking(nonblocking)?,
            DltStreamInner::Udp(socket) => socket.set_nonblocking(nonblocking)?,
            #[cfg(unix)]
            DltStreamInner::Unix(stream) => stream.set_nonblocking(nonblocking)?,
            DltStreamInner::Fd(file) => set_fd_nonblocking(file, nonblocking)?,
        }
        Ok(())
    }

    /// Set read timeout on socket-backed streams. Descriptor-backed streams ignore it.
    pub fn set_read_timeout(&self, timeout: Option<std::time::Duration>) -> Result<()> {
        match &self.inner {
            DltStreamInner::Tcp(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            DltStreamInner::Udp(socket) => socket.set_read_timeout(timeout).map_err(Into::into),
            #[cfg(unix)]
            DltStreamInner::Unix(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            DltStreamInner::Fd(_) => Ok(()),
        }
    }

    /// Local socket address of a TCP or UDP stream.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        match &self.inner {
            DltStreamInner::Tcp(stream) => stream.local_addr().map_err(Into::into),
            DltStreamInner::Udp(socket) => socket.local_addr().map_err(Into::into),
            #[cfg(unix)]
            DltStreamInner::Unix(_) => Err(TransportError::Unsupported("unix socket address")),
            DltStreamInner::Fd(_) => Err(TransportError::Unsupported("descriptor address")),
        }
    }

    /// Whether reads return whole datagrams rather than a byte stream.
    pub fn is_datagram(&self) -> bool {
        matches!(self.inner, DltStreamInner::Udp(_))
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            DltStreamInner::Tcp(_) => "tcp",
            DltStreamInner::Udp(_) => "udp",
            #[cfg(unix)]
            DltStreamInner::Unix(_) => "unix-domain-socket",
            DltStreamInner::Fd(_) => "fd",
        }
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        let inner = match &self.inner {
            DltStreamInner::Tcp(stream) => DltStreamInner::Tcp(stream.try_clone()?),
            DltStreamInner::Udp(socket) => DltStreamInner::Udp(socket.try_clone()?),
            #[cfg(unix)]
            DltStreamInner::Unix(stream) => DltStreamInner::Unix(stream.try_clone()?),
            DltStreamInner::Fd(file) => DltStreamInner::Fd(file.try_clone()?),
        };
        Ok(Self { inner })
    }
}

#[cfg(unix)]
impl std::os::fd::AsRawFd for DltStream {
    fn as_raw_fd(&self) -> std::os::fd::RawFd {
        match &self.inner {
            DltStreamInner::Tcp(stream) => stream.as_raw_fd(),
            DltStreamInner::Udp(socket) => socket.as_raw_fd(),
            DltStreamInner::Unix(stream) => stream.as_raw_fd(),
            DltStreamInner::Fd(file) => file.as_raw_fd(),
        }
    }
}

impl std::fmt::Debug for DltStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DltStream")
            .field("type", &self.transport_name())
            .finish()
    }
}

#[cfg(unix)]
fn set_fd_nonblocking(file: &File, nonblocking: bool) -> std::io::Result<()> {
    use std::os::fd::AsRawFd;

    let fd = file.as_raw_fd();
    // SAFETY: `fd` is a valid descriptor owned by `file` for the duration of the call.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(std::io::Error::last_os_error());
    }
    let flags = if nonblocking {
        flags | libc::O_NONBLOCK
    } else {
        flags & !libc::O_NONBLOCK
    };
    // SAFETY: as above; F_SETFL only changes status flags of the open description.
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags) } < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_fd_nonblocking(_file: &File, _nonblocking: bool) -> std::io::Result<()> {
    Err(std::io::Error::from(std::io::ErrorKind::Unsupported))
}

/// An endpoint that accepts [`DltStream`] connections.
pub enum DltListener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(crate::uds::UnixDomainSocket),
}

impl DltListener {
    /// Accept the next pending connection.
    ///
    /// In non-blocking mode this returns an `Io` error of kind `WouldBlock`
    /// once the backlog is empty.
    pub fn accept(&self) -> Result<DltStream> {
        match self {
            DltListener::Tcp(listener) => {
                let (stream, addr) = listener.accept().map_err(|err| {
                    if err.kind() == std::io::ErrorKind::WouldBlock {
                        TransportError::Io(err)
                    } else {
                        TransportError::Accept(err)
                    }
                })?;
                debug!(%addr, "accepted tcp connection");
                Ok(DltStream::from_tcp(stream))
            }
            #[cfg(unix)]
            DltListener::Unix(socket) => socket.accept(),
        }
    }

    /// Switch the listening descriptor between blocking and non-blocking mode.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        match self {
            DltListener::Tcp(listener) => listener.set_nonblocking(nonblocking)?,
            #[cfg(unix)]
            DltListener::Unix(socket) => socket.set_nonblocking(nonblocking)?,
        }
        Ok(())
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match self {
            DltListener::Tcp(_) => "tcp-listener",
            #[cfg(unix)]
            DltListener::Unix(socket) => socket.transport_name(),
        }
    }
}

#[cfg(unix)]
impl std::os::fd::AsRawFd for DltListener {
    fn as_raw_fd(&self) -> std::os::fd::RawFd {
        match self {
            DltListener::Tcp(listener) => listener.as_raw_fd(),
            DltListener::Unix(socket) => socket.as_raw_fd(),
        }
    }
}

impl std::fmt::Debug for DltListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DltListener")
            .field("type", &self.transport_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_pair_roundtrip_through_stream() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = DltStream::from_unix(left);
        let mut reader = DltStream::from_unix(right);

        writer.write_all(b"DLS\x01").unwrap();
        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"DLS\x01");
        assert_eq!(reader.transport_name(), "unix-domain-socket");
        assert!(!reader.is_datagram());
    }

    #[test]
    fn nonblocking_empty_read_would_block() {
        let (_left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut reader = DltStream::from_unix(right);
        reader.set_nonblocking(true).unwrap();

        let mut buf = [0u8; 8];
        let err = reader.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::WouldBlock);
    }

    #[test]
    fn file_backed_stream_toggles_nonblocking() {
        let path = std::env::temp_dir().join(format!("dltwire-fd-{}", std::process::id()));
        std::fs::write(&path, b"abc").unwrap();
        let file = File::open(&path).unwrap();
        let mut stream = DltStream::from_file(file);

        stream.set_nonblocking(true).unwrap();
        stream.set_nonblocking(false).unwrap();
        let mut out = String::new();
        stream.read_to_string(&mut out).unwrap();
        assert_eq!(out, "abc");
        assert_eq!(stream.transport_name(), "fd");

        let _ = std::fs::remove_file(&path);
    }
}
