use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::{DltListener, DltStream};

/// Default DLT port used by daemons and viewers.
pub const DEFAULT_PORT: u16 = 3490;

/// TCP endpoint helpers.
pub struct TcpTransport;

impl TcpTransport {
    /// Bind a listening socket for DLT clients.
    pub fn bind(addr: impl ToSocketAddrs + std::fmt::Debug) -> Result<DltListener> {
        let shown = format!("{addr:?}");
        let listener = TcpListener::bind(&addr).map_err(|source| TransportError::Bind {
            addr: shown.clone(),
            source,
        })?;
        let local = listener.local_addr().ok();
        info!(addr = %shown, ?local, "listening for tcp clients");
        Ok(DltListener::Tcp(listener))
    }

    /// Local address of a TCP listener, if the listener is TCP.
    pub fn local_addr(listener: &DltListener) -> Option<SocketAddr> {
        match listener {
            DltListener::Tcp(listener) => listener.local_addr().ok(),
            #[cfg(unix)]
            DltListener::Unix(_) => None,
        }
    }
}

/// Connect to a DLT daemon (blocking), with an optional connect timeout.
pub fn connect_tcp(addr: &str, timeout: Option<Duration>) -> Result<DltStream> {
    let connect_err = |source: std::io::Error| TransportError::Connect {
        addr: addr.to_string(),
        source,
    };

    let stream = match timeout {
        Some(timeout) => {
            let resolved = addr
                .to_socket_addrs()
                .map_err(connect_err)?
                .next()
                .ok_or_else(|| {
                    connect_err(std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "address resolved to nothing",
                    ))
                })?;
            TcpStream::connect_timeout(&resolved, timeout).map_err(connect_err)?
        }
        None => TcpStream::connect(addr).map_err(connect_err)?,
    };
    stream.set_nodelay(true)?;
    debug!(%addr, "connected to dlt daemon");
    Ok(DltStream::from_tcp(stream))
}

/// Bind a UDP socket that receives DLT datagrams.
pub fn bind_udp(addr: impl ToSocketAddrs + std::fmt::Debug) -> Result<DltStream> {
    let shown = format!("{addr:?}");
    let socket = UdpSocket::bind(&addr).map_err(|source| TransportError::Bind {
        addr: shown.clone(),
        source,
    })?;
    let local = socket.local_addr().ok();
    info!(addr = %shown, ?local, "listening for udp datagrams");
    Ok(DltStream::from_udp(socket))
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use super::*;

    #[test]
    fn tcp_bind_accept_connect() {
        let listener = TcpTransport::bind("127.0.0.1:0").unwrap();
        let addr = TcpTransport::local_addr(&listener).unwrap();

        let client = std::thread::spawn(move || {
            let mut stream = connect_tcp(&addr.to_string(), Some(Duration::from_secs(2))).unwrap();
            stream.write_all(b"hello").unwrap();
        });

        let mut server = listener.accept().unwrap();
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        assert_eq!(server.transport_name(), "tcp");
        client.join().unwrap();
    }

    #[test]
    fn connect_refused_reports_address() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = connect_tcp(&addr.to_string(), None).unwrap_err();
        assert!(matches!(err, TransportError::Connect { addr: ref a, .. } if *a == addr.to_string()));
    }

    #[test]
    fn udp_stream_reads_whole_datagrams() {
        let mut receiver = bind_udp("127.0.0.1:0").unwrap();
        assert!(receiver.is_datagram());

        let local = receiver.local_addr().unwrap();
        assert!(local.port() != 0);

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(b"first", local).unwrap();
        sender.send_to(b"second", local).unwrap();

        let mut buf = [0u8; 64];
        let n = receiver.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"first");
        let n = receiver.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"second");
    }

    #[cfg(unix)]
    #[test]
    fn local_addr_is_reported_for_sockets_only() {
        let listener = TcpTransport::bind("127.0.0.1:0").unwrap();
        let addr = TcpTransport::local_addr(&listener).unwrap();
        let stream = connect_tcp(&addr.to_string(), None).unwrap();
        assert_eq!(stream.local_addr().unwrap().ip(), addr.ip());

        let (local, _remote) = std::os::unix::net::UnixStream::pair().unwrap();
        let err = DltStream::from_unix(local).local_addr().unwrap_err();
        assert!(matches!(err, TransportError::Unsupported(_)));
    }
}
