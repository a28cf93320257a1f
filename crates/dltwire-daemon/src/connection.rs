use std::fmt;
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;

use dltwire_frame::{DecodeOptions, ReceiveMode, Receiver, DEFAULT_RECEIVE_BUFFER};
use dltwire_transport::{DltListener, DltStream};

/// Timer descriptors only ever deliver 8-byte expiration counters.
const TIMER_BUFFER: usize = 64;

/// Identifies a registered connection; doubles as its poll token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub(crate) usize);

impl ConnectionId {
    pub fn as_usize(self) -> usize {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Periodic housekeeping events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    OneSecond,
    SixtySeconds,
}

impl TimerKind {
    pub fn interval(self) -> Duration {
        match self {
            TimerKind::OneSecond => Duration::from_secs(1),
            TimerKind::SixtySeconds => Duration::from_secs(60),
        }
    }
}

/// What a descriptor is used for. Fixes receive capacity, framing and dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionKind {
    /// TCP listener accepting clients.
    ClientConnect,
    /// Connected client; receives every collected message.
    ClientTcp,
    /// Serial line client; frames carry the serial marker.
    ClientSerial,
    /// Unix listener accepting applications.
    AppConnect,
    /// Application channel (FIFO or accepted Unix socket).
    AppMsg,
    /// UDP socket receiving frames as datagrams.
    Udp,
    Timer(TimerKind),
}

impl ConnectionKind {
    pub fn receive_capacity(self) -> usize {
        match self {
            ConnectionKind::ClientConnect | ConnectionKind::AppConnect => 0,
            ConnectionKind::Timer(_) => TIMER_BUFFER,
            ConnectionKind::ClientTcp
            | ConnectionKind::ClientSerial
            | ConnectionKind::AppMsg
            | ConnectionKind::Udp => DEFAULT_RECEIVE_BUFFER,
        }
    }

    pub fn receive_mode(self) -> ReceiveMode {
        match self {
            ConnectionKind::Udp => ReceiveMode::Datagram,
            _ => ReceiveMode::Stream,
        }
    }

    pub fn decode_options(self) -> DecodeOptions {
        match self {
            ConnectionKind::ClientSerial => DecodeOptions::serial(),
            _ => DecodeOptions::default(),
        }
    }

    pub fn is_listener(self) -> bool {
        matches!(
            self,
            ConnectionKind::ClientConnect | ConnectionKind::AppConnect
        )
    }

    /// Connections that collected messages are forwarded to.
    pub fn is_client(self) -> bool {
        matches!(self, ConnectionKind::ClientTcp | ConnectionKind::ClientSerial)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionKind::ClientConnect => "client-connect",
            ConnectionKind::ClientTcp => "client-tcp",
            ConnectionKind::ClientSerial => "client-serial",
            ConnectionKind::AppConnect => "app-connect",
            ConnectionKind::AppMsg => "app-msg",
            ConnectionKind::Udp => "udp",
            ConnectionKind::Timer(TimerKind::OneSecond) => "timer-1s",
            ConnectionKind::Timer(TimerKind::SixtySeconds) => "timer-60s",
        }
    }
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Only active connections are in the poll set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Inactive,
    Active,
}

/// A descriptor handed to the multiplexer.
#[derive(Debug)]
pub enum Endpoint {
    Listener(DltListener),
    Stream(DltStream),
}

impl Endpoint {
    pub(crate) fn set_nonblocking(&self) -> dltwire_transport::Result<()> {
        match self {
            Endpoint::Listener(listener) => listener.set_nonblocking(true),
            Endpoint::Stream(stream) => stream.set_nonblocking(true),
        }
    }
}

impl From<DltListener> for Endpoint {
    fn from(listener: DltListener) -> Self {
        Endpoint::Listener(listener)
    }
}

impl From<DltStream> for Endpoint {
    fn from(stream: DltStream) -> Self {
        Endpoint::Stream(stream)
    }
}

impl AsRawFd for Endpoint {
    fn as_raw_fd(&self) -> RawFd {
        match self {
            Endpoint::Listener(listener) => listener.as_raw_fd(),
            Endpoint::Stream(stream) => stream.as_raw_fd(),
        }
    }
}

pub(crate) enum Source {
    Listener(DltListener),
    Stream(Receiver<DltStream>),
}

/// One registered descriptor with its receive buffer.
pub struct Connection {
    id: ConnectionId,
    kind: ConnectionKind,
    pub(crate) state: ConnectionState,
    /// Deactivated because a write would have blocked.
    pub(crate) throttled: bool,
    fd: RawFd,
    pub(crate) source: Source,
}

impl Connection {
    pub(crate) fn new(id: ConnectionId, kind: ConnectionKind, endpoint: Endpoint) -> Self {
        let fd = endpoint.as_raw_fd();
        let source = match endpoint {
            Endpoint::Listener(listener) => Source::Listener(listener),
            Endpoint::Stream(stream) => Source::Stream(Receiver::with_capacity(
                stream,
                kind.receive_capacity(),
                kind.receive_mode(),
            )),
        };
        Self {
            id,
            kind,
            state: ConnectionState::Inactive,
            throttled: false,
            fd,
            source,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn kind(&self) -> ConnectionKind {
        self.kind
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == ConnectionState::Active
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Receive buffer of stream connections.
    pub fn receiver(&self) -> Option<&Receiver<DltStream>> {
        match &self.source {
            Source::Stream(receiver) => Some(receiver),
            Source::Listener(_) => None,
        }
    }

    pub(crate) fn stream_mut(&mut self) -> Option<&mut DltStream> {
        match &mut self.source {
            Source::Stream(receiver) => Some(receiver.get_mut()),
            Source::Listener(_) => None,
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("fd", &self.fd)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::net::UnixStream;

    use super::*;

    #[test]
    fn kinds_fix_receive_behaviour() {
        assert_eq!(
            ConnectionKind::Udp.receive_mode(),
            ReceiveMode::Datagram
        );
        assert!(ConnectionKind::ClientSerial.decode_options().resync);
        assert!(!ConnectionKind::ClientTcp.decode_options().resync);
        assert_eq!(
            ConnectionKind::AppMsg.receive_capacity(),
            DEFAULT_RECEIVE_BUFFER
        );
        assert!(ConnectionKind::ClientConnect.is_listener());
        assert!(ConnectionKind::ClientSerial.is_client());
        assert!(!ConnectionKind::AppMsg.is_client());
        assert_eq!(
            ConnectionKind::Timer(TimerKind::SixtySeconds).to_string(),
            "timer-60s"
        );
    }

    #[test]
    fn stream_connection_starts_inactive_with_receiver() {
        let (left, _right) = UnixStream::pair().unwrap();
        let fd = left.as_raw_fd();
        let connection = Connection::new(
            ConnectionId(3),
            ConnectionKind::AppMsg,
            Endpoint::Stream(DltStream::from_unix(left)),
        );

        assert_eq!(connection.state(), ConnectionState::Inactive);
        assert_eq!(connection.fd(), fd);
        assert_eq!(connection.id().to_string(), "#3");
        let receiver = connection.receiver().unwrap();
        assert_eq!(receiver.capacity(), DEFAULT_RECEIVE_BUFFER);
    }
}
