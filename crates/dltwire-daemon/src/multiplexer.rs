use std::collections::HashMap;
use std::io::ErrorKind;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Registry, Token};
use tracing::{debug, trace, warn};

use dltwire_frame::{
    decode_message, find_user_header, DecodeOptions, FrameError, Receiver, UserHeader,
    UserMessageKind, USER_HEADER_SIZE,
};
use dltwire_transport::{DltStream, TransportError};

use crate::connection::{
    Connection, ConnectionId, ConnectionKind, ConnectionState, Endpoint, Source, TimerKind,
};
use crate::error::{DaemonError, Result};
use crate::handler::{Clients, Handler};

/// Upper bound of one poll wait.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(1000);

const EVENTS_CAPACITY: usize = 256;

/// Bytes kept when no application header is found, a pattern may straddle reads.
const USER_HEADER_TAIL: usize = 3;

/// Single-threaded event loop over all daemon descriptors.
///
/// Readiness is edge-triggered: every readable descriptor is drained until
/// it would block before the loop moves on.
pub struct Multiplexer {
    poll: Poll,
    events: Events,
    connections: HashMap<ConnectionId, Connection>,
    by_fd: HashMap<RawFd, ConnectionId>,
    next_id: usize,
    timeout: Duration,
}

impl Multiplexer {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_POLL_TIMEOUT)
    }

    /// Create a multiplexer whose [`run`](Self::run) waits at most `timeout`
    /// per poll.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(EVENTS_CAPACITY),
            connections: HashMap::new(),
            by_fd: HashMap::new(),
            next_id: 0,
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    /// Connection registered for `fd`.
    pub fn find_fd(&self, fd: RawFd) -> Option<ConnectionId> {
        self.by_fd.get(&fd).copied()
    }

    /// Ids of all connections of `kind`, in registration order.
    pub fn ids_of(&self, kind: ConnectionKind) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self
            .connections
            .values()
            .filter(|connection| connection.kind() == kind)
            .map(Connection::id)
            .collect();
        ids.sort();
        ids
    }

    /// Take ownership of `endpoint` and add it to the loop.
    ///
    /// The descriptor is switched to non-blocking mode. With `activate` set it
    /// is polled right away, otherwise it stays inactive until
    /// [`activate`](Self::activate). A descriptor that is already registered
    /// keeps its connection and its id is returned.
    pub fn register(
        &mut self,
        endpoint: impl Into<Endpoint>,
        kind: ConnectionKind,
        activate: bool,
    ) -> Result<ConnectionId> {
        let endpoint = endpoint.into();
        let fd = endpoint.as_raw_fd();
        if let Some(&id) = self.by_fd.get(&fd) {
            debug!(%id, fd, "descriptor already registered");
            // The descriptor belongs to the registered connection.
            std::mem::forget(endpoint);
            return Ok(id);
        }

        let is_listener = matches!(endpoint, Endpoint::Listener(_));
        if is_listener != kind.is_listener() {
            return Err(DaemonError::EndpointMismatch(kind));
        }
        endpoint.set_nonblocking()?;

        let id = ConnectionId(self.next_id);
        self.next_id += 1;
        let mut connection = Connection::new(id, kind, endpoint);
        if activate {
            add_to_poll(self.poll.registry(), &mut connection)?;
        }

        debug!(%id, fd, %kind, active = activate, "connection registered");
        self.by_fd.insert(fd, id);
        self.connections.insert(id, connection);
        Ok(id)
    }

    /// Add the connection to the poll set.
    pub fn activate(&mut self, id: ConnectionId) -> Result<()> {
        let connection = self
            .connections
            .get_mut(&id)
            .ok_or(DaemonError::UnknownConnection(id))?;
        connection.throttled = false;
        if connection.is_active() {
            return Ok(());
        }
        add_to_poll(self.poll.registry(), connection)?;
        debug!(%id, "connection activated");
        Ok(())
    }

    /// Remove the connection from the poll set without closing it.
    pub fn deactivate(&mut self, id: ConnectionId) -> Result<()> {
        let connection = self
            .connections
            .get_mut(&id)
            .ok_or(DaemonError::UnknownConnection(id))?;
        if !connection.is_active() {
            return Ok(());
        }
        let fd = connection.fd();
        self.poll.registry().deregister(&mut SourceFd(&fd))?;
        connection.state = ConnectionState::Inactive;
        debug!(%id, "connection deactivated");
        Ok(())
    }

    /// Remove the connection and close its descriptor.
    pub fn unregister(&mut self, id: ConnectionId) -> Result<()> {
        let connection = self
            .connections
            .remove(&id)
            .ok_or(DaemonError::UnknownConnection(id))?;
        self.release(connection);
        Ok(())
    }

    pub fn unregister_fd(&mut self, fd: RawFd) -> Result<()> {
        let id = self
            .find_fd(fd)
            .ok_or(DaemonError::UnknownDescriptor(fd))?;
        self.unregister(id)
    }

    /// Poll once and dispatch every ready connection.
    ///
    /// Returns the number of ready connections. An interrupted poll counts
    /// as no event.
    pub fn poll_once<H: Handler + ?Sized>(
        &mut self,
        timeout: Option<Duration>,
        handler: &mut H,
    ) -> Result<usize> {
        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::Interrupted => return Ok(0),
            Err(err) => return Err(err.into()),
        }

        let ready: Vec<(ConnectionId, bool)> = self
            .events
            .iter()
            .map(|event| (ConnectionId(event.token().0), event.is_error()))
            .collect();
        for &(id, failed) in &ready {
            self.dispatch(id, failed, handler);
        }
        Ok(ready.len())
    }

    /// Poll until `running` is cleared.
    pub fn run<H: Handler + ?Sized>(
        &mut self,
        handler: &mut H,
        running: &AtomicBool,
    ) -> Result<()> {
        debug!(connections = self.len(), timeout = ?self.timeout, "event loop started");
        while running.load(Ordering::SeqCst) {
            self.poll_once(Some(self.timeout), handler)?;
        }
        debug!("event loop stopped");
        Ok(())
    }

    fn dispatch<H: Handler + ?Sized>(&mut self, id: ConnectionId, failed: bool, handler: &mut H) {
        // Taken out of the map so callbacks can borrow the other connections.
        let Some(mut connection) = self.connections.remove(&id) else {
            trace!(%id, "event for a closed connection");
            return;
        };
        if failed {
            warn!(%id, kind = %connection.kind(), "error condition on connection");
            self.teardown(connection, handler);
            return;
        }

        let outcome = match connection.kind() {
            ConnectionKind::ClientConnect | ConnectionKind::AppConnect => {
                self.accept_pending(&connection, handler);
                Ok(())
            }
            ConnectionKind::ClientTcp
            | ConnectionKind::ClientSerial
            | ConnectionKind::AppMsg
            | ConnectionKind::Udp => self.read_messages(&mut connection, handler),
            ConnectionKind::Timer(kind) => self.expire_timer(&mut connection, kind, handler),
        };

        match outcome {
            Ok(()) => {
                self.connections.insert(id, connection);
            }
            Err(DaemonError::Frame(FrameError::ConnectionClosed)) => {
                debug!(%id, kind = %connection.kind(), "connection closed by peer");
                self.teardown(connection, handler);
            }
            Err(err) => {
                warn!(%id, kind = %connection.kind(), error = %err, "connection failed");
                self.teardown(connection, handler);
            }
        }
    }

    fn accept_pending<H: Handler + ?Sized>(&mut self, connection: &Connection, handler: &mut H) {
        let Source::Listener(listener) = &connection.source else {
            return;
        };
        let kind = match connection.kind() {
            ConnectionKind::ClientConnect => ConnectionKind::ClientTcp,
            _ => ConnectionKind::AppMsg,
        };

        loop {
            let stream = match listener.accept() {
                Ok(stream) => stream,
                Err(TransportError::Io(err)) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) => {
                    warn!(listener = %connection.id(), error = %err, "accept failed");
                    break;
                }
            };
            match self.register(stream, kind, true) {
                Ok(id) if kind.is_client() => {
                    self.notify(handler, "client connected", |handler, clients| {
                        handler.on_client_connected(id, clients)
                    });
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "failed to register accepted connection"),
            }
        }
    }

    fn read_messages<H: Handler + ?Sized>(
        &mut self,
        connection: &mut Connection,
        handler: &mut H,
    ) -> Result<()> {
        let id = connection.id();
        let kind = connection.kind();
        let Source::Stream(receiver) = &mut connection.source else {
            return Ok(());
        };

        loop {
            let received = match receiver.receive() {
                Ok(received) => received,
                Err(FrameError::ReceiverFull { capacity }) => {
                    warn!(%id, capacity, "receive buffer full without a complete message");
                    receiver.clear();
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            if received == 0 {
                if receiver.would_block() {
                    return Ok(());
                }
                trace!(%id, "empty datagram");
                continue;
            }

            match kind {
                ConnectionKind::AppMsg => self.process_app_window(id, receiver, handler)?,
                _ => self.process_frame_window(id, kind, receiver, handler)?,
            }
            receiver.move_to_begin();
        }
    }

    /// Decode bare (or serial-marked) frames from the window.
    fn process_frame_window<H: Handler + ?Sized>(
        &mut self,
        id: ConnectionId,
        kind: ConnectionKind,
        receiver: &mut Receiver<DltStream>,
        handler: &mut H,
    ) -> Result<()> {
        let options = kind.decode_options();
        while receiver.bytes_received() > 0 {
            match decode_message(receiver.window(), &options) {
                Ok(Some(decoded)) => {
                    if decoded.resync_offset > 0 {
                        debug!(
                            %id,
                            skipped = decoded.resync_offset,
                            "resynchronised on serial marker"
                        );
                    }
                    receiver.remove(decoded.consumed)?;
                    let message = decoded.message;
                    self.notify(handler, "message", |handler, clients| {
                        handler.on_message(id, kind, message, clients)
                    });
                }
                Ok(None) => break,
                Err(FrameError::MissingSerialMarker { discard }) => {
                    debug!(%id, discard, "no serial marker in window");
                    receiver.remove(discard)?;
                    break;
                }
                Err(err) => {
                    // Without a marker to search for, the frame boundary is lost.
                    let skip = if options.resync {
                        1
                    } else {
                        receiver.bytes_received()
                    };
                    warn!(%id, error = %err, skip, "dropping malformed message");
                    receiver.remove(skip)?;
                }
            }
        }
        Ok(())
    }

    /// Decode application messages, each behind a `DUH\x01` header.
    fn process_app_window<H: Handler + ?Sized>(
        &mut self,
        id: ConnectionId,
        receiver: &mut Receiver<DltStream>,
        handler: &mut H,
    ) -> Result<()> {
        let options = DecodeOptions::default();
        loop {
            let window = receiver.window();
            let header = match UserHeader::decode(window) {
                Ok(Some(header)) => header,
                Ok(None) => return Ok(()),
                Err(_) => {
                    let skip = find_user_header(window)
                        .unwrap_or(window.len() - USER_HEADER_TAIL);
                    warn!(%id, skip, "resynchronising on application header");
                    receiver.remove(skip)?;
                    continue;
                }
            };

            match header.kind {
                UserMessageKind::Log => {
                    match decode_message(&window[USER_HEADER_SIZE..], &options) {
                        Ok(Some(decoded)) => {
                            receiver.remove(USER_HEADER_SIZE + decoded.consumed)?;
                            let message = decoded.message;
                            self.notify(handler, "message", |handler, clients| {
                                handler.on_message(id, ConnectionKind::AppMsg, message, clients)
                            });
                        }
                        Ok(None) => return Ok(()),
                        Err(err) => {
                            warn!(%id, error = %err, "dropping malformed application message");
                            receiver.remove(USER_HEADER_SIZE)?;
                        }
                    }
                }
                UserMessageKind::LogShm => {
                    receiver.remove(USER_HEADER_SIZE)?;
                    self.notify(handler, "shared ring notification", |handler, clients| {
                        handler.on_shm_notification(id, clients)
                    });
                }
                other => {
                    debug!(%id, kind = other.raw(), "unsupported application message");
                    receiver.remove(USER_HEADER_SIZE)?;
                    self.notify(handler, "application message", |handler, clients| {
                        handler.on_user_message(id, other, clients)
                    });
                }
            }
        }
    }

    fn expire_timer<H: Handler + ?Sized>(
        &mut self,
        connection: &mut Connection,
        kind: TimerKind,
        handler: &mut H,
    ) -> Result<()> {
        let Source::Stream(receiver) = &mut connection.source else {
            return Ok(());
        };

        let mut expirations = 0u64;
        while receiver.receive()? > 0 {
            for chunk in receiver.window().chunks_exact(8) {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(chunk);
                expirations += u64::from_ne_bytes(raw);
            }
            receiver.clear();
        }
        if expirations == 0 {
            return Ok(());
        }

        if kind == TimerKind::OneSecond {
            self.reactivate_throttled();
        }
        self.notify(handler, "timer", |handler, clients| {
            handler.on_timer(kind, expirations, clients)
        });
        Ok(())
    }

    /// Put clients that were deactivated on a blocked write back in the poll set.
    fn reactivate_throttled(&mut self) {
        let registry = self.poll.registry();
        for connection in self.connections.values_mut() {
            if !connection.throttled {
                continue;
            }
            match add_to_poll(registry, connection) {
                Ok(()) => {
                    connection.throttled = false;
                    debug!(id = %connection.id(), "throttled client reactivated");
                }
                Err(err) => debug!(id = %connection.id(), error = %err, "reactivation failed"),
            }
        }
    }

    /// Run one handler callback with a view of the clients, then close the
    /// clients it failed to write to.
    fn notify<H, F>(&mut self, handler: &mut H, callback: &'static str, f: F)
    where
        H: Handler + ?Sized,
        F: FnOnce(&mut H, &mut Clients<'_>) -> Result<()>,
    {
        let mut clients = Clients::new(&mut self.connections, self.poll.registry());
        if let Err(err) = f(handler, &mut clients) {
            warn!(callback, error = %err, "handler failed");
        }
        for id in clients.into_closed() {
            if let Some(connection) = self.connections.remove(&id) {
                self.teardown(connection, handler);
            }
        }
    }

    fn teardown<H: Handler + ?Sized>(&mut self, connection: Connection, handler: &mut H) {
        let id = connection.id();
        let kind = connection.kind();
        self.release(connection);
        if kind.is_client() {
            self.notify(handler, "client disconnected", |handler, clients| {
                handler.on_client_disconnected(id, clients)
            });
        }
    }

    /// Deregister and close a connection already removed from the map.
    fn release(&mut self, connection: Connection) {
        let id = connection.id();
        let fd = connection.fd();
        self.by_fd.remove(&fd);
        if connection.is_active() {
            if let Err(err) = self.poll.registry().deregister(&mut SourceFd(&fd)) {
                trace!(%id, error = %err, "deregister failed");
            }
        }
        debug!(%id, kind = %connection.kind(), "connection unregistered");
    }
}

fn add_to_poll(registry: &Registry, connection: &mut Connection) -> Result<()> {
    let fd = connection.fd();
    registry.register(
        &mut SourceFd(&fd),
        Token(connection.id().as_usize()),
        Interest::READABLE,
    )?;
    connection.state = ConnectionState::Active;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::os::unix::net::UnixStream;

    use bytes::BytesMut;
    use dltwire_frame::{encode_message, Argument, LogLevel, Message, MessageBuilder};

    use super::*;

    #[derive(Default)]
    struct Recorder {
        messages: Vec<(ConnectionId, ConnectionKind, Message)>,
        shm_notifications: usize,
        user_messages: Vec<UserMessageKind>,
        connected: Vec<ConnectionId>,
        disconnected: Vec<ConnectionId>,
        timers: u64,
        forward: bool,
        delivered: usize,
    }

    impl Handler for Recorder {
        fn on_message(
            &mut self,
            source: ConnectionId,
            kind: ConnectionKind,
            message: Message,
            clients: &mut Clients<'_>,
        ) -> Result<()> {
            if self.forward {
                let mut frame = BytesMut::new();
                encode_message(&message, &mut frame)?;
                self.delivered += clients.broadcast(&frame);
            }
            self.messages.push((source, kind, message));
            Ok(())
        }

        fn on_shm_notification(&mut self, _: ConnectionId, _: &mut Clients<'_>) -> Result<()> {
            self.shm_notifications += 1;
            Ok(())
        }

        fn on_user_message(
            &mut self,
            _: ConnectionId,
            kind: UserMessageKind,
            _: &mut Clients<'_>,
        ) -> Result<()> {
            self.user_messages.push(kind);
            Ok(())
        }

        fn on_client_connected(&mut self, id: ConnectionId, _: &mut Clients<'_>) -> Result<()> {
            self.connected.push(id);
            Ok(())
        }

        fn on_client_disconnected(&mut self, id: ConnectionId, _: &mut Clients<'_>) -> Result<()> {
            self.disconnected.push(id);
            Ok(())
        }

        fn on_timer(&mut self, _: TimerKind, expirations: u64, _: &mut Clients<'_>) -> Result<()> {
            self.timers += expirations;
            Ok(())
        }
    }

    fn poll_until(mux: &mut Multiplexer, handler: &mut Recorder, done: impl Fn(&Recorder) -> bool) {
        for _ in 0..100 {
            if done(handler) {
                return;
            }
            mux.poll_once(Some(Duration::from_millis(50)), handler)
                .unwrap();
        }
        assert!(done(handler), "condition not reached");
    }

    fn sample(text: &str) -> Message {
        MessageBuilder::log(LogLevel::Info, "APP", "CTX")
            .arg(Argument::string(text))
            .build()
    }

    fn frame(message: &Message) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_message(message, &mut buf).unwrap();
        buf.to_vec()
    }

    fn app_frame(message: &Message) -> Vec<u8> {
        let mut buf = BytesMut::new();
        UserHeader::new(UserMessageKind::Log).encode(&mut buf);
        encode_message(message, &mut buf).unwrap();
        buf.to_vec()
    }

    fn pair(mux: &mut Multiplexer, kind: ConnectionKind) -> (ConnectionId, UnixStream) {
        let (local, remote) = UnixStream::pair().unwrap();
        let id = mux
            .register(DltStream::from_unix(local), kind, true)
            .unwrap();
        (id, remote)
    }

    #[test]
    fn register_activate_deactivate_unregister() {
        let mut mux = Multiplexer::new().unwrap();
        let (local, _remote) = UnixStream::pair().unwrap();
        let fd = local.as_raw_fd();

        let id = mux
            .register(DltStream::from_unix(local), ConnectionKind::AppMsg, false)
            .unwrap();
        assert_eq!(mux.find_fd(fd), Some(id));
        assert_eq!(mux.connection(id).unwrap().state(), ConnectionState::Inactive);

        mux.activate(id).unwrap();
        assert!(mux.connection(id).unwrap().is_active());
        mux.deactivate(id).unwrap();
        assert!(!mux.connection(id).unwrap().is_active());

        mux.unregister_fd(fd).unwrap();
        assert!(mux.is_empty());
        assert!(matches!(
            mux.unregister(id),
            Err(DaemonError::UnknownConnection(_))
        ));
        assert!(matches!(
            mux.activate(id),
            Err(DaemonError::UnknownConnection(_))
        ));
    }

    #[test]
    fn listener_kind_must_match_endpoint() {
        let mut mux = Multiplexer::new().unwrap();
        let (local, _remote) = UnixStream::pair().unwrap();
        let err = mux
            .register(DltStream::from_unix(local), ConnectionKind::ClientConnect, true)
            .unwrap_err();
        assert!(matches!(err, DaemonError::EndpointMismatch(_)));
    }

    #[test]
    fn application_messages_arrive_across_partial_writes() {
        let mut mux = Multiplexer::new().unwrap();
        let mut handler = Recorder::default();
        let (_, mut app) = pair(&mut mux, ConnectionKind::AppMsg);

        let mut bytes = app_frame(&sample("first"));
        bytes.extend_from_slice(&app_frame(&sample("second")));
        let split = bytes.len() / 2 + 3;
        app.write_all(&bytes[..split]).unwrap();
        poll_until(&mut mux, &mut handler, |h| h.messages.len() == 1);

        app.write_all(&bytes[split..]).unwrap();
        poll_until(&mut mux, &mut handler, |h| h.messages.len() == 2);

        assert_eq!(handler.messages[0].2, sample("first"));
        assert_eq!(handler.messages[1].2, sample("second"));
        assert_eq!(handler.messages[1].1, ConnectionKind::AppMsg);
    }

    #[test]
    fn application_garbage_and_control_kinds_are_skipped() {
        let mut mux = Multiplexer::new().unwrap();
        let mut handler = Recorder::default();
        let (_, mut app) = pair(&mut mux, ConnectionKind::AppMsg);

        let mut bytes = b"noise".to_vec();
        let mut header = BytesMut::new();
        UserHeader::new(UserMessageKind::RegisterApplication).encode(&mut header);
        UserHeader::new(UserMessageKind::LogShm).encode(&mut header);
        bytes.extend_from_slice(&header);
        bytes.extend_from_slice(&app_frame(&sample("after")));
        app.write_all(&bytes).unwrap();

        poll_until(&mut mux, &mut handler, |h| h.messages.len() == 1);
        assert_eq!(
            handler.user_messages,
            vec![UserMessageKind::RegisterApplication]
        );
        assert_eq!(handler.shm_notifications, 1);
        assert_eq!(handler.messages[0].2, sample("after"));
    }

    #[test]
    fn serial_clients_resync_on_marker() {
        let mut mux = Multiplexer::new().unwrap();
        let mut handler = Recorder::default();
        let (id, mut line) = pair(&mut mux, ConnectionKind::ClientSerial);

        let mut bytes = b"\x00\xffjunk".to_vec();
        bytes.extend_from_slice(b"DLS\x01");
        bytes.extend_from_slice(&frame(&sample("serial")));
        line.write_all(&bytes).unwrap();

        poll_until(&mut mux, &mut handler, |h| h.messages.len() == 1);
        assert_eq!(handler.messages[0].0, id);
        assert_eq!(handler.messages[0].2, sample("serial"));
    }

    #[test]
    fn malformed_tcp_frame_is_dropped_and_stream_continues() {
        let mut mux = Multiplexer::new().unwrap();
        let mut handler = Recorder::default();
        let (_, mut peer) = pair(&mut mux, ConnectionKind::ClientTcp);

        // Declared length shorter than the standard header.
        peer.write_all(&[0x20, 0, 0, 2]).unwrap();
        mux.poll_once(Some(Duration::from_millis(200)), &mut handler)
            .unwrap();
        assert!(handler.messages.is_empty());

        peer.write_all(&frame(&sample("valid"))).unwrap();
        poll_until(&mut mux, &mut handler, |h| h.messages.len() == 1);
        assert_eq!(mux.len(), 1);
    }

    #[test]
    fn closed_client_is_torn_down() {
        let mut mux = Multiplexer::new().unwrap();
        let mut handler = Recorder::default();
        let (id, peer) = pair(&mut mux, ConnectionKind::ClientTcp);

        drop(peer);
        poll_until(&mut mux, &mut handler, |h| h.disconnected == vec![id]);
        assert!(mux.connection(id).is_none());
    }

    #[test]
    fn messages_are_broadcast_to_clients() {
        let mut mux = Multiplexer::new().unwrap();
        let mut handler = Recorder {
            forward: true,
            ..Recorder::default()
        };
        let (_, mut first) = pair(&mut mux, ConnectionKind::ClientTcp);
        let (_, mut second) = pair(&mut mux, ConnectionKind::ClientTcp);
        let (_, mut app) = pair(&mut mux, ConnectionKind::AppMsg);

        app.write_all(&app_frame(&sample("fan out"))).unwrap();
        poll_until(&mut mux, &mut handler, |h| h.messages.len() == 1);
        assert_eq!(handler.delivered, 2);

        let expected = frame(&sample("fan out"));
        for client in [&mut first, &mut second] {
            let mut buf = vec![0u8; expected.len()];
            client.read_exact(&mut buf).unwrap();
            assert_eq!(buf, expected);
        }
    }

    #[test]
    fn tcp_listener_accepts_clients() {
        use dltwire_transport::{connect_tcp, TcpTransport};

        let mut mux = Multiplexer::new().unwrap();
        let mut handler = Recorder::default();
        let listener = TcpTransport::bind("127.0.0.1:0").unwrap();
        let addr = TcpTransport::local_addr(&listener).unwrap();
        mux.register(listener, ConnectionKind::ClientConnect, true)
            .unwrap();

        let _client = connect_tcp(&addr.to_string(), Some(Duration::from_secs(1))).unwrap();
        poll_until(&mut mux, &mut handler, |h| h.connected.len() == 1);

        let id = handler.connected[0];
        assert_eq!(
            mux.connection(id).unwrap().kind(),
            ConnectionKind::ClientTcp
        );
        assert_eq!(mux.ids_of(ConnectionKind::ClientTcp), vec![id]);
    }

    #[test]
    fn udp_datagrams_behind_empty_and_malformed_ones_are_delivered() {
        use std::net::UdpSocket;

        let mut mux = Multiplexer::new().unwrap();
        let mut handler = Recorder::default();
        let socket = dltwire_transport::bind_udp("127.0.0.1:0").unwrap();
        let addr = socket.local_addr().unwrap();
        let id = mux.register(socket, ConnectionKind::Udp, true).unwrap();

        let mut with_tail = frame(&sample("tail"));
        with_tail.extend_from_slice(b"xyz");
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(&[], addr).unwrap();
        sender.send_to(&frame(&sample("first")), addr).unwrap();
        sender.send_to(&[0x20, 0, 0, 2], addr).unwrap();
        sender.send_to(&with_tail, addr).unwrap();
        sender.send_to(&frame(&sample("last")), addr).unwrap();

        poll_until(&mut mux, &mut handler, |h| h.messages.len() == 3);
        let texts: Vec<_> = handler.messages.iter().map(|(_, _, m)| m.clone()).collect();
        assert_eq!(texts, vec![sample("first"), sample("tail"), sample("last")]);
        assert!(handler.messages.iter().all(|(source, kind, _)| {
            *source == id && *kind == ConnectionKind::Udp
        }));
        assert_eq!(mux.len(), 1);
    }

    #[test]
    fn fifo_application_messages_survive_writer_reopen() {
        use std::fs::OpenOptions;

        let dir = std::env::temp_dir().join(format!(
            "dltwire-mux-fifo-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("dlt");

        let mut mux = Multiplexer::new().unwrap();
        let mut handler = Recorder::default();
        let mode = dltwire_transport::fifo::DEFAULT_FIFO_MODE;
        let fifo = dltwire_transport::open_fifo(&path, mode).unwrap();
        let id = mux.register(fifo, ConnectionKind::AppMsg, true).unwrap();

        let mut writer = OpenOptions::new().write(true).open(&path).unwrap();
        writer.write_all(&app_frame(&sample("one"))).unwrap();
        drop(writer);
        poll_until(&mut mux, &mut handler, |h| h.messages.len() == 1);

        let mut writer = OpenOptions::new().write(true).open(&path).unwrap();
        writer.write_all(&app_frame(&sample("two"))).unwrap();
        poll_until(&mut mux, &mut handler, |h| h.messages.len() == 2);

        assert_eq!(handler.messages[0].2, sample("one"));
        assert_eq!(handler.messages[1].2, sample("two"));
        assert_eq!(handler.messages[1].0, id);
        assert!(mux.connection(id).is_some());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn timers_fire() {
        let mut mux = Multiplexer::new().unwrap();
        let mut handler = Recorder::default();
        let timer = dltwire_transport::open_timer(Duration::from_millis(10)).unwrap();
        mux.register(timer, ConnectionKind::Timer(TimerKind::OneSecond), true)
            .unwrap();

        poll_until(&mut mux, &mut handler, |h| h.timers >= 2);
    }
}
