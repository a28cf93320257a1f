use std::collections::HashMap;
use std::io::{ErrorKind, Write};

use mio::unix::SourceFd;
use mio::Registry;
use tracing::{debug, warn};

use dltwire_frame::{Message, UserMessageKind};
use dltwire_transport::DltStream;

use crate::connection::{Connection, ConnectionId, ConnectionKind, ConnectionState, TimerKind};
use crate::error::Result;

/// Callbacks invoked by the [`Multiplexer`](crate::Multiplexer).
///
/// Callbacks run on the poll thread and must not block. Errors are logged
/// and never stop the loop.
pub trait Handler {
    /// A complete message arrived on `source`.
    fn on_message(
        &mut self,
        source: ConnectionId,
        kind: ConnectionKind,
        message: Message,
        clients: &mut Clients<'_>,
    ) -> Result<()>;

    /// An application announced records in the shared ring.
    fn on_shm_notification(
        &mut self,
        _source: ConnectionId,
        _clients: &mut Clients<'_>,
    ) -> Result<()> {
        Ok(())
    }

    /// An application sent a message kind the loop does not interpret.
    fn on_user_message(
        &mut self,
        _source: ConnectionId,
        _kind: UserMessageKind,
        _clients: &mut Clients<'_>,
    ) -> Result<()> {
        Ok(())
    }

    fn on_client_connected(&mut self, _id: ConnectionId, _clients: &mut Clients<'_>) -> Result<()> {
        Ok(())
    }

    fn on_client_disconnected(
        &mut self,
        _id: ConnectionId,
        _clients: &mut Clients<'_>,
    ) -> Result<()> {
        Ok(())
    }

    fn on_timer(
        &mut self,
        _kind: TimerKind,
        _expirations: u64,
        _clients: &mut Clients<'_>,
    ) -> Result<()> {
        Ok(())
    }
}

/// View of the connected clients handed to [`Handler`] callbacks.
///
/// A client whose socket would block is deactivated; a client whose write
/// fails is closed once the callback returns.
pub struct Clients<'a> {
    connections: &'a mut HashMap<ConnectionId, Connection>,
    registry: &'a Registry,
    closed: Vec<ConnectionId>,
}

impl<'a> Clients<'a> {
    pub(crate) fn new(
        connections: &'a mut HashMap<ConnectionId, Connection>,
        registry: &'a Registry,
    ) -> Self {
        Self {
            connections,
            registry,
            closed: Vec::new(),
        }
    }

    fn is_writable(&self, connection: &Connection) -> bool {
        connection.kind().is_client()
            && connection.is_active()
            && !self.closed.contains(&connection.id())
    }

    /// Number of clients that currently receive messages.
    pub fn len(&self) -> usize {
        self.connections
            .values()
            .filter(|connection| self.is_writable(connection))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self
            .connections
            .values()
            .filter(|connection| self.is_writable(connection))
            .map(Connection::id)
            .collect();
        ids.sort();
        ids
    }

    /// Write `frame` to every client. Returns how many received it.
    pub fn broadcast(&mut self, frame: &[u8]) -> usize {
        let mut delivered = 0;
        for connection in self.connections.values_mut() {
            let id = connection.id();
            if !connection.kind().is_client()
                || !connection.is_active()
                || self.closed.contains(&id)
            {
                continue;
            }
            let Some(stream) = connection.stream_mut() else {
                continue;
            };

            match write_frame(stream, frame) {
                Ok(()) => delivered += 1,
                Err(WriteFailure::WouldBlock) => {
                    warn!(%id, "client would block, deactivating");
                    let fd = connection.fd();
                    if let Err(err) = self.registry.deregister(&mut SourceFd(&fd)) {
                        debug!(%id, error = %err, "deregister failed");
                    }
                    connection.state = ConnectionState::Inactive;
                    connection.throttled = true;
                }
                Err(WriteFailure::Io(err)) => {
                    warn!(%id, error = %err, "client write failed, closing");
                    self.closed.push(id);
                }
            }
        }
        delivered
    }

    pub(crate) fn into_closed(self) -> Vec<ConnectionId> {
        self.closed
    }
}

enum WriteFailure {
    /// Nothing of the frame was written.
    WouldBlock,
    Io(std::io::Error),
}

fn write_frame(stream: &mut DltStream, frame: &[u8]) -> std::result::Result<(), WriteFailure> {
    let mut offset = 0usize;
    while offset < frame.len() {
        match stream.write(&frame[offset..]) {
            Ok(0) => return Err(WriteFailure::Io(ErrorKind::WriteZero.into())),
            Ok(n) => offset += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::WouldBlock && offset == 0 => {
                return Err(WriteFailure::WouldBlock)
            }
            // A partially written frame leaves the stream unusable.
            Err(err) => return Err(WriteFailure::Io(err)),
        }
    }
    Ok(())
}
