use std::fs::File;

use bytes::BytesMut;
use tracing::{debug, info, trace, warn};

use dltwire_buffer::{BufferError, RingBuffer, SharedRing};
use dltwire_frame::{
    decode_message, encode_message, DecodeOptions, DltId, Message, MessageWriter, SERIAL_HEADER,
};

use crate::config::DaemonConfig;
use crate::connection::{ConnectionId, ConnectionKind, TimerKind};
use crate::error::Result;
use crate::handler::{Clients, Handler};
use crate::storage::open_storage;

/// Counters reported by the statistics timer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectorStats {
    /// Messages accepted from applications, UDP and the shared ring.
    pub received: u64,
    pub stored: u64,
    /// Messages delivered to at least one client.
    pub forwarded: u64,
    /// Messages put in the backlog while no client was connected.
    pub buffered: u64,
    /// Messages lost because the backlog was full.
    pub dropped: u64,
    pub shm_records: u64,
    /// Ring corruptions detected (each one resets the ring).
    pub corrupt: u64,
}

/// The daemon's [`Handler`]: stores, forwards and buffers collected messages.
pub struct Collector {
    ecu: DltId,
    serial_header: bool,
    storage: Option<MessageWriter<File>>,
    backlog: RingBuffer<Vec<u8>>,
    shm: Option<SharedRing>,
    shm_pending: bool,
    frame: BytesMut,
    stats: CollectorStats,
}

impl Collector {
    pub fn new(config: &DaemonConfig) -> Result<Self> {
        let backlog = RingBuffer::dynamic(
            config.backlog.min_size,
            config.backlog.max_size,
            config.backlog.step_size,
        )?;
        let storage = match &config.storage_path {
            Some(path) => Some(open_storage(path, config.ecu, config.storage_max_bytes)?),
            None => None,
        };
        let shm = match &config.shm_path {
            Some(path) => Some(SharedRing::create(path, config.shm_size)?),
            None => None,
        };

        Ok(Self {
            ecu: config.ecu,
            serial_header: config.serial_header,
            storage,
            backlog,
            shm,
            shm_pending: false,
            frame: BytesMut::new(),
            stats: CollectorStats::default(),
        })
    }

    pub fn stats(&self) -> &CollectorStats {
        &self.stats
    }

    pub fn ecu(&self) -> DltId {
        self.ecu
    }

    /// Messages waiting for a client.
    pub fn backlog_len(&self) -> usize {
        self.backlog.message_count()
    }

    fn collect(&mut self, message: Message, clients: &mut Clients<'_>) -> Result<()> {
        self.stats.received += 1;

        if let Some(writer) = self.storage.as_mut() {
            match writer.write_message(&message) {
                Ok(()) => self.stats.stored += 1,
                Err(err) => warn!(error = %err, "failed to store message"),
            }
        }

        self.frame.clear();
        if self.serial_header {
            self.frame.extend_from_slice(&SERIAL_HEADER);
        }
        if message.storage.is_some() {
            let mut bare = message;
            bare.storage = None;
            encode_message(&bare, &mut self.frame)?;
        } else {
            encode_message(&message, &mut self.frame)?;
        }

        if !clients.is_empty() && clients.broadcast(&self.frame) > 0 {
            self.stats.forwarded += 1;
            return Ok(());
        }
        self.buffer_frame();
        Ok(())
    }

    fn buffer_frame(&mut self) {
        match self.backlog.push(&[&self.frame[..]]) {
            Ok(()) => self.stats.buffered += 1,
            Err(err) => {
                self.stats.dropped += 1;
                if let BufferError::CorruptState(_) = err {
                    self.stats.corrupt += 1;
                }
                if self.stats.dropped == 1 || self.stats.dropped % 1000 == 0 {
                    warn!(
                        error = %err,
                        dropped = self.stats.dropped,
                        "backlog full, message dropped"
                    );
                }
            }
        }
    }

    /// Send buffered frames, oldest first, while some client accepts them.
    fn flush_backlog(&mut self, clients: &mut Clients<'_>) -> Result<()> {
        let mut flushed = 0u64;
        loop {
            let frame = match self.backlog.copy() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(err) => {
                    self.stats.corrupt += 1;
                    warn!(error = %err, "backlog corrupted, buffered messages lost");
                    break;
                }
            };
            if clients.broadcast(&frame) == 0 {
                break;
            }
            self.backlog.remove()?;
            flushed += 1;
        }
        if flushed > 0 {
            self.stats.forwarded += flushed;
            info!(flushed, left = self.backlog.message_count(), "backlog sent to clients");
        }
        Ok(())
    }

    /// Pull every record from the shared ring and collect it.
    fn drain_shared_ring(&mut self, clients: &mut Clients<'_>) -> Result<()> {
        let Some(shm) = self.shm.as_mut() else {
            debug!("shared ring notification without a shared ring");
            return Ok(());
        };

        let mut records = Vec::new();
        {
            let Some(mut ring) = shm.try_lock()? else {
                trace!("shared ring busy, retrying on next timer");
                self.shm_pending = true;
                return Ok(());
            };
            loop {
                match ring.pull() {
                    Ok(Some(record)) => records.push(record),
                    Ok(None) => break,
                    Err(err) => {
                        self.stats.corrupt += 1;
                        warn!(error = %err, "shared ring corrupted");
                        break;
                    }
                }
            }
        }
        self.shm_pending = false;

        let options = DecodeOptions::default();
        for record in records {
            match decode_message(&record, &options) {
                Ok(Some(decoded)) => {
                    self.stats.shm_records += 1;
                    self.collect(decoded.message, clients)?;
                }
                Ok(None) => warn!(len = record.len(), "truncated shared ring record"),
                Err(err) => warn!(error = %err, "malformed shared ring record"),
            }
        }
        Ok(())
    }
}

impl Handler for Collector {
    fn on_message(
        &mut self,
        source: ConnectionId,
        kind: ConnectionKind,
        message: Message,
        clients: &mut Clients<'_>,
    ) -> Result<()> {
        if kind.is_client() {
            debug!(%source, apid = ?message.apid(), "ignoring message from client");
            return Ok(());
        }
        self.collect(message, clients)
    }

    fn on_shm_notification(
        &mut self,
        _source: ConnectionId,
        clients: &mut Clients<'_>,
    ) -> Result<()> {
        self.drain_shared_ring(clients)
    }

    fn on_client_connected(&mut self, id: ConnectionId, clients: &mut Clients<'_>) -> Result<()> {
        info!(%id, clients = clients.len(), "client connected");
        self.flush_backlog(clients)
    }

    fn on_client_disconnected(
        &mut self,
        id: ConnectionId,
        clients: &mut Clients<'_>,
    ) -> Result<()> {
        info!(%id, clients = clients.len(), "client disconnected");
        if clients.is_empty() {
            info!("no client connected, buffering messages");
        }
        Ok(())
    }

    fn on_timer(
        &mut self,
        kind: TimerKind,
        _expirations: u64,
        clients: &mut Clients<'_>,
    ) -> Result<()> {
        match kind {
            TimerKind::OneSecond => {
                if self.shm_pending {
                    self.drain_shared_ring(clients)?;
                }
                if self.backlog.message_count() > 0 && !clients.is_empty() {
                    self.flush_backlog(clients)?;
                }
            }
            TimerKind::SixtySeconds => {
                let stats = self.stats;
                info!(
                    received = stats.received,
                    stored = stats.stored,
                    forwarded = stats.forwarded,
                    buffered = stats.buffered,
                    dropped = stats.dropped,
                    shm_records = stats.shm_records,
                    corrupt = stats.corrupt,
                    backlog = self.backlog.message_count(),
                    "collector statistics"
                );
                self.backlog.log_status();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Read;
    use std::os::unix::net::UnixStream;
    use std::path::PathBuf;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use mio::Poll;

    use dltwire_frame::{Argument, LogLevel, MessageBuilder};
    use dltwire_transport::DltStream;

    use super::*;
    use crate::config::RingConfig;
    use crate::connection::{Connection, ConnectionState, Endpoint};

    fn config() -> DaemonConfig {
        DaemonConfig {
            tcp: None,
            app_socket: None,
            backlog: RingConfig {
                min_size: 256,
                max_size: 1024,
                step_size: 256,
            },
            ..DaemonConfig::default()
        }
    }

    fn sample(text: &str) -> Message {
        MessageBuilder::log(LogLevel::Info, "APP", "CTX")
            .arg(Argument::string(text))
            .build()
    }

    fn encoded(message: &Message) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_message(message, &mut buf).unwrap();
        buf.to_vec()
    }

    fn client(id: usize) -> (Connection, UnixStream) {
        let (local, remote) = UnixStream::pair().unwrap();
        let mut connection = Connection::new(
            ConnectionId(id),
            ConnectionKind::ClientTcp,
            Endpoint::Stream(DltStream::from_unix(local)),
        );
        connection.state = ConnectionState::Active;
        remote
            .set_read_timeout(Some(Duration::from_secs(1)))
            .unwrap();
        (connection, remote)
    }

    fn temp_path(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "dltwire-collector-{name}-{}-{nanos}",
            std::process::id()
        ))
    }

    #[test]
    fn messages_are_buffered_until_a_client_connects() {
        let poll = Poll::new().unwrap();
        let mut connections = HashMap::new();
        let mut collector = Collector::new(&config()).unwrap();

        {
            let mut clients = Clients::new(&mut connections, poll.registry());
            collector
                .on_message(ConnectionId(0), ConnectionKind::AppMsg, sample("early"), &mut clients)
                .unwrap();
        }
        assert_eq!(collector.backlog_len(), 1);
        assert_eq!(collector.stats().buffered, 1);

        let (connection, mut remote) = client(1);
        connections.insert(ConnectionId(1), connection);
        {
            let mut clients = Clients::new(&mut connections, poll.registry());
            collector
                .on_client_connected(ConnectionId(1), &mut clients)
                .unwrap();
            collector
                .on_message(ConnectionId(0), ConnectionKind::AppMsg, sample("live"), &mut clients)
                .unwrap();
        }
        assert_eq!(collector.backlog_len(), 0);
        assert_eq!(collector.stats().forwarded, 2);

        let mut expected = encoded(&sample("early"));
        expected.extend_from_slice(&encoded(&sample("live")));
        let mut received = vec![0u8; expected.len()];
        remote.read_exact(&mut received).unwrap();
        assert_eq!(received, expected);
    }

    #[test]
    fn messages_from_clients_are_not_collected() {
        let poll = Poll::new().unwrap();
        let mut connections = HashMap::new();
        let mut collector = Collector::new(&config()).unwrap();
        let mut clients = Clients::new(&mut connections, poll.registry());

        collector
            .on_message(ConnectionId(4), ConnectionKind::ClientTcp, sample("request"), &mut clients)
            .unwrap();
        assert_eq!(collector.stats().received, 0);
        assert_eq!(collector.backlog_len(), 0);
    }

    #[test]
    fn backlog_overflow_is_counted() {
        let poll = Poll::new().unwrap();
        let mut connections = HashMap::new();
        let mut collector = Collector::new(&config()).unwrap();
        let mut clients = Clients::new(&mut connections, poll.registry());

        for i in 0..100 {
            collector
                .on_message(
                    ConnectionId(0),
                    ConnectionKind::AppMsg,
                    sample(&format!("message {i}")),
                    &mut clients,
                )
                .unwrap();
        }
        let stats = collector.stats();
        assert_eq!(stats.received, 100);
        assert!(stats.dropped > 0);
        assert_eq!(stats.buffered + stats.dropped, 100);
    }

    #[test]
    fn shared_ring_records_are_collected() {
        let path = temp_path("shm");
        let config = DaemonConfig {
            shm_path: Some(path.clone()),
            shm_size: 4096,
            ..config()
        };
        let poll = Poll::new().unwrap();
        let mut connections = HashMap::new();
        let mut collector = Collector::new(&config).unwrap();

        let mut producer = SharedRing::open(&path).unwrap();
        let frame = encoded(&sample("via shm"));
        let (head, body) = frame.split_at(10);
        producer.lock().unwrap().push(&[head, body]).unwrap();

        let mut clients = Clients::new(&mut connections, poll.registry());
        collector
            .on_shm_notification(ConnectionId(0), &mut clients)
            .unwrap();
        assert_eq!(collector.stats().shm_records, 1);
        assert_eq!(collector.backlog_len(), 1);
        assert_eq!(producer.lock().unwrap().message_count(), 0);
    }
}
