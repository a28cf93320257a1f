use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use tracing::info;

use dltwire_transport::fifo::DEFAULT_FIFO_MODE;
use dltwire_transport::{
    bind_udp, open_fifo, open_serial, DltListener, TcpTransport, UnixDomainSocket,
};

use crate::collector::Collector;
use crate::config::DaemonConfig;
use crate::connection::{ConnectionKind, TimerKind};
use crate::error::Result;
use crate::multiplexer::Multiplexer;

/// A log daemon: every configured endpoint in one [`Multiplexer`] driven by
/// a [`Collector`].
pub struct Daemon {
    multiplexer: Multiplexer,
    collector: Collector,
    tcp_addr: Option<SocketAddr>,
}

impl Daemon {
    /// Open every endpoint named in `config` and register it.
    pub fn bind(config: &DaemonConfig) -> Result<Self> {
        let collector = Collector::new(config)?;
        let mut multiplexer = Multiplexer::with_timeout(config.poll_timeout)?;
        let mut tcp_addr = None;

        if let Some(addr) = &config.tcp {
            let listener = TcpTransport::bind(addr.as_str())?;
            tcp_addr = TcpTransport::local_addr(&listener);
            multiplexer.register(listener, ConnectionKind::ClientConnect, true)?;
        }
        if let Some(addr) = &config.udp {
            let socket = bind_udp(addr.as_str())?;
            multiplexer.register(socket, ConnectionKind::Udp, true)?;
        }
        if let Some(path) = &config.app_socket {
            let socket = UnixDomainSocket::bind(path)?;
            multiplexer.register(DltListener::Unix(socket), ConnectionKind::AppConnect, true)?;
        }
        if let Some(path) = &config.fifo {
            let fifo = open_fifo(path, DEFAULT_FIFO_MODE)?;
            multiplexer.register(fifo, ConnectionKind::AppMsg, true)?;
        }
        if let Some(path) = &config.serial {
            let line = open_serial(path, config.baud_rate)?;
            multiplexer.register(line, ConnectionKind::ClientSerial, true)?;
        }
        register_timers(&mut multiplexer)?;

        info!(
            ecu = %config.ecu,
            connections = multiplexer.len(),
            ?tcp_addr,
            "daemon ready"
        );
        Ok(Self {
            multiplexer,
            collector,
            tcp_addr,
        })
    }

    /// Address of the client listener, once bound.
    pub fn tcp_addr(&self) -> Option<SocketAddr> {
        self.tcp_addr
    }

    /// Serve until `running` is cleared.
    pub fn run(&mut self, running: &AtomicBool) -> Result<()> {
        self.multiplexer.run(&mut self.collector, running)?;
        info!(stats = ?self.collector.stats(), "daemon stopped");
        Ok(())
    }

    /// Single poll iteration. Returns the number of ready connections.
    pub fn poll_once(&mut self, timeout: Option<Duration>) -> Result<usize> {
        self.multiplexer.poll_once(timeout, &mut self.collector)
    }

    pub fn collector(&self) -> &Collector {
        &self.collector
    }

    pub fn multiplexer(&self) -> &Multiplexer {
        &self.multiplexer
    }
}

#[cfg(target_os = "linux")]
fn register_timers(multiplexer: &mut Multiplexer) -> Result<()> {
    for kind in [TimerKind::OneSecond, TimerKind::SixtySeconds] {
        let timer = dltwire_transport::open_timer(kind.interval())?;
        multiplexer.register(timer, ConnectionKind::Timer(kind), true)?;
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn register_timers(_multiplexer: &mut Multiplexer) -> Result<()> {
    tracing::debug!("timer descriptors unavailable, housekeeping disabled");
    Ok(())
}
