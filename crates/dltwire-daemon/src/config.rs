use std::path::PathBuf;
use std::time::Duration;

use dltwire_frame::DltId;
use dltwire_transport::net::DEFAULT_PORT;
use dltwire_transport::serial::DEFAULT_BAUD_RATE;

use crate::multiplexer::DEFAULT_POLL_TIMEOUT;

/// Sizes of a dynamic ring buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingConfig {
    pub min_size: usize,
    pub max_size: usize,
    pub step_size: usize,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            min_size: 500_000,
            max_size: 10_000_000,
            step_size: 500_000,
        }
    }
}

/// Everything the daemon needs to start.
///
/// Endpoints left as `None` are not opened.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// ECU id written into storage headers.
    pub ecu: DltId,
    /// TCP address clients connect to.
    pub tcp: Option<String>,
    /// UDP address producers send frames to.
    pub udp: Option<String>,
    /// Unix socket applications connect to.
    pub app_socket: Option<PathBuf>,
    /// FIFO applications write to.
    pub fifo: Option<PathBuf>,
    /// Serial line used as an additional client.
    pub serial: Option<PathBuf>,
    pub baud_rate: u32,
    /// Memory-mapped ring shared with applications.
    pub shm_path: Option<PathBuf>,
    pub shm_size: usize,
    /// Buffer for messages arriving while no client is connected.
    pub backlog: RingConfig,
    /// Stored trace file every message is appended to.
    pub storage_path: Option<PathBuf>,
    /// Rotate the stored trace file once it reaches this size.
    pub storage_max_bytes: Option<u64>,
    /// Prefix frames sent to clients with the serial marker.
    pub serial_header: bool,
    pub poll_timeout: Duration,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            ecu: DltId::new("ECU1"),
            tcp: Some(format!("0.0.0.0:{DEFAULT_PORT}")),
            udp: None,
            app_socket: Some(PathBuf::from("/tmp/dlt")),
            fifo: None,
            serial: None,
            baud_rate: DEFAULT_BAUD_RATE,
            shm_path: None,
            shm_size: 100_000,
            backlog: RingConfig::default(),
            storage_path: None,
            storage_max_bytes: None,
            serial_header: false,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}
