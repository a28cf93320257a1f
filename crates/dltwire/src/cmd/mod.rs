use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};
use dltwire_frame::{DltId, Filter, FilterEntry, LogLevel};

use crate::exit::{CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod convert;
pub mod daemon;
pub mod receive;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the log collecting daemon.
    Daemon(DaemonArgs),
    /// Connect to a daemon and print the messages it forwards.
    Receive(ReceiveArgs),
    /// Read stored trace files, filter and print or re-write them.
    Convert(ConvertArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Daemon(args) => daemon::run(args, format),
        Command::Receive(args) => receive::run(args, format),
        Command::Convert(args) => convert::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct DaemonArgs {
    /// ECU id written into stored messages.
    #[arg(long, default_value = "ECU1", env = "DLTWIRE_ECU")]
    pub ecu: String,
    /// TCP address clients connect to [default: 0.0.0.0:3490].
    #[arg(long, value_name = "ADDR", env = "DLTWIRE_TCP", conflicts_with = "no_tcp")]
    pub tcp: Option<String>,
    /// Do not listen for TCP clients.
    #[arg(long)]
    pub no_tcp: bool,
    /// UDP address producers send frames to.
    #[arg(long, value_name = "ADDR")]
    pub udp: Option<String>,
    /// Unix socket applications connect to [default: /tmp/dlt].
    #[arg(
        long,
        value_name = "PATH",
        env = "DLTWIRE_APP_SOCKET",
        conflicts_with = "no_app_socket"
    )]
    pub app_socket: Option<PathBuf>,
    /// Do not listen for applications on a Unix socket.
    #[arg(long)]
    pub no_app_socket: bool,
    /// FIFO applications write to.
    #[arg(long, value_name = "PATH")]
    pub fifo: Option<PathBuf>,
    /// Serial line to forward messages on.
    #[arg(long, value_name = "DEVICE")]
    pub serial: Option<PathBuf>,
    #[arg(long, default_value_t = dltwire_transport::serial::DEFAULT_BAUD_RATE)]
    pub baud_rate: u32,
    /// Shared-memory ring file applications push records into.
    #[arg(long, value_name = "PATH", env = "DLTWIRE_SHM")]
    pub shm: Option<PathBuf>,
    #[arg(long, default_value_t = 100_000)]
    pub shm_size: usize,
    /// Initial backlog size in bytes.
    #[arg(long, default_value_t = 500_000)]
    pub backlog_min: usize,
    /// Largest backlog size in bytes.
    #[arg(long, default_value_t = 10_000_000)]
    pub backlog_max: usize,
    /// Backlog growth step in bytes.
    #[arg(long, default_value_t = 500_000)]
    pub backlog_step: usize,
    /// Append every collected message to this stored trace file.
    #[arg(long, value_name = "FILE", env = "DLTWIRE_STORAGE")]
    pub storage: Option<PathBuf>,
    /// Rotate the stored trace file at this size in bytes.
    #[arg(long, value_name = "BYTES", requires = "storage")]
    pub storage_max_bytes: Option<u64>,
    /// Prefix frames sent to clients with the serial marker.
    #[arg(long)]
    pub serial_header: bool,
    /// Poll timeout of the event loop (e.g. 1s, 500ms).
    #[arg(long, default_value = "1s")]
    pub poll_timeout: String,
}

#[derive(Args, Debug)]
pub struct ReceiveArgs {
    /// Daemon address.
    #[arg(default_value = "127.0.0.1:3490", env = "DLTWIRE_DAEMON")]
    pub addr: String,
    /// Connection timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
    /// Frames carry the serial marker.
    #[arg(long)]
    pub serial_header: bool,
    /// Exit after printing N messages.
    #[arg(long)]
    pub count: Option<u64>,
    /// Also append received messages to this stored trace file.
    #[arg(long, short = 'o', value_name = "FILE")]
    pub output: Option<PathBuf>,
    /// ECU id for stored messages that carry none.
    #[arg(long, default_value = "RECV")]
    pub ecu: String,
    #[command(flatten)]
    pub filter: FilterArgs,
}

#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Stored trace files, read in order.
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,
    /// Write matching messages to this stored trace file instead of printing.
    #[arg(long, short = 'o', value_name = "FILE")]
    pub output: Option<PathBuf>,
    /// Stop after N matching messages.
    #[arg(long)]
    pub count: Option<u64>,
    #[command(flatten)]
    pub filter: FilterArgs,
}

/// Message selection shared by `receive` and `convert`.
#[derive(Args, Debug, Default)]
pub struct FilterArgs {
    /// Only messages from this application id.
    #[arg(long)]
    pub apid: Option<String>,
    /// Only messages from this context id.
    #[arg(long)]
    pub ctid: Option<String>,
    /// Drop messages more verbose than this level.
    #[arg(long, value_name = "LEVEL")]
    pub max_level: Option<LogLevel>,
}

impl FilterArgs {
    pub fn to_filter(&self) -> Filter {
        if self.apid.is_none() && self.ctid.is_none() && self.max_level.is_none() {
            return Filter::default();
        }
        Filter::new(vec![FilterEntry {
            apid: self.apid.as_deref().map(DltId::new),
            ctid: self.ctid.as_deref().map(DltId::new),
            max_level: self.max_level,
            ..FilterEntry::default()
        }])
    }
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

pub(crate) fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
