use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use dltwire_daemon::{Daemon, DaemonConfig, RingConfig};
use dltwire_frame::DltId;
use tracing::info;

use crate::cmd::{install_ctrlc_handler, parse_duration, DaemonArgs};
use crate::exit::{daemon_error, CliResult, SUCCESS};
use crate::output::{print_stats, OutputFormat};

pub fn run(args: DaemonArgs, format: OutputFormat) -> CliResult<i32> {
    let config = config_from_args(args)?;
    let mut daemon = Daemon::bind(&config).map_err(|err| daemon_error("daemon start failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    info!(tcp = ?daemon.tcp_addr(), "collecting");
    daemon
        .run(&running)
        .map_err(|err| daemon_error("event loop failed", err))?;

    print_stats(daemon.collector().stats(), format);
    Ok(SUCCESS)
}

fn config_from_args(args: DaemonArgs) -> CliResult<DaemonConfig> {
    let defaults = DaemonConfig::default();
    let tcp = match (args.no_tcp, args.tcp) {
        (true, _) => None,
        (false, Some(addr)) => Some(addr),
        (false, None) => defaults.tcp,
    };
    let app_socket = match (args.no_app_socket, args.app_socket) {
        (true, _) => None,
        (false, Some(path)) => Some(path),
        (false, None) => defaults.app_socket,
    };

    Ok(DaemonConfig {
        ecu: DltId::new(&args.ecu),
        tcp,
        udp: args.udp,
        app_socket,
        fifo: args.fifo,
        serial: args.serial,
        baud_rate: args.baud_rate,
        shm_path: args.shm,
        shm_size: args.shm_size,
        backlog: RingConfig {
            min_size: args.backlog_min,
            max_size: args.backlog_max,
            step_size: args.backlog_step,
        },
        storage_path: args.storage,
        storage_max_bytes: args.storage_max_bytes,
        serial_header: args.serial_header,
        poll_timeout: parse_duration(&args.poll_timeout)?,
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: DaemonArgs,
    }

    fn parse(argv: &[&str]) -> DaemonArgs {
        let mut full = vec!["daemon"];
        full.extend_from_slice(argv);
        Wrapper::try_parse_from(full).unwrap().args
    }

    #[test]
    fn defaults_keep_tcp_and_app_socket() {
        let config = config_from_args(parse(&[])).unwrap();
        assert_eq!(config.tcp, DaemonConfig::default().tcp);
        assert_eq!(config.app_socket, Some(PathBuf::from("/tmp/dlt")));
        assert_eq!(config.poll_timeout, Duration::from_secs(1));
    }

    #[test]
    fn endpoints_can_be_disabled() {
        let config = config_from_args(parse(&[
            "--no-tcp",
            "--no-app-socket",
            "--fifo",
            "/tmp/dlt.fifo",
            "--poll-timeout",
            "250ms",
        ]))
        .unwrap();
        assert!(config.tcp.is_none());
        assert!(config.app_socket.is_none());
        assert_eq!(config.fifo, Some(PathBuf::from("/tmp/dlt.fifo")));
        assert_eq!(config.poll_timeout, Duration::from_millis(250));
    }

    #[test]
    fn bad_poll_timeout_is_rejected() {
        let err = config_from_args(parse(&["--poll-timeout", "soon"])).unwrap_err();
        assert_eq!(err.code, crate::exit::USAGE);
    }
}
