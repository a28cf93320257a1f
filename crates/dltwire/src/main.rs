mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "dltwire", version, about = "DLT log collection and trace tools")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(
        long,
        value_name = "FORMAT",
        default_value = "text",
        env = "DLTWIRE_LOG_FORMAT",
        global = true
    )]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "info",
        env = "DLTWIRE_LOG_LEVEL",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    match cmd::run(cli.command, format) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_daemon_subcommand() {
        let cli = Cli::try_parse_from([
            "dltwire",
            "daemon",
            "--tcp",
            "127.0.0.1:0",
            "--no-app-socket",
            "--storage",
            "/tmp/trace.dlt",
        ])
        .expect("daemon args should parse");

        let Command::Daemon(args) = cli.command else {
            panic!("expected daemon command");
        };
        assert!(args.no_app_socket);
        assert_eq!(args.tcp.as_deref(), Some("127.0.0.1:0"));
    }

    #[test]
    fn rejects_tcp_with_no_tcp() {
        let err = Cli::try_parse_from(["dltwire", "daemon", "--tcp", "127.0.0.1:0", "--no-tcp"])
            .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_convert_with_filters() {
        let cli = Cli::try_parse_from([
            "dltwire",
            "--format",
            "pretty",
            "convert",
            "in.dlt",
            "--apid",
            "APP",
            "--max-level",
            "warn",
        ])
        .expect("convert args should parse");

        assert!(matches!(cli.format, Some(OutputFormat::Pretty)));
        assert!(matches!(cli.command, Command::Convert(_)));
    }

    #[test]
    fn parses_receive_subcommand() {
        let cli = Cli::try_parse_from(["dltwire", "receive", "10.0.0.2:3490", "--count", "5"])
            .expect("receive args should parse");
        assert!(matches!(cli.command, Command::Receive(_)));
    }
}
