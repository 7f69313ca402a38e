mod cmd;
mod exit;
mod logging;
mod output;

use std::path::PathBuf;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "framesync",
    version,
    about = "Frame synchronization over TCP, UDP and serial links"
)]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    /// Protocol description (JSON). Defaults to 0x7E + one-byte length.
    #[arg(long, value_name = "FILE", env = "FRAMESYNC_PROTOCOL", global = true)]
    protocol: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, cli.protocol.as_deref(), format);

    match result {
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
    use crate::cmd::ListenTarget;

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "framesync",
            "send",
            "127.0.0.1:9000",
            "--field",
            "seq=1",
            "--data",
            "hello",
        ])
        .expect("send args should parse");

        let Command::Send(args) = cli.command else {
            panic!("expected send");
        };
        assert_eq!(args.fields, vec!["seq=1".to_string()]);
        assert!(!args.udp);
    }

    #[test]
    fn rejects_conflicting_payload_args() {
        let err = Cli::try_parse_from([
            "framesync",
            "send",
            "127.0.0.1:9000",
            "--hex",
            "0102",
            "--data",
            "hello",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_listen_targets() {
        let cli = Cli::try_parse_from(["framesync", "listen", "udp", "0.0.0.0:7000", "--count", "3"])
            .expect("listen udp should parse");
        let Command::Listen(ListenTarget::Udp(args)) = cli.command else {
            panic!("expected listen udp");
        };
        assert_eq!(args.common.count, Some(3));
        assert!(args.peer.is_none());

        let cli = Cli::try_parse_from(["framesync", "listen", "serial", "/dev/ttyUSB0"])
            .expect("listen serial should parse");
        let Command::Listen(ListenTarget::Serial(args)) = cli.command else {
            panic!("expected listen serial");
        };
        assert_eq!(args.baud, 115_200);
        assert!(!args.cooked);
    }

    #[test]
    fn protocol_flag_is_global() {
        let cli = Cli::try_parse_from(["framesync", "decode", "-", "--protocol", "proto.json"])
            .expect("decode args should parse");
        assert_eq!(cli.protocol, Some(PathBuf::from("proto.json")));
    }

    #[test]
    fn rejects_invalid_socket_address() {
        assert!(Cli::try_parse_from(["framesync", "send", "not-an-addr"]).is_err());
    }
}
