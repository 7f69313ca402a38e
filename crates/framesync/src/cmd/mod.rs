use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use framesync_frame::{Protocol, ProtocolConfig};
use tracing::debug;

use crate::exit::{frame_error, CliResult};
use crate::output::OutputFormat;

pub mod decode;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Receive frames from a transport and print them.
    #[command(subcommand)]
    Listen(ListenTarget),
    /// Encode and send a single frame.
    Send(SendArgs),
    /// Decode frames from a capture file or stdin.
    Decode(DecodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, protocol: Option<&Path>, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Listen(target) => listen::run(target, load_protocol(protocol)?, format),
        Command::Send(args) => send::run(args, load_protocol(protocol)?, format),
        Command::Decode(args) => decode::run(args, load_protocol(protocol)?, format),
        Command::Version(args) => version::run(args, protocol),
    }
}

/// Protocol from a JSON file, or the built-in default.
pub fn load_protocol(path: Option<&Path>) -> CliResult<Protocol> {
    let config = match path {
        Some(path) => {
            debug!(path = %path.display(), "loading protocol");
            ProtocolConfig::from_file(path).map_err(|err| frame_error("protocol", err))?
        }
        None => ProtocolConfig::default(),
    };
    config
        .into_protocol()
        .map_err(|err| frame_error("protocol", err))
}

#[derive(Subcommand, Debug)]
pub enum ListenTarget {
    /// Accept one TCP connection (or connect with --connect).
    Tcp(TcpListenArgs),
    /// Receive datagrams on a UDP socket.
    Udp(UdpListenArgs),
    /// Read from a serial device.
    Serial(SerialListenArgs),
}

#[derive(Args, Debug)]
pub struct ListenCommon {
    /// Exit after receiving N frames.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct TcpListenArgs {
    /// Address to bind (or to connect to with --connect).
    pub addr: SocketAddr,
    /// Connect to ADDR instead of accepting a connection.
    #[arg(long)]
    pub connect: bool,
    #[command(flatten)]
    pub common: ListenCommon,
}

#[derive(Args, Debug)]
pub struct UdpListenArgs {
    /// Address to bind.
    pub addr: SocketAddr,
    /// Default peer for outbound datagrams.
    #[arg(long, value_name = "ADDR")]
    pub peer: Option<SocketAddr>,
    #[command(flatten)]
    pub common: ListenCommon,
}

#[derive(Args, Debug)]
pub struct SerialListenArgs {
    /// Serial device path (e.g. /dev/ttyUSB0).
    pub path: PathBuf,
    /// Line speed.
    #[arg(long, default_value = "115200")]
    pub baud: u32,
    /// Keep the line discipline instead of switching to raw mode.
    #[arg(long)]
    pub cooked: bool,
    #[command(flatten)]
    pub common: ListenCommon,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Destination address.
    pub addr: SocketAddr,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["hex", "file"])]
    pub data: Option<String>,
    /// Hex payload (e.g. 48656c6c6f).
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub hex: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["data", "hex"])]
    pub file: Option<PathBuf>,
    /// Header field value, NAME=VALUE (repeatable).
    #[arg(long = "field", value_name = "NAME=VALUE")]
    pub fields: Vec<String>,
    /// Send a UDP datagram instead of a TCP stream.
    #[arg(long)]
    pub udp: bool,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Capture file, or `-` for stdin.
    pub input: String,
    /// Stop after N frames.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
