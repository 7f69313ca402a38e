use framesync_frame::Protocol;
use framesync_session::{
    MessageQueue, Reactor, SessionError, SessionTask, StopHandle, TransportSession,
};
use framesync_transport::{Transport, TransportError};
use tokio::net::{TcpListener, UdpSocket};
use tracing::info;

use crate::cmd::ListenTarget;
use crate::exit::{session_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_frame, OutputFormat};

pub fn run(target: ListenTarget, protocol: Protocol, format: OutputFormat) -> CliResult<i32> {
    let reactor = Reactor::new("framesync-reactor").map_err(|err| session_error("reactor", err))?;
    let (transport, source, count) = open_transport(&reactor, target)?;

    let queue = MessageQueue::new();
    let mut session = TransportSession::new(transport, protocol, queue.clone());
    let task = session
        .start(reactor.handle())
        .map_err(|err| session_error("session start failed", err))?;
    install_ctrlc_handler(session.stop_handle())?;

    let mut printed = 0usize;
    for frame in queue.iter() {
        print_frame(&frame, &source, format);
        printed = printed.saturating_add(1);
        if count.is_some_and(|count| printed >= count) {
            session.stop();
            break;
        }
    }

    finish(task, &source)
}

fn open_transport(
    reactor: &Reactor,
    target: ListenTarget,
) -> CliResult<(Transport, String, Option<usize>)> {
    let opened = match target {
        ListenTarget::Tcp(args) if args.connect => {
            let addr = args.addr;
            reactor
                .run(Transport::tcp_connect(addr))
                .map(|res| res.map(|t| (t, format!("tcp:{addr}"), args.common.count)))
        }
        ListenTarget::Tcp(args) => {
            let addr = args.addr;
            reactor.run(async move {
                let listener = TcpListener::bind(addr)
                    .await
                    .map_err(|source| TransportError::Bind { addr, source })?;
                info!(addr = %listener.local_addr()?, "waiting for tcp connection");
                let (stream, peer) = listener.accept().await?;
                info!(%peer, "tcp peer connected");
                Ok::<_, TransportError>((
                    Transport::tcp(stream),
                    format!("tcp:{peer}"),
                    args.common.count,
                ))
            })
        }
        ListenTarget::Udp(args) => {
            let addr = args.addr;
            let peer = args.peer;
            reactor.run(async move {
                let socket = UdpSocket::bind(addr)
                    .await
                    .map_err(|source| TransportError::Bind { addr, source })?;
                info!(addr = %socket.local_addr()?, "listening for datagrams");
                Ok::<_, TransportError>((
                    Transport::udp(socket, peer),
                    format!("udp:{addr}"),
                    args.common.count,
                ))
            })
        }
        ListenTarget::Serial(args) => open_serial(reactor, args)?,
    };

    opened
        .map_err(|err| session_error("reactor", err))?
        .map_err(|err| transport_error("open failed", err))
}

type Opened = Result<Result<(Transport, String, Option<usize>), TransportError>, SessionError>;

#[cfg(unix)]
fn open_serial(reactor: &Reactor, args: crate::cmd::SerialListenArgs) -> CliResult<Opened> {
    use framesync_transport::{SerialOptions, SerialPort};

    let options = SerialOptions {
        baud_rate: Some(args.baud),
        raw: !args.cooked,
    };
    let source = format!("serial:{}", args.path.display());
    let baud = args.baud;
    let count = args.common.count;
    let path = args.path;
    Ok(reactor.run(async move {
        let port = SerialPort::open(&path, options)?;
        info!(path = %path.display(), baud, "serial port opened");
        Ok::<_, TransportError>((Transport::serial(port), source, count))
    }))
}

#[cfg(not(unix))]
fn open_serial(_reactor: &Reactor, _args: crate::cmd::SerialListenArgs) -> CliResult<Opened> {
    Err(CliError::new(
        crate::exit::USAGE,
        "serial transport is only supported on unix",
    ))
}

fn finish(task: SessionTask, source: &str) -> CliResult<i32> {
    match task.wait() {
        Ok(summary) => {
            info!(
                source,
                frames = summary.stats.frames_delivered,
                resync_bytes = summary.stats.resync_bytes,
                protocol_errors = summary.stats.protocol_errors,
                "session stopped"
            );
            Ok(SUCCESS)
        }
        Err(SessionError::TransportClosed { reason, discarded }) => {
            info!(source, %reason, discarded, "transport closed");
            Ok(SUCCESS)
        }
        Err(err) => Err(session_error("session failed", err)),
    }
}

fn install_ctrlc_handler(stop: StopHandle) -> CliResult<()> {
    ctrlc::set_handler(move || stop.stop()).map_err(|err| {
        CliError::new(INTERNAL, format!("signal handler setup failed: {err}"))
    })
}
