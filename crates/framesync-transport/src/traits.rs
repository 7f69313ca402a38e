use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tracing::{debug, trace};

use crate::error::{Result, TransportError};

/// Largest payload a single UDP datagram can carry.
///
/// Datagram reads need a buffer this large: `recv_from` silently truncates
/// anything that does not fit.
pub const MAX_DATAGRAM_LEN: usize = 65_535;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// An already-configured byte source/sink.
///
/// A transport is either stream oriented (TCP, serial line, in-memory pipe)
/// or connectionless (UDP). Sessions take exclusive ownership of it and split
/// it into independent read and write halves so outbound traffic never
/// interleaves with read-driven frame assembly.
pub struct Transport {
    inner: TransportInner,
    kind: &'static str,
    local_addr: Option<SocketAddr>,
}

enum TransportInner {
    Stream {
        reader: BoxedReader,
        writer: BoxedWriter,
    },
    Datagram {
        socket: Arc<UdpSocket>,
        default_peer: Option<SocketAddr>,
    },
}

impl Transport {
    /// Wrap any bidirectional byte stream.
    pub fn stream<S>(io: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::named_stream("stream", io)
    }

    /// Wrap a bidirectional byte stream under an explicit diagnostic name.
    pub fn named_stream<S>(kind: &'static str, io: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(io);
        Self {
            inner: TransportInner::Stream {
                reader: Box::new(reader),
                writer: Box::new(writer),
            },
            kind,
            local_addr: None,
        }
    }

    /// Wrap a connected TCP stream.
    pub fn tcp(stream: TcpStream) -> Self {
        let local_addr = stream.local_addr().ok();
        let (reader, writer) = stream.into_split();
        Self {
            inner: TransportInner::Stream {
                reader: Box::new(reader),
                writer: Box::new(writer),
            },
            kind: "tcp",
            local_addr,
        }
    }

    /// Connect to a TCP endpoint.
    pub async fn tcp_connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| TransportError::Connect { addr, source })?;
        debug!(%addr, "connected tcp transport");
        Ok(Self::tcp(stream))
    }

    /// Wrap a bound UDP socket.
    ///
    /// Without a `default_peer`, every outbound write must name its destination.
    pub fn udp(socket: UdpSocket, default_peer: Option<SocketAddr>) -> Self {
        let local_addr = socket.local_addr().ok();
        Self {
            inner: TransportInner::Datagram {
                socket: Arc::new(socket),
                default_peer,
            },
            kind: "udp",
            local_addr,
        }
    }

    /// Bind a UDP socket to `addr`.
    pub async fn udp_bind(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| TransportError::Bind { addr, source })?;
        let transport = Self::udp(socket, None);
        debug!(local = ?transport.local_addr, "bound udp transport");
        Ok(transport)
    }

    /// Wrap an opened serial port.
    ///
    /// The port's saved line settings are restored once both halves are dropped.
    #[cfg(unix)]
    pub fn serial(port: crate::serial::SerialPort) -> Self {
        Self::named_stream("serial", port)
    }

    /// Transport name for diagnostics.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Local socket address, when the transport is network based.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Whether outbound writes must carry an explicit destination.
    pub fn requires_destination(&self) -> bool {
        matches!(
            self.inner,
            TransportInner::Datagram {
                default_peer: None,
                ..
            }
        )
    }

    /// Split into independently owned read and write halves.
    pub fn into_split(self) -> (TransportReader, TransportWriter) {
        match self.inner {
            TransportInner::Stream { reader, writer } => (
                TransportReader {
                    inner: ReaderInner::Stream(reader),
                    kind: self.kind,
                },
                TransportWriter {
                    inner: WriterInner::Stream(writer),
                    kind: self.kind,
                },
            ),
            TransportInner::Datagram {
                socket,
                default_peer,
            } => (
                TransportReader {
                    inner: ReaderInner::Datagram(Arc::clone(&socket)),
                    kind: self.kind,
                },
                TransportWriter {
                    inner: WriterInner::Datagram {
                        socket,
                        default_peer,
                    },
                    kind: self.kind,
                },
            ),
        }
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("type", &self.kind)
            .field("local_addr", &self.local_addr)
            .finish()
    }
}

/// Read half of a [`Transport`].
pub struct TransportReader {
    inner: ReaderInner,
    kind: &'static str,
}

enum ReaderInner {
    Stream(BoxedReader),
    Datagram(Arc<UdpSocket>),
}

impl TransportReader {
    /// Read whatever is available into `buf`, waiting for at least one byte
    /// (or one datagram).
    ///
    /// Returns `Err(TransportError::Closed)` when a stream reaches EOF.
    pub async fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        match &mut self.inner {
            ReaderInner::Stream(reader) => {
                let n = reader.read(buf).await?;
                if n == 0 && !buf.is_empty() {
                    return Err(TransportError::Closed);
                }
                Ok(n)
            }
            ReaderInner::Datagram(socket) => {
                let (n, from) = socket.recv_from(buf).await?;
                trace!(%from, len = n, "datagram received");
                Ok(n)
            }
        }
    }

    /// Whether each read returns exactly one datagram.
    ///
    /// Frames never span a datagram boundary on such transports.
    pub fn is_datagram(&self) -> bool {
        matches!(self.inner, ReaderInner::Datagram(_))
    }

    /// Transport name for diagnostics.
    pub fn kind(&self) -> &'static str {
        self.kind
    }
}

impl std::fmt::Debug for TransportReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportReader")
            .field("type", &self.kind)
            .finish()
    }
}

/// Write half of a [`Transport`].
pub struct TransportWriter {
    inner: WriterInner,
    kind: &'static str,
}

enum WriterInner {
    Stream(BoxedWriter),
    Datagram {
        socket: Arc<UdpSocket>,
        default_peer: Option<SocketAddr>,
    },
}

impl TransportWriter {
    /// Send the whole buffer.
    ///
    /// Stream transports ignore `dest`. Datagram transports send one datagram
    /// to `dest`, falling back to the default peer.
    pub async fn write_all(&mut self, data: &[u8], dest: Option<SocketAddr>) -> Result<usize> {
        match &mut self.inner {
            WriterInner::Stream(writer) => {
                if let Some(dest) = dest {
                    trace!(%dest, "destination ignored on stream transport");
                }
                writer.write_all(data).await?;
                writer.flush().await?;
                Ok(data.len())
            }
            WriterInner::Datagram {
                socket,
                default_peer,
            } => {
                let dest = dest
                    .or(*default_peer)
                    .ok_or(TransportError::DestinationRequired)?;
                let sent = socket.send_to(data, dest).await?;
                Ok(sent)
            }
        }
    }

    /// Whether writes must carry an explicit destination.
    pub fn requires_destination(&self) -> bool {
        matches!(
            self.inner,
            WriterInner::Datagram {
                default_peer: None,
                ..
            }
        )
    }

    /// Shut down the outbound direction of a stream transport.
    pub async fn shutdown(&mut self) -> Result<()> {
        match &mut self.inner {
            WriterInner::Stream(writer) => writer.shutdown().await.map_err(Into::into),
            WriterInner::Datagram { .. } => Ok(()),
        }
    }

    /// Transport name for diagnostics.
    pub fn kind(&self) -> &'static str {
        self.kind
    }
}

impl std::fmt::Debug for TransportWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportWriter")
            .field("type", &self.kind)
            .finish()
    }
}
