use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::{debug, warn};

use crate::error::{Result, TransportError};

/// Line settings applied when a serial port is opened.
#[derive(Debug, Clone, Copy)]
pub struct SerialOptions {
    /// Baud rate to apply. `None` keeps the device's current speed.
    pub baud_rate: Option<u32>,
    /// Put the line into raw mode (no echo, no line editing, 8-bit clean).
    pub raw: bool,
}

impl Default for SerialOptions {
    fn default() -> Self {
        Self {
            baud_rate: None,
            raw: true,
        }
    }
}

/// A non-blocking serial device.
///
/// The termios settings found at open time are captured and written back when
/// the port is dropped, so the device is left the way it was found.
pub struct SerialPort {
    fd: AsyncFd<File>,
    path: PathBuf,
    saved: libc::termios,
}

impl SerialPort {
    /// Open and configure the device at `path`.
    ///
    /// Must be called from within a tokio runtime context.
    pub fn open(path: impl AsRef<Path>, options: SerialOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let serial_err = |source: io::Error| TransportError::Serial {
            path: path.clone(),
            source,
        };

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
            .open(&path)
            .map_err(serial_err)?;

        let raw_fd = file.as_raw_fd();
        let saved = get_termios(raw_fd).map_err(serial_err)?;

        let mut configured = saved;
        if options.raw {
            // SAFETY: `configured` is a valid, initialized termios value.
            unsafe { libc::cfmakeraw(&mut configured) };
            configured.c_cflag |= libc::CLOCAL | libc::CREAD;
        }
        if let Some(baud) = options.baud_rate {
            let speed = baud_constant(baud).map_err(serial_err)?;
            // SAFETY: `configured` is a valid termios value and `speed` a libc speed constant.
            let rc = unsafe {
                libc::cfsetispeed(&mut configured, speed) | libc::cfsetospeed(&mut configured, speed)
            };
            if rc != 0 {
                return Err(serial_err(io::Error::last_os_error()));
            }
        }
        set_termios(raw_fd, &configured).map_err(serial_err)?;

        let fd = match AsyncFd::new(file) {
            Ok(fd) => fd,
            Err(err) => {
                let _ = set_termios(raw_fd, &saved);
                return Err(serial_err(err));
            }
        };

        debug!(?path, baud = ?options.baud_rate, raw = options.raw, "opened serial port");
        Ok(Self { fd, path, saved })
    }

    /// Device path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SerialPort {
    fn drop(&mut self) {
        match set_termios(self.fd.get_ref().as_raw_fd(), &self.saved) {
            Ok(()) => debug!(path = ?self.path, "restored serial line settings"),
            Err(err) => warn!(path = ?self.path, error = %err, "failed restoring serial line settings"),
        }
    }
}

impl AsyncRead for SerialPort {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            let mut guard = ready!(self.fd.poll_read_ready(cx))?;
            let unfilled = buf.initialize_unfilled();
            match guard.try_io(|inner| inner.get_ref().read(unfilled)) {
                Ok(Ok(len)) => {
                    buf.advance(len);
                    return Poll::Ready(Ok(()));
                }
                Ok(Err(err)) => return Poll::Ready(Err(err)),
                Err(_would_block) => continue,
            }
        }
    }
}

impl AsyncWrite for SerialPort {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        loop {
            let mut guard = ready!(self.fd.poll_write_ready(cx))?;
            match guard.try_io(|inner| inner.get_ref().write(buf)) {
                Ok(result) => return Poll::Ready(result),
                Err(_would_block) => continue,
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl std::fmt::Debug for SerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialPort")
            .field("path", &self.path)
            .finish()
    }
}

fn get_termios(fd: RawFd) -> io::Result<libc::termios> {
    let mut tio = std::mem::MaybeUninit::<libc::termios>::uninit();
    // SAFETY: `tio` is a writable termios-sized buffer and `fd` is an open descriptor.
    let rc = unsafe { libc::tcgetattr(fd, tio.as_mut_ptr()) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: tcgetattr succeeded, so every field has been written.
    Ok(unsafe { tio.assume_init() })
}

fn set_termios(fd: RawFd, tio: &libc::termios) -> io::Result<()> {
    // SAFETY: `tio` points to a valid termios value and `fd` is an open descriptor.
    let rc = unsafe { libc::tcsetattr(fd, libc::TCSANOW, tio) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn baud_constant(baud: u32) -> io::Result<libc::speed_t> {
    let speed = match baud {
        1200 => libc::B1200,
        2400 => libc::B2400,
        4800 => libc::B4800,
        9600 => libc::B9600,
        19200 => libc::B19200,
        38400 => libc::B38400,
        57600 => libc::B57600,
        115200 => libc::B115200,
        230400 => libc::B230400,
        other => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unsupported baud rate {other}"),
            ))
        }
    };
    Ok(speed)
}
