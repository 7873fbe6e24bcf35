//! Socket transports and dial-with-retry.
//!
//! A [`Transport`] names the socket kind used to reach the daemon. The
//! [`Dialer`] opens exactly one connection per scan and retries only when an
//! attempt times out; refused or unresolvable addresses fail immediately.

use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncRead, AsyncWrite, Interest};
use tokio::net::{TcpStream, UnixStream};
use tracing::debug;

use crate::error::ScanError;

/// Socket kind used to reach the scanning daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Stream-oriented Unix domain socket.
    Unix,
    /// `SOCK_SEQPACKET` Unix domain socket.
    UnixPacket,
    /// TCP over whichever address family the host resolves to.
    Tcp,
    /// TCP restricted to IPv4 addresses.
    Tcp4,
    /// TCP restricted to IPv6 addresses.
    Tcp6,
}

impl Transport {
    pub const ALL: [Transport; 5] = [
        Transport::Unix,
        Transport::UnixPacket,
        Transport::Tcp,
        Transport::Tcp4,
        Transport::Tcp6,
    ];

    /// The network name used in configuration and on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            Transport::Unix => "unix",
            Transport::UnixPacket => "unixpacket",
            Transport::Tcp => "tcp",
            Transport::Tcp4 => "tcp4",
            Transport::Tcp6 => "tcp6",
        }
    }

    /// Unix transports submit paths; the daemon reads the file itself.
    pub fn is_unix(self) -> bool {
        matches!(self, Transport::Unix | Transport::UnixPacket)
    }

    fn accepts(self, addr: &SocketAddr) -> bool {
        match self {
            Transport::Tcp4 => addr.is_ipv4(),
            Transport::Tcp6 => addr.is_ipv6(),
            _ => true,
        }
    }
}

impl FromStr for Transport {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Transport::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ScanError::UnsupportedTransport(s.to_string()))
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A connected, bidirectional byte stream to the daemon.
pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}

pub type BoxStream = Box<dyn Stream>;

/// Connection parameters borrowed from a client for one dial.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Dialer<'a> {
    pub transport: Transport,
    pub address: &'a str,
    pub connect_timeout: Duration,
    pub retries: u32,
    pub retry_delay: Duration,
}

impl Dialer<'_> {
    /// Open a connection, making up to `retries + 1` attempts.
    pub async fn dial(&self) -> Result<BoxStream, ScanError> {
        debug!(
            network = %self.transport,
            address = self.address,
            "dialing scanning daemon"
        );
        let attempts = self.retries.saturating_add(1);
        retry_on_timeout(attempts, self.retry_delay, || self.attempt())
            .await
            .map_err(|e| match e {
                DialFailure::TimedOut => ScanError::ConnectTimeout {
                    address: self.address.to_string(),
                    attempts,
                },
                DialFailure::Other(source) => ScanError::Connect {
                    address: self.address.to_string(),
                    source,
                },
            })
    }

    async fn attempt(&self) -> io::Result<BoxStream> {
        if self.connect_timeout.is_zero() {
            return self.connect().await;
        }
        match tokio::time::timeout(self.connect_timeout, self.connect()).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "connect attempt timed out",
            )),
        }
    }

    async fn connect(&self) -> io::Result<BoxStream> {
        match self.transport {
            Transport::Unix => Ok(Box::new(UnixStream::connect(self.address).await?)),
            Transport::UnixPacket => {
                Ok(Box::new(connect_seqpacket(Path::new(self.address)).await?))
            }
            Transport::Tcp | Transport::Tcp4 | Transport::Tcp6 => {
                Ok(Box::new(connect_tcp(self.address, self.transport).await?))
            }
        }
    }
}

#[derive(Debug)]
enum DialFailure {
    TimedOut,
    Other(io::Error),
}

/// Run `attempt` until it succeeds, fails with something other than a
/// timeout, or `attempts` timeouts have been seen.
async fn retry_on_timeout<T, F, Fut>(
    attempts: u32,
    delay: Duration,
    mut attempt: F,
) -> Result<T, DialFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    for n in 1..=attempts {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                debug!(attempt = n, attempts, error = %e, "connect attempt timed out");
                if n < attempts {
                    tokio::time::sleep(delay).await;
                }
            }
            Err(e) => return Err(DialFailure::Other(e)),
        }
    }
    Err(DialFailure::TimedOut)
}

async fn connect_tcp(address: &str, transport: Transport) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in tokio::net::lookup_host(address).await? {
        if !transport.accepts(&addr) {
            continue;
        }
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!(%addr, error = %e, "tcp connect failed");
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("no {transport} address found for {address}"),
        )
    }))
}

/// `tokio` has no seqpacket support, so the socket is built with `socket2`
/// and connected in non-blocking mode. A connect still in progress is awaited
/// through the reactor, which keeps it under the caller's attempt deadline.
async fn connect_seqpacket(path: &Path) -> io::Result<UnixStream> {
    let mut socket =
        socket2::Socket::new(socket2::Domain::UNIX, socket2::Type::SEQPACKET, None)?;
    socket.set_nonblocking(true)?;
    let addr = socket2::SockAddr::unix(path)?;
    match socket.connect(&addr) {
        Ok(()) => {}
        Err(e) if e.raw_os_error() == Some(libc::EINPROGRESS) => {
            let fd = AsyncFd::with_interest(socket, Interest::WRITABLE)?;
            drop(fd.writable().await?);
            socket = fd.into_inner();
            if let Some(e) = socket.take_error()? {
                return Err(e);
            }
        }
        Err(e) => return Err(e),
    }
    UnixStream::from_std(std::os::unix::net::UnixStream::from(socket))
}
