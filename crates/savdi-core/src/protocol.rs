//! SAVDI line protocol: request framing, status decoding, and the
//! deadline-guarded line connection used for one exchange.
//!
//! ```text
//! path submission (unix only)      stream submission
//! ───────────────────────────      ─────────────────────────────
//! C: /var/mail/msg.eml\n           C: stream/68\n
//! S: 0\n                           S: OK\n
//!                                  C: <68 raw bytes>
//!                                  S: 1EICAR-AV-Test\n
//! ```
//!
//! Status lines start with `0` (clean), `1<signature>` (infected) or `-1`
//! (unknown). Anything else is a protocol violation.

use std::future::Future;
use std::io;
use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream};
use tracing::trace;

use crate::error::ScanError;
use crate::source::SizedSource;
use crate::transport::BoxStream;

/// Default socket of a locally installed daemon.
pub const DEFAULT_SOCKET_PATH: &str = "/var/lib/savdid/savdid.sock";

/// Filename reported for stream submissions.
pub const STREAM_FILENAME: &str = "stream";

/// Acknowledgement the daemon sends before accepting stream bytes.
pub const ACK: &str = "OK";

/// Longest status line accepted from the daemon.
pub const MAX_LINE_LEN: u64 = 64 * 1024;

/// Exchange steps, used to label command timeouts.
pub mod step {
    pub const SEND_REQUEST: &str = "send request";
    pub const READ_ACK: &str = "read acknowledgement";
    pub const SEND_PAYLOAD: &str = "send payload";
    pub const READ_VERDICT: &str = "read verdict";
}

/// Decoded status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Clean,
    Infected { signature: String },
}

/// Frame a path submission. The path bytes are sent as-is.
pub fn path_request(path: &Path) -> Result<Vec<u8>, ScanError> {
    let bytes = path.as_os_str().as_encoded_bytes();
    if bytes.contains(&b'\n') {
        return Err(ScanError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            "path contains a newline and cannot be framed as one request line",
        )));
    }
    Ok(bytes.to_vec())
}

/// Frame a stream submission announcing `len` payload bytes.
pub fn stream_request(len: u64) -> Vec<u8> {
    format!("stream/{len}").into_bytes()
}

/// Decode one status line.
///
/// The infected form carries the signature right after the status digit;
/// a single separating space is tolerated.
pub fn decode_status(line: &str) -> Result<Verdict, ScanError> {
    if line.starts_with("-1") {
        return Err(ScanError::UnknownStatus(line.to_string()));
    }
    if line.starts_with('0') {
        return Ok(Verdict::Clean);
    }
    if let Some(rest) = line.strip_prefix('1') {
        let signature = rest.strip_prefix(' ').unwrap_or(rest);
        if signature.is_empty() {
            return Err(ScanError::UnexpectedResponse(line.to_string()));
        }
        return Ok(Verdict::Infected {
            signature: signature.to_string(),
        });
    }
    Err(ScanError::UnexpectedResponse(line.to_string()))
}

/// Run one exchange step under its own deadline. A zero timeout disables it.
async fn with_deadline<T>(
    timeout: Duration,
    step: &'static str,
    fut: impl Future<Output = io::Result<T>>,
) -> Result<T, ScanError> {
    if timeout.is_zero() {
        return Ok(fut.await?);
    }
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(ScanError::CommandTimeout { step }),
    }
}

/// Buffered line connection for a single request/response exchange.
///
/// Dropping it closes the underlying socket.
pub(crate) struct LineConn {
    inner: BufStream<BoxStream>,
    timeout: Duration,
}

impl LineConn {
    pub fn new(stream: BoxStream, timeout: Duration) -> Self {
        Self {
            inner: BufStream::new(stream),
            timeout,
        }
    }

    /// Write `line` plus the terminating newline and flush.
    pub async fn send_line(&mut self, line: &[u8], step: &'static str) -> Result<(), ScanError> {
        trace!(step, line = %String::from_utf8_lossy(line), "send");
        let inner = &mut self.inner;
        with_deadline(self.timeout, step, async move {
            inner.write_all(line).await?;
            inner.write_all(b"\n").await?;
            inner.flush().await
        })
        .await
    }

    /// Read one line, without its `\n` or `\r\n` terminator.
    pub async fn read_line(&mut self, step: &'static str) -> Result<String, ScanError> {
        let inner = &mut self.inner;
        let buf = with_deadline(self.timeout, step, async move {
            let mut buf = Vec::new();
            let n = inner
                .take(MAX_LINE_LEN)
                .read_until(b'\n', &mut buf)
                .await?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed before a response line",
                ));
            }
            if n as u64 == MAX_LINE_LEN && buf.last() != Some(&b'\n') {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "response line too long",
                ));
            }
            Ok(buf)
        })
        .await?;

        let mut line = String::from_utf8_lossy(&buf).into_owned();
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        trace!(step, %line, "recv");
        Ok(line)
    }

    /// Copy exactly `len` bytes from `source` and flush.
    pub async fn send_payload<S>(&mut self, source: &mut S, len: u64) -> Result<(), ScanError>
    where
        S: SizedSource + ?Sized,
    {
        let inner = &mut self.inner;
        with_deadline(self.timeout, step::SEND_PAYLOAD, async move {
            let copied = tokio::io::copy(&mut source.take(len), &mut *inner).await?;
            if copied != len {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("source ended after {copied} of {len} bytes"),
                ));
            }
            inner.flush().await
        })
        .await?;
        trace!(len, "payload sent");
        Ok(())
    }
}
