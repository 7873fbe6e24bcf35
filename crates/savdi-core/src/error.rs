//! Error type shared by every scan operation.

use std::io;
use std::path::PathBuf;

/// Errors from constructing a [`Client`](crate::Client) or running a scan.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("network {0:?} is not supported")]
    UnsupportedTransport(String),

    #[error("unix socket {} does not exist", .0.display())]
    SocketNotFound(PathBuf),

    #[error("{}: {source}", path.display())]
    NotFound { path: PathBuf, source: io::Error },

    #[error("scanning directories is not supported over TCP: {}", .0.display())]
    DirectoryNotSupported(PathBuf),

    #[error("content length could not be determined")]
    UnknownLength,

    #[error("failed to connect to {address}: {source}")]
    Connect { address: String, source: io::Error },

    #[error("timed out connecting to {address} after {attempts} attempt(s)")]
    ConnectTimeout { address: String, attempts: u32 },

    #[error("command timed out during {step}")]
    CommandTimeout { step: &'static str },

    #[error("invalid server response: {0:?}")]
    UnexpectedResponse(String),

    #[error("unknown status: {0:?}")]
    UnknownStatus(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ScanError {
    /// Whether a deadline expired, either while connecting or mid-exchange.
    pub fn is_timeout(&self) -> bool {
        match self {
            ScanError::ConnectTimeout { .. } | ScanError::CommandTimeout { .. } => true,
            ScanError::Io(e) => e.kind() == io::ErrorKind::TimedOut,
            _ => false,
        }
    }

    /// Whether the scanned input (not the socket) was missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ScanError::NotFound { .. })
    }
}
