#![deny(unsafe_code)]

//! Async client for the SAVDI scanning daemon line protocol.
//!
//! A [`Client`] opens one connection per scan, submits either a path (unix
//! transports, the daemon reads the file itself) or the file's bytes
//! (`stream/<len>` submission, required over TCP), and decodes the daemon's
//! single status line into a [`Response`].
//!
//! ```no_run
//! # async fn demo() -> Result<(), savdi_core::ScanError> {
//! let client = savdi_core::Client::new("tcp", "127.0.0.1:4010")?;
//! let resp = client.scan_reader(&b"hello"[..]).await?;
//! assert!(!resp.infected);
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::pin::Pin;

/// A type-erased, `Send`-safe, boxed future, used where a trait method has
/// to stay object-safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Scanning client and its connection settings.
pub mod client;
/// Error type for construction and scan failures.
pub mod error;
/// Request framing, status decoding, line connection.
pub mod protocol;
/// Scan result type.
pub mod response;
/// Readers with a known byte length.
pub mod source;
/// Socket transports and dial-with-retry.
pub mod transport;

pub use client::Client;
pub use error::ScanError;
pub use protocol::{DEFAULT_SOCKET_PATH, STREAM_FILENAME, Verdict, decode_status};
pub use response::Response;
pub use source::{ReaderSource, SizedSource};
pub use transport::Transport;
