//! Byte sources whose length is known before streaming starts.
//!
//! A stream submission announces its byte count up front, so any reader
//! handed to [`Client::scan_reader`](crate::Client::scan_reader) must be able
//! to report how many bytes it will yield.

use std::io::{self, Cursor};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncSeekExt, ReadBuf};

use crate::BoxFuture;
use crate::error::ScanError;

/// A readable source that can report its remaining length.
pub trait SizedSource: AsyncRead + Unpin + Send {
    /// Number of bytes the source will yield from its current position, or
    /// [`ScanError::UnknownLength`] when it cannot tell.
    fn content_length(&mut self) -> BoxFuture<'_, Result<u64, ScanError>>;
}

impl SizedSource for &[u8] {
    fn content_length(&mut self) -> BoxFuture<'_, Result<u64, ScanError>> {
        let len = self.len() as u64;
        Box::pin(async move { Ok(len) })
    }
}

impl<T: AsRef<[u8]> + Unpin + Send> SizedSource for Cursor<T> {
    fn content_length(&mut self) -> BoxFuture<'_, Result<u64, ScanError>> {
        let total = self.get_ref().as_ref().len() as u64;
        let remaining = total.saturating_sub(self.position());
        Box::pin(async move { Ok(remaining) })
    }
}

/// Bytes between the current read position and the end of the file.
impl SizedSource for tokio::fs::File {
    fn content_length(&mut self) -> BoxFuture<'_, Result<u64, ScanError>> {
        Box::pin(async move {
            let position = self.stream_position().await?;
            let total = self.metadata().await?.len();
            Ok::<_, ScanError>(total.saturating_sub(position))
        })
    }
}

impl<S: SizedSource + ?Sized> SizedSource for &mut S {
    fn content_length(&mut self) -> BoxFuture<'_, Result<u64, ScanError>> {
        (**self).content_length()
    }
}

impl<S: SizedSource + ?Sized> SizedSource for Box<S> {
    fn content_length(&mut self) -> BoxFuture<'_, Result<u64, ScanError>> {
        (**self).content_length()
    }
}

/// Wraps an arbitrary reader with a caller-declared length.
///
/// Readers with no known length can still be wrapped with
/// [`ReaderSource::unknown`]; scanning them fails with
/// [`ScanError::UnknownLength`] before any connection is made.
#[derive(Debug)]
pub struct ReaderSource<R> {
    reader: R,
    len: Option<u64>,
}

impl<R: AsyncRead + Unpin + Send> ReaderSource<R> {
    pub fn with_length(reader: R, len: u64) -> Self {
        Self {
            reader,
            len: Some(len),
        }
    }

    pub fn unknown(reader: R) -> Self {
        Self { reader, len: None }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ReaderSource<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.reader).poll_read(cx, buf)
    }
}

impl<R: AsyncRead + Unpin + Send> SizedSource for ReaderSource<R> {
    fn content_length(&mut self) -> BoxFuture<'_, Result<u64, ScanError>> {
        let len = self.len;
        Box::pin(async move { len.ok_or(ScanError::UnknownLength) })
    }
}
