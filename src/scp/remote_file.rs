// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Streaming handles on a single remote file.
//!
//! Each handle owns one SCP exchange. Finish it with `close().await`;
//! dropping a handle without closing it drops the channel and aborts the
//! transfer on the remote side.

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadBuf, Take};
use tracing::debug;

use super::protocol::{
    read_ack, read_line, remote_error, remote_write_error, send_ok, send_record, validate_name,
    Record, SCP_ERROR, SCP_OK, SCP_WARNING,
};
use super::ScpStream;
use crate::error::{Error, Result};

/// Mode sent for files created through [`RemoteFileWriter`].
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Reads one remote file as it arrives from `scp -f`.
pub struct RemoteFileReader<S = ScpStream> {
    remote_path: String,
    size: u64,
    inner: Take<BufReader<S>>,
}

impl<S> RemoteFileReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Start reading over a stream connected to `scp -f -- <remote_path>`.
    ///
    /// Returns once the file header has arrived; no file data is read yet.
    pub async fn open(stream: S, remote_path: &str) -> Result<Self> {
        let mut stream = BufReader::new(stream);
        send_ok(&mut stream).await?;

        loop {
            let line = read_line(&mut stream).await?.ok_or_else(|| {
                Error::Protocol(format!("channel closed before {remote_path} was sent"))
            })?;
            match line.as_bytes().first() {
                Some(&SCP_WARNING) | Some(&SCP_ERROR) => {
                    return Err(remote_error(remote_path, line[1..].to_string()));
                }
                _ => {}
            }

            match Record::parse(&line)? {
                Record::Times { .. } => send_ok(&mut stream).await?,
                Record::File { size, .. } => {
                    send_ok(&mut stream).await?;
                    debug!(path = %remote_path, size, "Opened remote file");
                    return Ok(Self {
                        remote_path: remote_path.to_string(),
                        size,
                        inner: stream.take(size),
                    });
                }
                Record::Directory { .. } => {
                    return Err(Error::Remote(format!("{remote_path}: not a regular file")));
                }
                Record::EndDirectory => {
                    return Err(Error::Protocol(format!(
                        "unexpected end of directory while opening {remote_path}"
                    )));
                }
            }
        }
    }

    pub fn remote_path(&self) -> &str {
        &self.remote_path
    }

    /// Size announced by the remote side.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Bytes of the file not yet consumed by the caller.
    pub fn available(&self) -> u64 {
        self.inner.limit()
    }

    /// File bytes already received and buffered locally.
    pub fn buffered(&self) -> usize {
        let buffered = self.inner.get_ref().buffer().len() as u64;
        buffered.min(self.inner.limit()) as usize
    }

    /// Finish the exchange.
    ///
    /// When the whole file was consumed this reads the remote status byte
    /// and acknowledges it. Closing early abandons the rest of the file.
    pub async fn close(self) -> Result<()> {
        let remaining = self.inner.limit();
        let mut stream = self.inner.into_inner();

        if remaining > 0 {
            debug!(path = %self.remote_path, remaining, "Closing remote file before end");
            stream.shutdown().await?;
            return Ok(());
        }

        read_ack(&mut stream)
            .await?
            .into_result(|message| remote_error(&self.remote_path, message))?;
        send_ok(&mut stream).await?;
        stream.shutdown().await?;
        Ok(())
    }
}

impl<S> AsyncRead for RemoteFileReader<S>
where
    S: AsyncRead + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let remaining = this.inner.limit();
        if remaining == 0 || buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        let before = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
        if buf.filled().len() == before {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "{} closed with {remaining} of {} bytes outstanding",
                    this.remote_path, this.size
                ),
            )));
        }
        Poll::Ready(Ok(()))
    }
}

/// Writes one remote file through `scp -t`.
///
/// The size is announced before any data, so exactly that many bytes
/// must be written before [`close`](Self::close).
pub struct RemoteFileWriter<S = ScpStream> {
    remote_path: String,
    size: u64,
    written: u64,
    stream: BufReader<S>,
}

impl<S> RemoteFileWriter<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Start a file over a stream connected to `scp -t -- <remote_path>`.
    pub async fn create(stream: S, remote_path: &str, size: u64) -> Result<Self> {
        let name = remote_path
            .rsplit('/')
            .next()
            .unwrap_or(remote_path)
            .to_string();
        validate_name(&name).map_err(|_| {
            Error::InvalidCommand(format!("{remote_path:?} does not name a file"))
        })?;

        let mut stream = BufReader::new(stream);
        read_ack(&mut stream)
            .await?
            .into_result(|message| remote_write_error(remote_path, message))?;

        send_record(
            &mut stream,
            &Record::File {
                mode: DEFAULT_FILE_MODE,
                size,
                name,
            },
        )
        .await?;
        read_ack(&mut stream)
            .await?
            .into_result(|message| remote_write_error(remote_path, message))?;

        debug!(path = %remote_path, size, "Created remote file");
        Ok(Self {
            remote_path: remote_path.to_string(),
            size,
            written: 0,
            stream,
        })
    }

    pub fn remote_path(&self) -> &str {
        &self.remote_path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Finish the file and wait for the remote side to confirm it.
    pub async fn close(mut self) -> Result<()> {
        if self.written != self.size {
            self.stream.shutdown().await?;
            return Err(Error::Transfer {
                path: self.remote_path,
                expected: self.size,
                actual: self.written,
            });
        }

        self.stream.write_all(&[SCP_OK]).await?;
        self.stream.flush().await?;
        read_ack(&mut self.stream)
            .await?
            .into_result(|message| remote_write_error(&self.remote_path, message))?;
        self.stream.shutdown().await?;
        debug!(path = %self.remote_path, size = self.size, "Closed remote file");
        Ok(())
    }
}

impl<S> AsyncWrite for RemoteFileWriter<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }
        let remaining = this.size - this.written;
        if remaining == 0 {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "write past declared size of {} ({} bytes)",
                    this.remote_path, this.size
                ),
            )));
        }

        let len = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        let n = ready!(Pin::new(&mut this.stream).poll_write(cx, &buf[..len]))?;
        this.written += n as u64;
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_flush(cx)
    }

    /// Only flushes; the protocol trailer is sent by `close`.
    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_flush(cx)
    }
}
