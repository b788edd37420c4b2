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

//! Client side of the SCP wire protocol.
//!
//! The client drives a remote `scp` process over an exec channel:
//! `scp -t` (sink) when uploading and `scp -f` (source) when downloading.
//!
//! Control records are single lines:
//!
//! - `C<mode> <size> <name>` - a regular file follows (exactly `size` bytes,
//!   then a `\0` status byte)
//! - `D<mode> 0 <name>` - enter a directory
//! - `E` - leave the current directory
//! - `T<mtime> 0 <atime> 0` - times for the next record
//!
//! Every record is answered with one status byte: `0` (ok), `1` (warning)
//! or `2` (error). Non-zero status bytes are followed by a message line.

use std::fmt;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::utils::shell::quote;

pub const SCP_OK: u8 = 0;
pub const SCP_WARNING: u8 = 1;
pub const SCP_ERROR: u8 = 2;

/// Maximum control line length accepted from the remote side.
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Which side of the transfer the remote `scp` plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScpMode {
    /// Remote receives files (`-t`)
    Sink,
    /// Remote sends files (`-f`)
    Source,
}

impl fmt::Display for ScpMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScpMode::Sink => write!(f, "sink"),
            ScpMode::Source => write!(f, "source"),
        }
    }
}

/// Build the remote command line that starts `scp` in `mode` for `path`.
///
/// The path is quoted as a single shell token and preceded by `--`, so
/// names with whitespace or a leading dash reach `scp` unchanged.
pub fn remote_command(mode: ScpMode, path: &str, recursive: bool) -> String {
    let flag = match mode {
        ScpMode::Sink => "-t",
        ScpMode::Source => "-f",
    };
    let recursive = if recursive { "-r " } else { "" };
    format!("scp {recursive}{flag} -- {}", quote(path))
}

/// One SCP control record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    File { mode: u32, size: u64, name: String },
    Directory { mode: u32, name: String },
    EndDirectory,
    Times { mtime: u64, atime: u64 },
}

impl Record {
    /// Parse a control line without its trailing newline.
    pub fn parse(line: &str) -> Result<Self> {
        let mut chars = line.chars();
        let kind = chars
            .next()
            .ok_or_else(|| Error::Protocol("empty control record".to_string()))?;
        let body = chars.as_str();

        match kind {
            'C' | 'D' => {
                let parts: Vec<&str> = body.splitn(3, ' ').collect();
                if parts.len() != 3 {
                    return Err(Error::Protocol(format!("invalid header: {line}")));
                }
                let mode = u32::from_str_radix(parts[0], 8)
                    .map_err(|_| Error::Protocol(format!("invalid mode: {}", parts[0])))?
                    & 0o777;
                let size: u64 = parts[1]
                    .parse()
                    .map_err(|_| Error::Protocol(format!("invalid size: {}", parts[1])))?;
                let name = parts[2].to_string();
                validate_name(&name)?;

                if kind == 'C' {
                    Ok(Record::File { mode, size, name })
                } else {
                    Ok(Record::Directory { mode, name })
                }
            }
            'E' if body.is_empty() => Ok(Record::EndDirectory),
            'T' => {
                let parts: Vec<&str> = body.split_whitespace().collect();
                if parts.len() != 4 {
                    return Err(Error::Protocol(format!("invalid times record: {line}")));
                }
                let parse = |s: &str| {
                    s.parse::<u64>()
                        .map_err(|_| Error::Protocol(format!("invalid time: {s}")))
                };
                Ok(Record::Times {
                    mtime: parse(parts[0])?,
                    atime: parse(parts[2])?,
                })
            }
            _ => Err(Error::Protocol(format!("unexpected record: {line}"))),
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Record::File { mode, size, name } => write!(f, "C{mode:04o} {size} {name}"),
            Record::Directory { mode, name } => write!(f, "D{mode:04o} 0 {name}"),
            Record::EndDirectory => write!(f, "E"),
            Record::Times { mtime, atime } => write!(f, "T{mtime} 0 {atime} 0"),
        }
    }
}

/// Reject names that would escape the target directory or break framing.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\n')
    {
        return Err(Error::Protocol(format!("invalid file name: {name:?}")));
    }
    Ok(())
}

/// Status reply to a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    Ok,
    Warning(String),
    Error(String),
}

impl Ack {
    /// Convert a non-ok reply with `on_failure`, which receives the message.
    pub fn into_result<F>(self, on_failure: F) -> Result<()>
    where
        F: FnOnce(String) -> Error,
    {
        match self {
            Ack::Ok => Ok(()),
            Ack::Warning(message) | Ack::Error(message) => Err(on_failure(message)),
        }
    }
}

/// Read one newline-terminated line; `None` on a clean end of stream.
pub async fn read_line<R>(reader: &mut R) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let n = (&mut *reader)
        .take(MAX_LINE_LENGTH as u64 + 1)
        .read_until(b'\n', &mut buf)
        .await?;
    if n == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
    } else if buf.len() > MAX_LINE_LENGTH {
        return Err(Error::Protocol(format!(
            "line too long (max {MAX_LINE_LENGTH} bytes)"
        )));
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

/// Read a status byte and, for warnings and errors, the message after it.
pub async fn read_ack<R>(reader: &mut R) -> Result<Ack>
where
    R: AsyncBufRead + Unpin,
{
    let mut status = [0u8; 1];
    if reader.read(&mut status).await? == 0 {
        return Err(Error::Protocol(
            "remote scp closed the channel; is scp installed on the remote host?".to_string(),
        ));
    }
    match status[0] {
        SCP_OK => Ok(Ack::Ok),
        code @ (SCP_WARNING | SCP_ERROR) => {
            let message = read_line(reader).await?.unwrap_or_default();
            if code == SCP_WARNING {
                Ok(Ack::Warning(message))
            } else {
                Ok(Ack::Error(message))
            }
        }
        other => Err(Error::Protocol(format!("unexpected status byte {other:#04x}"))),
    }
}

pub async fn send_ok<W>(writer: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&[SCP_OK]).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn send_error<W>(writer: &mut W, message: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut frame = Vec::with_capacity(message.len() + 2);
    frame.push(SCP_ERROR);
    frame.extend_from_slice(message.as_bytes());
    frame.push(b'\n');
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn send_record<W>(writer: &mut W, record: &Record) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    tracing::trace!(%record, "Sending scp record");
    writer.write_all(format!("{record}\n").as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Map an error message from the remote `scp` for `path`.
pub(crate) fn remote_error(path: &str, message: String) -> Error {
    if message.contains("No such file or directory") {
        Error::RemoteNotFound {
            path: path.to_string(),
        }
    } else {
        Error::Remote(message)
    }
}

pub(crate) fn remote_write_error(path: &str, message: String) -> Error {
    Error::RemoteWrite {
        path: path.to_string(),
        message,
    }
}
