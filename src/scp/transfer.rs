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

//! Whole-file and recursive SCP transfers.
//!
//! [`ScpUploadCommand`] and [`ScpDownloadCommand`] are tasks run by
//! [`SshRunner::run`](crate::ssh::SshRunner::run). The protocol exchange
//! itself (`transfer`) works on any buffered duplex stream.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use async_trait::async_trait;
use tokio::fs::{self, File};
use tokio::io::{AsyncBufRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use super::protocol::{
    read_ack, read_line, remote_command, remote_error, remote_write_error, send_ok, send_record,
    validate_name, Record, ScpMode, SCP_ERROR, SCP_OK, SCP_WARNING,
};
use crate::error::{Error, Result};
use crate::ssh::{RemoteTask, SessionContext};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Copy a local file or directory tree to the remote host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScpUploadCommand {
    local: PathBuf,
    remote: String,
    recursive: bool,
}

impl ScpUploadCommand {
    pub fn new(local: impl Into<PathBuf>, remote: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            remote: remote.into(),
            recursive: false,
        }
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn local(&self) -> &Path {
        &self.local
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    pub fn remote_command(&self) -> String {
        remote_command(ScpMode::Sink, &self.remote, self.recursive)
    }

    /// Run the sink exchange; returns the number of file bytes sent.
    pub async fn transfer<S>(&self, stream: &mut S) -> Result<u64>
    where
        S: AsyncBufRead + AsyncWrite + Unpin + Send,
    {
        let metadata = fs::metadata(&self.local).await?;
        if metadata.is_dir() && !self.recursive {
            return Err(Error::InvalidCommand(format!(
                "{} is a directory; use a recursive upload",
                self.local.display()
            )));
        }
        file_name(&self.local)?;

        self.expect_ok(stream).await?;

        if metadata.is_dir() {
            self.send_directory(stream, &self.local).await
        } else {
            self.send_file(stream, &self.local).await
        }
    }

    async fn expect_ok<S>(&self, stream: &mut S) -> Result<()>
    where
        S: AsyncBufRead + Unpin,
    {
        read_ack(stream)
            .await?
            .into_result(|message| remote_write_error(&self.remote, message))
    }

    async fn send_file<S>(&self, stream: &mut S, path: &Path) -> Result<u64>
    where
        S: AsyncBufRead + AsyncWrite + Unpin + Send,
    {
        let mut file = File::open(path).await?;
        let metadata = file.metadata().await?;
        let size = metadata.len();
        let name = file_name(path)?;

        debug!(path = %path.display(), size, "Sending file");
        send_record(
            stream,
            &Record::File {
                mode: file_mode(&metadata),
                size,
                name,
            },
        )
        .await?;
        self.expect_ok(stream).await?;

        let sent = tokio::io::copy(&mut (&mut file).take(size), stream).await?;
        if sent != size {
            return Err(Error::Transfer {
                path: path.display().to_string(),
                expected: size,
                actual: sent,
            });
        }
        stream.write_all(&[SCP_OK]).await?;
        stream.flush().await?;
        self.expect_ok(stream).await?;

        info!(path = %path.display(), remote = %self.remote, size, "File uploaded");
        Ok(size)
    }

    fn send_directory<'a, S>(&'a self, stream: &'a mut S, dir: &'a Path) -> BoxFuture<'a, Result<u64>>
    where
        S: AsyncBufRead + AsyncWrite + Unpin + Send,
    {
        Box::pin(async move {
            let metadata = fs::metadata(dir).await?;
            send_record(
                stream,
                &Record::Directory {
                    mode: file_mode(&metadata),
                    name: file_name(dir)?,
                },
            )
            .await?;
            self.expect_ok(stream).await?;

            let mut entries = Vec::new();
            let mut read_dir = fs::read_dir(dir).await?;
            while let Some(entry) = read_dir.next_entry().await? {
                entries.push(entry);
            }
            entries.sort_by_key(|entry| entry.file_name());

            let mut total = 0;
            for entry in entries {
                let file_type = entry.file_type().await?;
                let path = entry.path();
                if file_type.is_symlink() {
                    debug!(path = %path.display(), "Skipping symlink");
                } else if file_type.is_dir() {
                    total += self.send_directory(stream, &path).await?;
                } else if file_type.is_file() {
                    total += self.send_file(stream, &path).await?;
                }
            }

            send_record(stream, &Record::EndDirectory).await?;
            self.expect_ok(stream).await?;
            Ok(total)
        })
    }
}

#[async_trait]
impl RemoteTask for ScpUploadCommand {
    fn describe(&self) -> String {
        format!("upload {} to {}", self.local.display(), self.remote)
    }

    async fn run(&self, session: &SessionContext<'_>) -> Result<()> {
        let mut stream = BufReader::new(session.exec_stream(&self.remote_command()).await?);
        self.transfer(&mut stream).await?;
        stream.shutdown().await?;
        Ok(())
    }
}

/// Copy a remote file or directory tree to the local host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScpDownloadCommand {
    remote: String,
    local: PathBuf,
    recursive: bool,
}

impl ScpDownloadCommand {
    pub fn new(remote: impl Into<String>, local: impl Into<PathBuf>) -> Self {
        Self {
            remote: remote.into(),
            local: local.into(),
            recursive: false,
        }
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    pub fn local(&self) -> &Path {
        &self.local
    }

    pub fn remote_command(&self) -> String {
        remote_command(ScpMode::Source, &self.remote, self.recursive)
    }

    /// Run the source exchange; returns the number of file bytes received.
    pub async fn transfer<S>(&self, stream: &mut S) -> Result<u64>
    where
        S: AsyncBufRead + AsyncWrite + Unpin + Send,
    {
        send_ok(stream).await?;

        let mut dirs: Vec<PathBuf> = Vec::new();
        let mut total = 0;
        let mut files = 0usize;

        while let Some(line) = read_line(stream).await? {
            match line.as_bytes().first() {
                None => continue,
                Some(&SCP_WARNING) | Some(&SCP_ERROR) => {
                    return Err(remote_error(&self.remote, line[1..].to_string()));
                }
                _ => {}
            }

            match Record::parse(&line)? {
                Record::Times { .. } => send_ok(stream).await?,
                Record::File { mode, size, name } => {
                    let target = match dirs.last() {
                        Some(dir) => dir.join(&name),
                        None => self.top_level_target(&name).await,
                    };
                    send_ok(stream).await?;
                    receive_file(stream, &target, size, mode).await?;
                    read_ack(stream)
                        .await?
                        .into_result(|message| remote_error(&self.remote, message))?;
                    send_ok(stream).await?;
                    total += size;
                    files += 1;
                }
                Record::Directory { mode, name } => {
                    if !self.recursive {
                        return Err(Error::Protocol(format!(
                            "received directory {name} without recursive mode"
                        )));
                    }
                    let dir = match dirs.last() {
                        Some(parent) => parent.join(&name),
                        None => self.top_level_target(&name).await,
                    };
                    create_directory(&dir, mode).await?;
                    dirs.push(dir);
                    send_ok(stream).await?;
                }
                Record::EndDirectory => {
                    if dirs.pop().is_none() {
                        return Err(Error::Protocol("unbalanced end of directory".to_string()));
                    }
                    send_ok(stream).await?;
                }
            }
        }

        if !dirs.is_empty() {
            return Err(Error::Protocol(format!(
                "channel closed inside directory {}",
                dirs[dirs.len() - 1].display()
            )));
        }
        if files == 0 && !self.recursive {
            return Err(Error::Protocol(format!(
                "remote side sent nothing for {}",
                self.remote
            )));
        }
        info!(remote = %self.remote, local = %self.local.display(), files, total, "Download complete");
        Ok(total)
    }

    /// `<local>/<name>` when `local` is an existing directory, else `local`.
    async fn top_level_target(&self, name: &str) -> PathBuf {
        match fs::metadata(&self.local).await {
            Ok(metadata) if metadata.is_dir() => self.local.join(name),
            _ => self.local.clone(),
        }
    }
}

#[async_trait]
impl RemoteTask for ScpDownloadCommand {
    fn describe(&self) -> String {
        format!("download {} to {}", self.remote, self.local.display())
    }

    async fn run(&self, session: &SessionContext<'_>) -> Result<()> {
        let mut stream = BufReader::new(session.exec_stream(&self.remote_command()).await?);
        self.transfer(&mut stream).await?;
        stream.shutdown().await?;
        Ok(())
    }
}

async fn receive_file<S>(stream: &mut S, target: &Path, size: u64, mode: u32) -> Result<()>
where
    S: AsyncBufRead + Unpin,
{
    debug!(path = %target.display(), size, mode = format!("{mode:04o}"), "Receiving file");
    let mut file = File::create(target).await?;
    let copied = tokio::io::copy(&mut (&mut *stream).take(size), &mut file).await?;
    file.flush().await?;
    if copied != size {
        return Err(Error::Transfer {
            path: target.display().to_string(),
            expected: size,
            actual: copied,
        });
    }

    #[cfg(unix)]
    fs::set_permissions(target, std::fs::Permissions::from_mode(mode)).await?;

    Ok(())
}

async fn create_directory(dir: &Path, mode: u32) -> Result<()> {
    match fs::create_dir(dir).await {
        Ok(()) => {
            #[cfg(unix)]
            fs::set_permissions(dir, std::fs::Permissions::from_mode(mode | 0o700)).await?;
            #[cfg(not(unix))]
            let _ = mode;
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn file_name(path: &Path) -> Result<String> {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| Error::InvalidCommand(format!("{} has no file name", path.display())))?;
    validate_name(&name).map_err(|_| {
        Error::InvalidCommand(format!(
            "{} cannot be sent: its name does not fit an scp record",
            path.display()
        ))
    })?;
    Ok(name)
}

#[cfg(unix)]
fn file_mode(metadata: &std::fs::Metadata) -> u32 {
    metadata.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn file_mode(metadata: &std::fs::Metadata) -> u32 {
    if metadata.is_dir() {
        0o755
    } else {
        0o644
    }
}
