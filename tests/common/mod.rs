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

//! In-memory stand-ins for a remote `scp -t` / `scp -f` process, plus a
//! scripted SSH server in [`sshd`].

#![allow(dead_code)]

pub mod sshd;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use sshtasks::scp::protocol::{read_ack, read_line, send_error, send_ok, send_record};
use sshtasks::scp::{Ack, Record};
use sshtasks::{Error, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream};

pub type Remote = BufReader<DuplexStream>;

/// Connected (client, remote) stream pair.
pub fn pair() -> (DuplexStream, DuplexStream) {
    tokio::io::duplex(64 * 1024)
}

async fn expect_ok(remote: &mut Remote) -> Result<()> {
    match read_ack(remote).await? {
        Ack::Ok => Ok(()),
        other => Err(Error::Protocol(format!("client answered {other:?}"))),
    }
}

/// Behave like `scp -t <target>`; returns every control line received.
pub async fn fake_sink(stream: DuplexStream, target: PathBuf) -> Result<Vec<String>> {
    let mut remote = BufReader::new(stream);
    let target_is_dir = target.is_dir();
    let mut dirs: Vec<PathBuf> = Vec::new();
    let mut log = Vec::new();

    send_ok(&mut remote).await?;
    while let Some(line) = read_line(&mut remote).await? {
        log.push(line.clone());
        let record = Record::parse(&line)?;
        let path_for = |name: &str| match dirs.last() {
            Some(dir) => dir.join(name),
            None if target_is_dir => target.join(name),
            None => target.clone(),
        };

        match record {
            Record::File { size, name, .. } => {
                let path = path_for(&name);
                send_ok(&mut remote).await?;
                let mut data = vec![0u8; size as usize];
                remote.read_exact(&mut data).await?;
                tokio::fs::write(&path, &data).await?;
                expect_ok(&mut remote).await?;
                send_ok(&mut remote).await?;
            }
            Record::Directory { name, .. } => {
                let path = path_for(&name);
                tokio::fs::create_dir_all(&path).await?;
                dirs.push(path);
                send_ok(&mut remote).await?;
            }
            Record::EndDirectory => {
                dirs.pop();
                send_ok(&mut remote).await?;
            }
            Record::Times { .. } => send_ok(&mut remote).await?,
        }
    }
    Ok(log)
}

/// A sink that refuses the transfer up front.
pub async fn refusing_sink(stream: DuplexStream, message: &str) -> Result<()> {
    let mut remote = BufReader::new(stream);
    send_error(&mut remote, message).await
}

/// Behave like `scp -f [-r] <path>`.
pub async fn fake_source(stream: DuplexStream, path: PathBuf, recursive: bool) -> Result<()> {
    let mut remote = BufReader::new(stream);
    expect_ok(&mut remote).await?;

    match tokio::fs::metadata(&path).await {
        Err(_) => {
            send_error(
                &mut remote,
                &format!("scp: {}: No such file or directory", path.display()),
            )
            .await
        }
        Ok(metadata) if metadata.is_dir() => {
            if recursive {
                send_directory(&mut remote, &path).await
            } else {
                send_error(
                    &mut remote,
                    &format!("scp: {}: not a regular file", path.display()),
                )
                .await
            }
        }
        Ok(_) => send_file(&mut remote, &path).await,
    }
}

async fn send_file(remote: &mut Remote, path: &Path) -> Result<()> {
    let data = tokio::fs::read(path).await?;
    send_record(
        remote,
        &Record::File {
            mode: 0o644,
            size: data.len() as u64,
            name: file_name(path),
        },
    )
    .await?;
    expect_ok(remote).await?;
    remote.write_all(&data).await?;
    send_ok(remote).await?;
    expect_ok(remote).await
}

fn send_directory<'a>(
    remote: &'a mut Remote,
    dir: &'a Path,
) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        send_record(
            remote,
            &Record::Directory {
                mode: 0o755,
                name: file_name(dir),
            },
        )
        .await?;
        expect_ok(remote).await?;

        let mut entries = Vec::new();
        let mut read_dir = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            entries.push(entry.path());
        }
        entries.sort();

        for entry in entries {
            if entry.is_dir() {
                send_directory(remote, &entry).await?;
            } else {
                send_file(remote, &entry).await?;
            }
        }

        send_record(remote, &Record::EndDirectory).await?;
        expect_ok(remote).await
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
