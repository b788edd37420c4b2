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

//! Streaming remote file handles against an in-memory remote scp.

mod common;

use std::fs;
use std::io::ErrorKind;

use sshtasks::{Error, RemoteFileReader, RemoteFileWriter};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};

use common::{fake_sink, fake_source, pair, refusing_sink};

#[tokio::test]
async fn test_open_reports_available_bytes() {
    let remote = TempDir::new().unwrap();
    let path = remote.path().join("a file");
    let content: Vec<u8> = (0..100_000u32).map(|i| (i % 13) as u8).collect();
    fs::write(&path, &content).unwrap();

    let (client, server) = pair();
    let source = tokio::spawn(fake_source(server, path.clone(), false));

    let mut reader = RemoteFileReader::open(client, &path.to_string_lossy())
        .await
        .unwrap();
    let available = reader.available();
    assert!(available > 0);
    assert_eq!(available, content.len() as u64);
    assert_eq!(reader.size(), content.len() as u64);
    assert!(reader.buffered() as u64 <= available);

    let mut copied = Vec::new();
    let n = tokio::io::copy(&mut reader, &mut copied).await.unwrap();
    assert_eq!(n, available);
    assert_eq!(copied, content);
    assert_eq!(reader.available(), 0);

    reader.close().await.unwrap();
    source.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_created_file_reads_back_as_one_line() {
    let remote = TempDir::new().unwrap();
    let path = remote.path().join("remoteFile");
    let path_str = path.to_string_lossy().to_string();

    let (client, server) = pair();
    let sink = tokio::spawn(fake_sink(server, path.clone()));
    let mut writer = RemoteFileWriter::create(client, &path_str, 11).await.unwrap();
    writer.write_all(b"hello world").await.unwrap();
    assert_eq!(writer.written(), 11);
    writer.close().await.unwrap();
    let log = sink.await.unwrap().unwrap();
    assert_eq!(log, vec!["C0644 11 remoteFile".to_string()]);

    let (client, server) = pair();
    let source = tokio::spawn(fake_source(server, path.clone(), false));
    let reader = RemoteFileReader::open(client, &path_str).await.unwrap();
    let mut lines = BufReader::new(reader).lines();
    let mut collected = Vec::new();
    while let Some(line) = lines.next_line().await.unwrap() {
        collected.push(line);
    }
    assert_eq!(collected, vec!["hello world".to_string()]);

    lines.into_inner().into_inner().close().await.unwrap();
    source.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_open_missing_file_is_not_found() {
    let (client, server) = pair();
    let source = tokio::spawn(fake_source(server, "/no/such/file".into(), false));

    let err = match RemoteFileReader::open(client, "/no/such/file").await {
        Ok(_) => panic!("opened a missing file"),
        Err(err) => err,
    };
    source.await.unwrap().unwrap();
    assert!(
        matches!(err, Error::RemoteNotFound { ref path } if path == "/no/such/file"),
        "unexpected {err:?}"
    );
}

#[tokio::test]
async fn test_open_directory_is_remote_error() {
    let remote = TempDir::new().unwrap();
    let (client, server) = pair();
    let source = tokio::spawn(fake_source(server, remote.path().to_path_buf(), false));

    let err = match RemoteFileReader::open(client, &remote.path().to_string_lossy()).await {
        Ok(_) => panic!("opened a directory"),
        Err(err) => err,
    };
    source.await.unwrap().unwrap();
    assert!(matches!(err, Error::Remote(_)), "unexpected {err:?}");
}

#[tokio::test]
async fn test_short_write_fails_on_close() {
    let remote = TempDir::new().unwrap();
    let path = remote.path().join("partial");

    let (client, server) = pair();
    let sink = tokio::spawn(fake_sink(server, path.clone()));
    let mut writer = RemoteFileWriter::create(client, &path.to_string_lossy(), 5)
        .await
        .unwrap();
    writer.write_all(b"abc").await.unwrap();

    match writer.close().await {
        Err(Error::Transfer {
            expected, actual, ..
        }) => {
            assert_eq!(expected, 5);
            assert_eq!(actual, 3);
        }
        other => panic!("expected Transfer, got {other:?}"),
    }
    let _ = sink.await;
}

#[tokio::test]
async fn test_write_past_declared_size_rejected() {
    let remote = TempDir::new().unwrap();
    let path = remote.path().join("exact");

    let (client, server) = pair();
    let sink = tokio::spawn(fake_sink(server, path.clone()));
    let mut writer = RemoteFileWriter::create(client, &path.to_string_lossy(), 4)
        .await
        .unwrap();

    let err = writer.write_all(b"too long").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(writer.written(), 4);

    writer.close().await.unwrap();
    sink.await.unwrap().unwrap();
    assert_eq!(fs::read(&path).unwrap(), b"too ");
}

#[tokio::test]
async fn test_refused_create_is_remote_write_error() {
    let (client, server) = pair();
    let sink = tokio::spawn(refusing_sink(server, "scp: /root/x: Permission denied"));

    let err = match RemoteFileWriter::create(client, "/root/x", 1).await {
        Ok(_) => panic!("created a refused file"),
        Err(err) => err,
    };
    sink.await.unwrap().unwrap();
    assert!(
        matches!(err, Error::RemoteWrite { ref path, .. } if path == "/root/x"),
        "unexpected {err:?}"
    );
}

#[tokio::test]
async fn test_create_rejects_directory_path() {
    let (client, _server) = pair();
    let err = match RemoteFileWriter::create(client, "/tmp/dir/", 1).await {
        Ok(_) => panic!("accepted a directory path"),
        Err(err) => err,
    };
    assert!(matches!(err, Error::InvalidCommand(_)), "unexpected {err:?}");
}

#[tokio::test]
async fn test_close_before_end_abandons_transfer() {
    let remote = TempDir::new().unwrap();
    let path = remote.path().join("big");
    fs::write(&path, vec![7u8; 4096]).unwrap();

    let (client, server) = pair();
    let source = tokio::spawn(fake_source(server, path.clone(), false));
    let mut reader = RemoteFileReader::open(client, &path.to_string_lossy())
        .await
        .unwrap();
    let mut head = [0u8; 16];
    reader.read_exact(&mut head).await.unwrap();
    assert_eq!(reader.available(), 4096 - 16);

    reader.close().await.unwrap();
    // The remote never gets its final acknowledgement.
    assert!(source.await.unwrap().is_err());
}

#[tokio::test]
async fn test_truncated_remote_data_is_unexpected_eof() {
    let (client, server) = pair();
    let source = tokio::spawn(async move {
        let mut remote = BufReader::new(server);
        let mut ack = [0u8; 1];
        remote.read_exact(&mut ack).await.unwrap();
        remote.write_all(b"C0644 8 cut\n").await.unwrap();
        remote.read_exact(&mut ack).await.unwrap();
        remote.write_all(b"1234").await.unwrap();
    });

    let mut reader = RemoteFileReader::open(client, "cut").await.unwrap();
    source.await.unwrap();
    let mut head = [0u8; 4];
    reader.read_exact(&mut head).await.unwrap();
    assert_eq!(&head, b"1234");
    assert_eq!(reader.available(), 4);

    let mut rest = [0u8; 4];
    let err = reader.read(&mut rest).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
}
