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

//! Persistent session runner.
//!
//! [`SshRunner`] owns at most one authenticated connection to a host and
//! opens a fresh channel for every command, transfer and file handle.
//!
//! # Locking
//!
//! Two per-runner locks are used:
//!
//! - the session lock guards lazy connection and channel creation;
//! - the command lock serializes the bodies of [`SshRunner::execute`] and
//!   [`SshRunner::run`].
//!
//! File handles only take the session lock while their channel is opened,
//! so an open [`RemoteFileReader`] does not block commands.

use std::path::Path;
use std::time::Duration;

use russh::client::Msg;
use russh::{Channel, ChannelMsg};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::auth::{AuthMethod, ServerCheckMethod};
use super::connection::{Client, SessionSettings};
use super::task::RemoteTask;
use crate::error::Result;
use crate::exec::{OutputCapture, OutputHandler, ShellCommand};
use crate::scp::protocol::{remote_command, ScpMode};
use crate::scp::{
    RemoteFileReader, RemoteFileWriter, ScpDownloadCommand, ScpStream, ScpUploadCommand,
};

/// Runs commands and transfers against one remote host.
pub struct SshRunner {
    settings: SessionSettings,
    session: Mutex<Option<Client>>,
    command_lock: Mutex<()>,
}

impl SshRunner {
    /// Create a runner. No connection is made until it is needed.
    pub fn new(user: impl Into<String>, host: impl Into<String>, auth: AuthMethod) -> Self {
        Self::from_settings(SessionSettings::new(user, host, auth))
    }

    pub fn from_settings(settings: SessionSettings) -> Self {
        Self {
            settings,
            session: Mutex::new(None),
            command_lock: Mutex::new(()),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.settings.port = port;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.settings.connect_timeout = timeout;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.settings.command_timeout = Some(timeout);
        self
    }

    pub fn with_server_check(mut self, server_check: ServerCheckMethod) -> Self {
        self.settings.server_check = server_check;
        self
    }

    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.settings.keepalive_interval = Some(interval);
        self
    }

    /// Replace the authentication token.
    ///
    /// A cached connection is dropped so the next operation authenticates
    /// with the new token.
    pub fn set_auth(&mut self, auth: AuthMethod) {
        self.settings.auth = auth;
        if self.session.get_mut().take().is_some() {
            debug!(target_host = %self.settings.host, "Dropped session after auth change");
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn host(&self) -> &str {
        &self.settings.host
    }

    /// Connect and authenticate unless a live session is already cached.
    pub async fn connect(&self) -> Result<()> {
        let mut guard = self.session.lock().await;
        self.live_client(&mut guard).await.map(|_| ())
    }

    /// Open a separate connection, authenticate, and close it again.
    ///
    /// The cached session, if any, is left untouched.
    pub async fn test_connect(&self) -> Result<()> {
        let client = Client::connect(&self.settings).await?;
        if let Err(e) = client.disconnect().await {
            warn!(target_host = %self.settings.host, "Disconnect after connection test failed: {e}");
        }
        info!(target_host = %self.settings.target(), "Connection test succeeded");
        Ok(())
    }

    /// Close the cached session, if any.
    pub async fn disconnect(&self) -> Result<()> {
        let client = self.session.lock().await.take();
        if let Some(client) = client {
            debug!(target_host = %self.settings.host, "Disconnecting");
            client.disconnect().await?;
        }
        Ok(())
    }

    /// Whether a live session is cached.
    pub async fn is_connected(&self) -> bool {
        self.session
            .lock()
            .await
            .as_ref()
            .is_some_and(|client| !client.is_closed())
    }

    /// Run `command` and feed its output to `handler`.
    ///
    /// ```no_run
    /// # async fn demo() -> sshtasks::Result<()> {
    /// use sshtasks::exec::{CaptureLinesHandler, ExitCodeHandler, ShellCommand};
    /// use sshtasks::ssh::{AuthMethod, SshRunner};
    ///
    /// let runner = SshRunner::new(
    ///     "deploy",
    ///     "build-01",
    ///     AuthMethod::with_key_file("/home/deploy/.ssh/id_ed25519", None),
    /// );
    /// let (code, lines) = runner
    ///     .execute(
    ///         &ShellCommand::new(["ls", "-A", "/srv/releases"]),
    ///         (ExitCodeHandler, CaptureLinesHandler::new()),
    ///     )
    ///     .await?;
    /// assert_eq!(code, 0);
    /// println!("{} releases", lines.len());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn execute<H: OutputHandler>(
        &self,
        command: &ShellCommand,
        handler: H,
    ) -> Result<H::Output> {
        let _serial = self.command_lock.lock().await;
        self.execute_unlocked(command, handler).await
    }

    /// Run a task while holding the command lock.
    pub async fn run<T: RemoteTask + ?Sized>(&self, task: &T) -> Result<()> {
        let _serial = self.command_lock.lock().await;
        debug!(target_host = %self.settings.host, task = %task.describe(), "Running task");
        task.run(&SessionContext { runner: self }).await
    }

    /// Copy a local file (or tree, when `recursive`) to `remote`.
    pub async fn upload(&self, local: impl AsRef<Path>, remote: &str, recursive: bool) -> Result<()> {
        self.run(&ScpUploadCommand::new(local.as_ref(), remote).recursive(recursive))
            .await
    }

    /// Copy a remote file (or tree, when `recursive`) to `local`.
    pub async fn download(
        &self,
        remote: &str,
        local: impl AsRef<Path>,
        recursive: bool,
    ) -> Result<()> {
        self.run(&ScpDownloadCommand::new(remote, local.as_ref()).recursive(recursive))
            .await
    }

    /// Open `remote_path` for streaming reads.
    pub async fn open_file(&self, remote_path: &str) -> Result<RemoteFileReader> {
        let stream = self
            .exec_stream(&remote_command(ScpMode::Source, remote_path, false))
            .await?;
        RemoteFileReader::open(stream, remote_path).await
    }

    /// Create `remote_path` for streaming writes of exactly `size` bytes.
    pub async fn create_file(&self, remote_path: &str, size: u64) -> Result<RemoteFileWriter> {
        let stream = self
            .exec_stream(&remote_command(ScpMode::Sink, remote_path, false))
            .await?;
        RemoteFileWriter::create(stream, remote_path, size).await
    }

    async fn live_client(&self, slot: &mut Option<Client>) -> Result<Client> {
        if let Some(client) = slot.as_ref() {
            if !client.is_closed() {
                return Ok(client.clone());
            }
            debug!(target_host = %self.settings.host, "Cached session closed, reconnecting");
        }
        debug!(target_host = %self.settings.target(), "Connecting");
        let client = Client::connect(&self.settings).await?;
        *slot = Some(client.clone());
        Ok(client)
    }

    async fn open_channel(&self) -> Result<Channel<Msg>> {
        let mut guard = self.session.lock().await;
        let client = self.live_client(&mut guard).await?;
        client.open_channel().await
    }

    async fn exec_stream(&self, command_line: &str) -> Result<ScpStream> {
        let channel = self.open_channel().await?;
        debug!(target_host = %self.settings.host, command = %command_line, "Starting exec stream");
        channel.exec(true, command_line).await?;
        Ok(channel.into_stream())
    }

    async fn execute_unlocked<H: OutputHandler>(
        &self,
        command: &ShellCommand,
        handler: H,
    ) -> Result<H::Output> {
        let command_line = command.command_line()?;
        let mut channel = self.open_channel().await?;
        debug!(target_host = %self.settings.host, command = %command_line, "Executing command");
        channel.exec(true, command_line.as_str()).await?;

        let mut capture = OutputCapture::new(handler, command.encoding());
        match self.settings.command_timeout {
            Some(limit) => {
                if tokio::time::timeout(limit, pump_output(&mut channel, &mut capture))
                    .await
                    .is_err()
                {
                    warn!(target_host = %self.settings.host, command = %command_line, "Command timed out");
                    let _ = channel.close().await;
                    return Err(capture.timed_out(command, limit));
                }
            }
            None => pump_output(&mut channel, &mut capture).await,
        }

        match capture.exit_status() {
            Some(0) => debug!(command = %command_line, "Command succeeded"),
            Some(exit_code) => debug!(command = %command_line, exit_code, "Command exited"),
            None => warn!(command = %command_line, "Channel closed without exit status"),
        }
        capture.finish(command)
    }
}

impl std::fmt::Debug for SshRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshRunner")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Read channel messages until the channel closes.
///
/// The exit status does not end the loop; data may still follow it.
async fn pump_output<H: OutputHandler>(channel: &mut Channel<Msg>, capture: &mut OutputCapture<H>) {
    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::Data { ref data } => capture.on_stdout(data),
            ChannelMsg::ExtendedData { ref data, ext } => {
                if ext == 1 {
                    capture.on_stderr(data);
                }
            }
            ChannelMsg::ExitStatus { exit_status } => capture.on_exit_status(exit_status),
            _ => {}
        }
    }
}

/// Access to the runner from inside a [`RemoteTask`].
///
/// Only exists while [`SshRunner::run`] holds the command lock.
pub struct SessionContext<'a> {
    runner: &'a SshRunner,
}

impl SessionContext<'_> {
    pub fn settings(&self) -> &SessionSettings {
        &self.runner.settings
    }

    /// Execute a command on a new channel of the same session.
    pub async fn execute<H: OutputHandler>(
        &self,
        command: &ShellCommand,
        handler: H,
    ) -> Result<H::Output> {
        self.runner.execute_unlocked(command, handler).await
    }

    /// Start `command_line` and hand back the raw channel stream.
    pub async fn exec_stream(&self, command_line: &str) -> Result<ScpStream> {
        self.runner.exec_stream(command_line).await
    }
}
