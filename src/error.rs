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

//! Error types for session, command and transfer operations.
//!
//! # Error Categories
//!
//! - Connection setup: [`Error::Authentication`], [`Error::Connectivity`]
//! - Command execution: [`Error::CommandExecution`], [`Error::CommandDidNotExit`],
//!   [`Error::EmptyOutput`], [`Error::Timeout`]
//! - Remote files and transfers: [`Error::RemoteNotFound`], [`Error::RemoteWrite`],
//!   [`Error::Transfer`], [`Error::Remote`], [`Error::Protocol`]
//!
//! Nothing in this crate retries on its own. Output captured before a
//! failure travels inside the error so callers can inspect it.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Errors returned by [`SshRunner`](crate::ssh::SshRunner) and friends.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The server rejected the key, or the key could not be read or decoded.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The host could not be reached or the handshake did not complete.
    #[error("cannot connect to {host}: {reason}")]
    Connectivity { host: String, reason: String },

    /// A fail-fast command exited with a non-zero status.
    ///
    /// `stdout` and `stderr` hold at most the last
    /// [`RETAINED_OUTPUT_LIMIT`](crate::exec::output::RETAINED_OUTPUT_LIMIT)
    /// bytes of each stream.
    #[error("command '{command}' failed with exit code {exit_code}")]
    CommandExecution {
        command: String,
        exit_code: u32,
        stdout: String,
        stderr: String,
    },

    /// The channel closed before the remote side reported an exit status.
    #[error("command '{command}' didn't exit")]
    CommandDidNotExit {
        command: String,
        stdout: String,
        stderr: String,
    },

    /// The remote path does not exist.
    #[error("remote path not found: {path}")]
    RemoteNotFound { path: String },

    /// The remote side refused to create or write a file.
    #[error("cannot write remote file {path}: {message}")]
    RemoteWrite { path: String, message: String },

    /// Source and destination byte counts differ after a transfer.
    #[error("transfer of {path} incomplete: expected {expected} bytes, got {actual}")]
    Transfer {
        path: String,
        expected: u64,
        actual: u64,
    },

    /// A single-line capture was requested but the command printed nothing.
    #[error("command '{command}' produced no output")]
    EmptyOutput { command: String },

    /// Any other error reported by the remote scp process.
    #[error("remote error: {0}")]
    Remote(String),

    /// The remote side broke the scp protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The command could not be rendered into a remote command line.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// The command did not complete within the configured timeout.
    ///
    /// Carries whatever output arrived before the channel was closed.
    #[error("command '{command}' timed out after {limit:?}")]
    Timeout {
        command: String,
        limit: Duration,
        stdout: String,
        stderr: String,
    },

    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Whether a caller may reasonably retry the operation.
    ///
    /// Only connection failures and timeouts qualify. A failed command is
    /// never retryable because its remote side effects may not be idempotent.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Connectivity { .. } | Error::Timeout { .. })
    }

    /// Output captured before a command failed, as `(stdout, stderr)`.
    pub fn captured_output(&self) -> Option<(&str, &str)> {
        match self {
            Error::CommandExecution { stdout, stderr, .. }
            | Error::CommandDidNotExit { stdout, stderr, .. }
            | Error::Timeout { stdout, stderr, .. } => Some((stdout.as_str(), stderr.as_str())),
            _ => None,
        }
    }

    /// Exit code carried by the error, if it came from a remote command.
    pub fn exit_code(&self) -> Option<u32> {
        match self {
            Error::CommandExecution { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }

    pub(crate) fn connectivity(host: impl Into<String>, reason: impl ToString) -> Self {
        Error::Connectivity {
            host: host.into(),
            reason: reason.to_string(),
        }
    }
}

/// A result type using the crate error.
pub type Result<T> = std::result::Result<T, Error>;
