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

//! Capture of a running command's output.
//!
//! The session runner reads channel messages in a single loop and feeds
//! them into an [`OutputCapture`]. Stdout is split into lines once and each
//! line is forwarded to the handler, which may itself be a tuple of
//! handlers. The tail of raw stdout and stderr is retained so that a failed
//! command can be reported with what it printed last.

use std::time::Duration;

use encoding_rs::Encoding;

use super::command::ShellCommand;
use super::handler::{ExecStatus, OutputHandler};
use crate::error::{Error, Result};

/// Pre-allocated stdout capacity, matching a typical channel window chunk.
const STDOUT_BUFFER_SIZE: usize = 8192;

/// Small buffer for stderr, which is usually a few status lines.
const STDERR_BUFFER_SIZE: usize = 1024;

/// Bytes of each stream kept for error reports.
pub const RETAINED_OUTPUT_LIMIT: usize = 64 * 1024;

/// Splits a byte stream into decoded lines.
///
/// Chunk boundaries may fall anywhere, including inside a line or a
/// multi-byte character. Bytes after the last `\n` are held back until more
/// data arrives or [`finish`](Self::finish) flushes them as a final line.
#[derive(Debug)]
pub struct LineSplitter {
    pending: Vec<u8>,
    encoding: &'static Encoding,
}

impl LineSplitter {
    pub fn new(encoding: &'static Encoding) -> Self {
        Self {
            pending: Vec::new(),
            encoding,
        }
    }

    /// Feed a chunk, calling `emit` for every line it completes.
    pub fn push<F: FnMut(&str)>(&mut self, chunk: &[u8], mut emit: F) {
        let mut rest = chunk;
        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.pending.extend_from_slice(&rest[..pos]);
            self.emit_pending(&mut emit);
            rest = &rest[pos + 1..];
        }
        self.pending.extend_from_slice(rest);
    }

    /// Flush an unterminated trailing line, if any.
    pub fn finish<F: FnMut(&str)>(&mut self, mut emit: F) {
        if !self.pending.is_empty() {
            self.emit_pending(&mut emit);
        }
    }

    /// Bytes received after the last line terminator.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    fn emit_pending<F: FnMut(&str)>(&mut self, emit: &mut F) {
        if self.pending.last() == Some(&b'\r') {
            self.pending.pop();
        }
        {
            let (line, _) = self
                .encoding
                .decode_without_bom_handling(&self.pending);
            emit(&line);
        }
        self.pending.clear();
    }
}

/// Keeps the last `limit` bytes of a stream.
#[derive(Debug)]
pub struct OutputTail {
    buf: Vec<u8>,
    limit: usize,
    dropped: u64,
}

impl OutputTail {
    pub fn new(capacity: usize, limit: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity.min(limit)),
            limit,
            dropped: 0,
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        let keep = &data[data.len().saturating_sub(self.limit)..];
        self.dropped += (data.len() - keep.len()) as u64;

        let overflow = (self.buf.len() + keep.len()).saturating_sub(self.limit);
        if overflow > 0 {
            self.buf.drain(..overflow);
            self.dropped += overflow as u64;
        }
        self.buf.extend_from_slice(keep);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Bytes discarded from the front of the stream.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn decode(&self, encoding: &'static Encoding) -> String {
        encoding
            .decode_without_bom_handling(&self.buf)
            .0
            .into_owned()
    }
}

/// Collects one command's output and drives its handler.
pub struct OutputCapture<H> {
    handler: H,
    splitter: LineSplitter,
    stdout: OutputTail,
    stderr: OutputTail,
    exit_status: Option<u32>,
}

impl<H: OutputHandler> OutputCapture<H> {
    pub fn new(handler: H, encoding: &'static Encoding) -> Self {
        Self {
            handler,
            splitter: LineSplitter::new(encoding),
            stdout: OutputTail::new(STDOUT_BUFFER_SIZE, RETAINED_OUTPUT_LIMIT),
            stderr: OutputTail::new(STDERR_BUFFER_SIZE, RETAINED_OUTPUT_LIMIT),
            exit_status: None,
        }
    }

    pub fn on_stdout(&mut self, data: &[u8]) {
        self.stdout.push(data);
        let handler = &mut self.handler;
        self.splitter.push(data, |line| handler.on_line(line));
    }

    pub fn on_stderr(&mut self, data: &[u8]) {
        self.stderr.push(data);
    }

    /// Record the exit status.
    ///
    /// This does not end the capture: data may still arrive after the
    /// status message.
    pub fn on_exit_status(&mut self, exit_status: u32) {
        self.exit_status = Some(exit_status);
    }

    pub fn exit_status(&self) -> Option<u32> {
        self.exit_status
    }

    pub fn stdout(&self) -> &OutputTail {
        &self.stdout
    }

    pub fn stderr(&self) -> &OutputTail {
        &self.stderr
    }

    /// Abandon the capture after `limit` elapsed.
    pub fn timed_out(self, command: &ShellCommand, limit: Duration) -> Error {
        let encoding = command.encoding();
        Error::Timeout {
            command: command.to_string(),
            limit,
            stdout: self.stdout.decode(encoding),
            stderr: self.stderr.decode(encoding),
        }
    }

    /// Close the capture once the channel is done.
    ///
    /// Flushes the trailing line, applies the command's failure policy and
    /// returns the handler's result.
    pub fn finish(mut self, command: &ShellCommand) -> Result<H::Output> {
        let handler = &mut self.handler;
        self.splitter.finish(|line| handler.on_line(line));

        let encoding = command.encoding();
        let Some(exit_code) = self.exit_status else {
            return Err(Error::CommandDidNotExit {
                command: command.to_string(),
                stdout: self.stdout.decode(encoding),
                stderr: self.stderr.decode(encoding),
            });
        };

        if exit_code != 0 && command.fail_on_error() {
            return Err(Error::CommandExecution {
                command: command.to_string(),
                exit_code,
                stdout: self.stdout.decode(encoding),
                stderr: self.stderr.decode(encoding),
            });
        }

        let command_line = command.to_string();
        self.handler.finish(&ExecStatus {
            command: &command_line,
            exit_code,
        })
    }
}
