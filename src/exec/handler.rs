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

//! Output handlers that turn a command's line stream into typed results.
//!
//! Several handlers can consume the same execution by passing a tuple:
//!
//! ```
//! use sshtasks::exec::{CaptureLinesHandler, ExecStatus, ExitCodeHandler, OutputHandler};
//!
//! let mut handlers = (ExitCodeHandler, CaptureLinesHandler::new());
//! handlers.on_line("total 0");
//! let (code, lines) = handlers
//!     .finish(&ExecStatus { command: "ls -lA", exit_code: 0 })
//!     .unwrap();
//! assert_eq!(code, 0);
//! assert_eq!(lines, vec!["total 0"]);
//! ```

use crate::error::{Error, Result};

/// Final state of a command handed to [`OutputHandler::finish`].
#[derive(Debug, Clone, Copy)]
pub struct ExecStatus<'a> {
    /// Command line as displayed in errors.
    pub command: &'a str,
    pub exit_code: u32,
}

/// Consumer of a command's stdout lines.
///
/// Lines arrive without terminators and in the order the remote process
/// wrote them. A trailing line without a newline is delivered too.
pub trait OutputHandler: Send {
    type Output: Send;

    fn on_line(&mut self, line: &str);

    fn finish(self, status: &ExecStatus<'_>) -> Result<Self::Output>;
}

/// Returns the exit code and ignores the output.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExitCodeHandler;

impl OutputHandler for ExitCodeHandler {
    type Output = u32;

    fn on_line(&mut self, _line: &str) {}

    fn finish(self, status: &ExecStatus<'_>) -> Result<u32> {
        Ok(status.exit_code)
    }
}

/// Discards everything; used by [`SshRunner::run`](crate::ssh::SshRunner::run).
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardHandler;

impl OutputHandler for DiscardHandler {
    type Output = ();

    fn on_line(&mut self, _line: &str) {}

    fn finish(self, _status: &ExecStatus<'_>) -> Result<()> {
        Ok(())
    }
}

/// Returns the first line of output.
#[derive(Debug, Clone, Default)]
pub struct CaptureLineHandler {
    first: Option<String>,
}

impl CaptureLineHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputHandler for CaptureLineHandler {
    type Output = String;

    fn on_line(&mut self, line: &str) {
        if self.first.is_none() {
            self.first = Some(line.to_string());
        }
    }

    fn finish(self, status: &ExecStatus<'_>) -> Result<String> {
        self.first.ok_or_else(|| Error::EmptyOutput {
            command: status.command.to_string(),
        })
    }
}

/// Returns every line of output.
#[derive(Debug, Clone, Default)]
pub struct CaptureLinesHandler {
    lines: Vec<String>,
}

impl CaptureLinesHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputHandler for CaptureLinesHandler {
    type Output = Vec<String>;

    fn on_line(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }

    fn finish(self, _status: &ExecStatus<'_>) -> Result<Vec<String>> {
        Ok(self.lines)
    }
}

impl<A, B> OutputHandler for (A, B)
where
    A: OutputHandler,
    B: OutputHandler,
{
    type Output = (A::Output, B::Output);

    fn on_line(&mut self, line: &str) {
        self.0.on_line(line);
        self.1.on_line(line);
    }

    fn finish(self, status: &ExecStatus<'_>) -> Result<Self::Output> {
        Ok((self.0.finish(status)?, self.1.finish(status)?))
    }
}

impl<A, B, C> OutputHandler for (A, B, C)
where
    A: OutputHandler,
    B: OutputHandler,
    C: OutputHandler,
{
    type Output = (A::Output, B::Output, C::Output);

    fn on_line(&mut self, line: &str) {
        self.0.on_line(line);
        self.1.on_line(line);
        self.2.on_line(line);
    }

    fn finish(self, status: &ExecStatus<'_>) -> Result<Self::Output> {
        Ok((
            self.0.finish(status)?,
            self.1.finish(status)?,
            self.2.finish(status)?,
        ))
    }
}
