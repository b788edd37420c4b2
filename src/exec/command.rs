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

//! Description of a command to run on the remote host.

use std::fmt;

use encoding_rs::Encoding;

use crate::error::{Error, Result};
use crate::utils::shell;

/// How a command line is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
    /// Argument vector; every element is quoted as one shell token.
    Args(Vec<String>),
    /// Passed to the remote shell verbatim, pipes and globs included.
    FreeForm(String),
}

/// What to do when the remote process exits with a non-zero status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Fail the call with [`Error::CommandExecution`].
    #[default]
    FailFast,
    /// Hand the exit code to the output handler.
    Tolerate,
}

/// A command to execute over a session.
///
/// # Examples
///
/// ```
/// use sshtasks::exec::{FailurePolicy, ShellCommand};
///
/// let ls = ShellCommand::new(["ls", "-Al", "/tmp/a dir"]);
/// assert_eq!(ls.command_line().unwrap(), "ls -Al '/tmp/a dir'");
///
/// let exists = ShellCommand::free_form("test -d /srv && echo yes")
///     .with_failure_policy(FailurePolicy::Tolerate);
/// assert!(!exists.fail_on_error());
/// ```
#[derive(Clone)]
pub struct ShellCommand {
    line: CommandLine,
    policy: FailurePolicy,
    encoding: &'static Encoding,
}

impl ShellCommand {
    /// Build a fail-fast command from an argument vector.
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            line: CommandLine::Args(args.into_iter().map(Into::into).collect()),
            policy: FailurePolicy::FailFast,
            encoding: encoding_rs::UTF_8,
        }
    }

    /// Build a fail-fast command from a raw shell string.
    pub fn free_form(command: impl Into<String>) -> Self {
        Self {
            line: CommandLine::FreeForm(command.into()),
            policy: FailurePolicy::FailFast,
            encoding: encoding_rs::UTF_8,
        }
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Shorthand for choosing between [`FailurePolicy::FailFast`] and
    /// [`FailurePolicy::Tolerate`].
    pub fn set_fail_on_error(&mut self, fail_on_error: bool) {
        self.policy = if fail_on_error {
            FailurePolicy::FailFast
        } else {
            FailurePolicy::Tolerate
        };
    }

    /// Decode remote output with `encoding` instead of UTF-8.
    ///
    /// Output is split on `\n` bytes before decoding, so only
    /// ASCII-compatible encodings are accepted.
    pub fn with_encoding(mut self, encoding: &'static Encoding) -> Result<Self> {
        if !encoding.is_ascii_compatible() {
            return Err(Error::InvalidCommand(format!(
                "encoding {} is not ASCII-compatible",
                encoding.name()
            )));
        }
        self.encoding = encoding;
        Ok(self)
    }

    pub fn line(&self) -> &CommandLine {
        &self.line
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn fail_on_error(&self) -> bool {
        self.policy == FailurePolicy::FailFast
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    /// Render the string sent in the exec request.
    pub fn command_line(&self) -> Result<String> {
        let rendered = match &self.line {
            CommandLine::Args(args) => {
                if args.is_empty() {
                    return Err(Error::InvalidCommand(
                        "empty argument vector".to_string(),
                    ));
                }
                shell::join_args(args)
            }
            CommandLine::FreeForm(command) => command.clone(),
        };
        shell::validate_command_line(&rendered)?;
        Ok(rendered)
    }
}

impl fmt::Debug for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShellCommand")
            .field("line", &self.line)
            .field("policy", &self.policy)
            .field("encoding", &self.encoding.name())
            .finish()
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.line {
            CommandLine::Args(args) => write!(f, "{}", shell::join_args(args)),
            CommandLine::FreeForm(command) => write!(f, "{command}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_are_quoted() {
        let cmd = ShellCommand::new(["ls", "-lA", "/tmp/with space"]);
        assert_eq!(cmd.command_line().unwrap(), "ls -lA '/tmp/with space'");
        assert!(cmd.fail_on_error());
    }

    #[test]
    fn test_free_form_is_verbatim() {
        let cmd = ShellCommand::free_form("ls -lA /tmp | head -n 3");
        assert_eq!(cmd.command_line().unwrap(), "ls -lA /tmp | head -n 3");
        assert_eq!(cmd.line(), &CommandLine::FreeForm("ls -lA /tmp | head -n 3".into()));
    }

    #[test]
    fn test_empty_commands_rejected() {
        let empty_args = ShellCommand::new(Vec::<String>::new());
        assert!(matches!(
            empty_args.command_line(),
            Err(Error::InvalidCommand(_))
        ));

        let blank = ShellCommand::free_form("  ");
        assert!(matches!(blank.command_line(), Err(Error::InvalidCommand(_))));
    }

    #[test]
    fn test_failure_policy_toggle() {
        let mut cmd = ShellCommand::free_form("false");
        assert_eq!(cmd.failure_policy(), FailurePolicy::FailFast);
        cmd.set_fail_on_error(false);
        assert_eq!(cmd.failure_policy(), FailurePolicy::Tolerate);
        assert!(!cmd.fail_on_error());
    }

    #[test]
    fn test_encoding_must_be_ascii_compatible() {
        let latin = ShellCommand::free_form("cat f")
            .with_encoding(encoding_rs::WINDOWS_1252)
            .unwrap();
        assert_eq!(latin.encoding().name(), "windows-1252");

        assert!(ShellCommand::free_form("cat f")
            .with_encoding(encoding_rs::UTF_16LE)
            .is_err());
    }

    #[test]
    fn test_display_matches_command_line() {
        let cmd = ShellCommand::new(["echo", "a b"]);
        assert_eq!(cmd.to_string(), "echo 'a b'");
    }
}
