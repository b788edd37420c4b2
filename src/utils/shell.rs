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

//! Quoting of arguments and paths for the remote shell.
//!
//! Everything that ends up on a remote command line goes through [`quote`],
//! so a path such as `/tmp/a file` stays one token for `sh -c`.

use std::borrow::Cow;

use crate::error::{Error, Result};

/// Commands longer than this are refused before a channel is opened.
const MAX_COMMAND_LENGTH: usize = 16384;

/// Quote a single argument so the remote shell sees exactly one token.
///
/// Arguments made only of safe characters are returned unchanged.
pub fn quote(arg: &str) -> Cow<'_, str> {
    if arg.is_empty() {
        return Cow::Borrowed("''");
    }
    shell_escape::unix::escape(Cow::Borrowed(arg))
}

/// Join an argument vector into one command line, quoting each element.
pub fn join_args<I, S>(args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    args.into_iter()
        .map(|arg| quote(arg.as_ref()).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Reject command lines that cannot be sent as an exec request.
pub fn validate_command_line(command: &str) -> Result<()> {
    if command.trim().is_empty() {
        return Err(Error::InvalidCommand("empty command not allowed".to_string()));
    }

    if command.len() > MAX_COMMAND_LENGTH {
        return Err(Error::InvalidCommand(format!(
            "command too long: {} bytes (max: {MAX_COMMAND_LENGTH} bytes)",
            command.len()
        )));
    }

    if command.contains('\0') {
        return Err(Error::InvalidCommand(
            "command contains null bytes".to_string(),
        ));
    }

    Ok(())
}
