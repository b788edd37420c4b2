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

//! Persistent SSH session runner.
//!
//! One [`SshRunner`] holds an authenticated session to one host and runs
//! shell commands with structured output capture, SCP uploads and
//! downloads, and streaming remote file handles on top of it.

pub mod config;
pub mod error;
pub mod exec;
pub mod scp;
pub mod ssh;
pub mod utils;

pub use config::RunnerConfig;
pub use error::{Error, Result};
pub use exec::{FailurePolicy, OutputHandler, ShellCommand};
pub use scp::{RemoteFileReader, RemoteFileWriter, ScpDownloadCommand, ScpUploadCommand};
pub use ssh::{AuthMethod, RemoteTask, ServerCheckMethod, SshRunner};
