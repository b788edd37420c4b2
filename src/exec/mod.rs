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

//! Command model and output handling
//!
//! This module is organized into several submodules:
//! - `command`: what to run and how to react to its exit code
//! - `handler`: consumers that turn output lines into typed results
//! - `output`: line splitting and capture shared by all handlers

pub mod command;
pub mod handler;
pub mod output;

pub use command::{CommandLine, FailurePolicy, ShellCommand};
pub use handler::{
    CaptureLineHandler, CaptureLinesHandler, DiscardHandler, ExecStatus, ExitCodeHandler,
    OutputHandler,
};
pub use output::{LineSplitter, OutputCapture, OutputTail, RETAINED_OUTPUT_LIMIT};
