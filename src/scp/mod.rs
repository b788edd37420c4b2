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

//! SCP file transfer over exec channels.

pub mod protocol;
pub mod remote_file;
pub mod transfer;

pub use protocol::{remote_command, Ack, Record, ScpMode};
pub use remote_file::{RemoteFileReader, RemoteFileWriter};
pub use transfer::{ScpDownloadCommand, ScpUploadCommand};

/// Byte stream of an exec channel running a remote `scp`.
pub type ScpStream = russh::ChannelStream<russh::client::Msg>;
