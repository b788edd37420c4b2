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

//! Configuration type definitions.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::ssh::{DEFAULT_PORT, SSH_CONNECT_TIMEOUT_SECS};

/// Runner configuration, usually read from YAML.
///
/// ```yaml
/// user: deploy
/// host: build-01.example.com
/// port: 2222
/// auth:
///   key_file: ~/.ssh/id_ed25519
/// command_timeout: 600
/// server_check: known_hosts
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Remote user; defaults to the local user.
    #[serde(default)]
    pub user: Option<String>,

    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Key source; the standard key file is used when omitted.
    #[serde(default)]
    pub auth: Option<AuthConfig>,

    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Per-command timeout in seconds.
    #[serde(default)]
    pub command_timeout: Option<u64>,

    /// Keepalive interval in seconds.
    #[serde(default)]
    pub keepalive_interval: Option<u64>,

    #[serde(default)]
    pub server_check: ServerCheckConfig,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_connect_timeout() -> u64 {
    SSH_CONNECT_TIMEOUT_SECS
}

/// Key material for authentication.
///
/// Exactly one of `key_file` and `key_content` may be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ServerCheckConfig {
    #[default]
    NoCheck,
    /// `~/.ssh/known_hosts`
    KnownHosts,
    KnownHostsFile(PathBuf),
}
