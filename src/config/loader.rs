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

//! Configuration loading and conversion into session settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use tokio::fs;

use super::types::{AuthConfig, RunnerConfig, ServerCheckConfig};
use super::utils::{expand_tilde, find_standard_key_file, get_current_username};
use crate::ssh::{AuthMethod, ServerCheckMethod, SessionSettings, SshRunner};

/// File name looked up in the working directory and the config directory.
pub const CONFIG_FILE_NAME: &str = "sshtasks.yaml";

impl RunnerConfig {
    /// Load configuration from a file.
    pub async fn load(path: &Path) -> Result<Self> {
        let expanded_path = expand_tilde(path);

        let content = fs::read_to_string(&expanded_path)
            .await
            .with_context(|| format!("Failed to read configuration file at {}. Please check file permissions and ensure the file is accessible.", expanded_path.display()))?;

        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse configuration file at {}", expanded_path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Invalid YAML runner configuration")
    }

    /// Load from the first standard location that has a configuration file:
    /// 1. `./sshtasks.yaml`
    /// 2. the per-user config directory (`~/.config/sshtasks/sshtasks.yaml` on Linux)
    ///
    /// Returns `Ok(None)` when neither exists.
    pub async fn load_default() -> Result<Option<Self>> {
        for path in Self::standard_locations() {
            if fs::try_exists(&path).await.unwrap_or(false) {
                tracing::debug!("Found runner configuration at {}", path.display());
                return Self::load(&path).await.map(Some);
            }
        }
        tracing::debug!("No runner configuration found in standard locations");
        Ok(None)
    }

    fn standard_locations() -> Vec<PathBuf> {
        let mut locations = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(proj_dirs) = ProjectDirs::from("", "", "sshtasks") {
            locations.push(proj_dirs.config_dir().join(CONFIG_FILE_NAME));
        }
        locations
    }

    /// Resolve defaults and build the settings for one session.
    pub fn to_settings(&self) -> Result<SessionSettings> {
        let user = self.user.clone().unwrap_or_else(get_current_username);
        let auth = match &self.auth {
            Some(auth) => auth.to_auth_method()?,
            None => {
                let key_file = find_standard_key_file()
                    .context("No authentication configured and no key file found in ~/.ssh")?;
                AuthMethod::with_key_file(key_file, None)
            }
        };

        let mut settings = SessionSettings::new(user, self.host.clone(), auth);
        settings.port = self.port;
        settings.connect_timeout = Duration::from_secs(self.connect_timeout);
        settings.command_timeout = self.command_timeout.map(Duration::from_secs);
        settings.keepalive_interval = self.keepalive_interval.map(Duration::from_secs);
        settings.server_check = self.server_check.to_server_check();
        Ok(settings)
    }
}

impl AuthConfig {
    pub fn to_auth_method(&self) -> Result<AuthMethod> {
        let passphrase = self.passphrase.as_deref();
        match (&self.key_file, &self.key_content) {
            (Some(key_file), None) => Ok(AuthMethod::with_key_file(
                expand_tilde(Path::new(key_file)),
                passphrase,
            )),
            (None, Some(key_content)) => Ok(AuthMethod::with_key_content(key_content, passphrase)),
            (Some(_), Some(_)) => {
                anyhow::bail!("key_file and key_content are mutually exclusive")
            }
            (None, None) => match find_standard_key_file() {
                Some(key_file) => Ok(AuthMethod::with_key_file(key_file, passphrase)),
                None => anyhow::bail!("auth has neither key_file nor key_content"),
            },
        }
    }
}

impl ServerCheckConfig {
    pub fn to_server_check(&self) -> ServerCheckMethod {
        match self {
            ServerCheckConfig::NoCheck => ServerCheckMethod::NoCheck,
            ServerCheckConfig::KnownHosts => ServerCheckMethod::DefaultKnownHostsFile,
            ServerCheckConfig::KnownHostsFile(path) => {
                ServerCheckMethod::KnownHostsFile(expand_tilde(path))
            }
        }
    }
}

impl SshRunner {
    /// Build a runner from a loaded configuration.
    pub fn from_config(config: &RunnerConfig) -> Result<Self> {
        Ok(Self::from_settings(config.to_settings()?))
    }
}
