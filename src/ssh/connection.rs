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

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use russh::client::{Config, Handle, Handler, Msg};
use russh::Channel;
use tracing::{debug, warn};

use super::auth::{authenticate, AuthMethod, ServerCheckMethod};
use crate::error::{Error, Result};

/// Default port for SSH connections
pub const DEFAULT_PORT: u16 = 22;

/// Timeout for establishing transport and authenticating.
pub const SSH_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Everything needed to open one session to one host.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub user: String,
    pub host: String,
    pub port: u16,
    pub auth: AuthMethod,
    pub server_check: ServerCheckMethod,
    pub connect_timeout: Duration,
    pub command_timeout: Option<Duration>,
    pub keepalive_interval: Option<Duration>,
}

impl SessionSettings {
    pub fn new(user: impl Into<String>, host: impl Into<String>, auth: AuthMethod) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
            port: DEFAULT_PORT,
            auth,
            server_check: ServerCheckMethod::default(),
            connect_timeout: Duration::from_secs(SSH_CONNECT_TIMEOUT_SECS),
            command_timeout: None,
            keepalive_interval: None,
        }
    }

    /// `user@host:port`, used in log lines.
    pub fn target(&self) -> String {
        format!("{}@{}:{}", self.user, self.host, self.port)
    }

    fn client_config(&self) -> Config {
        Config {
            keepalive_interval: self.keepalive_interval,
            ..Default::default()
        }
    }
}

/// An authenticated SSH connection.
///
/// Cloning is cheap; all clones share the same transport.
#[derive(Clone)]
pub struct Client {
    handle: Arc<Handle<ClientHandler>>,
    username: String,
    address: SocketAddr,
}

impl Client {
    /// Resolve, connect and authenticate within `settings.connect_timeout`.
    pub async fn connect(settings: &SessionSettings) -> Result<Self> {
        let limit = settings.connect_timeout;
        match tokio::time::timeout(limit, Self::connect_inner(settings)).await {
            Ok(result) => result,
            Err(_) => Err(Error::connectivity(
                &settings.host,
                format!("connection timed out after {} seconds", limit.as_secs()),
            )),
        }
    }

    async fn connect_inner(settings: &SessionSettings) -> Result<Self> {
        let host = settings.host.as_str();
        let config = Arc::new(settings.client_config());

        let socket_addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, settings.port))
            .await
            .map_err(|e| Error::connectivity(host, format!("cannot resolve address: {e}")))?
            .collect();

        let mut last_error = Error::connectivity(host, "could not resolve to any addresses");
        let mut connected = None;
        for socket_addr in socket_addrs {
            let handler = ClientHandler {
                hostname: host.to_string(),
                port: settings.port,
                server_check: settings.server_check.clone(),
            };
            debug!(%socket_addr, "Opening SSH transport");
            match russh::client::connect(config.clone(), socket_addr, handler).await {
                Ok(handle) => {
                    connected = Some((socket_addr, handle));
                    break;
                }
                Err(e) => {
                    warn!(%socket_addr, "SSH transport failed: {e}");
                    last_error = transport_error(host, e);
                }
            }
        }
        let (address, mut handle) = connected.ok_or(last_error)?;

        authenticate(&mut handle, &settings.user, &settings.auth).await?;

        Ok(Self {
            handle: Arc::new(handle),
            username: settings.user.clone(),
            address,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn address(&self) -> &SocketAddr {
        &self.address
    }

    /// Open a new session channel on this connection.
    pub async fn open_channel(&self) -> Result<Channel<Msg>> {
        Ok(self.handle.channel_open_session().await?)
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.handle
            .disconnect(russh::Disconnect::ByApplication, "", "")
            .await?;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("username", &self.username)
            .field("address", &self.address)
            .field("handle", &"Handle<ClientHandler>")
            .finish()
    }
}

/// Handshake failures keep their category; authentication errors are
/// produced later by [`authenticate`] and never pass through here.
fn transport_error(host: &str, err: Error) -> Error {
    match err {
        Error::Ssh(russh::Error::UnknownKey) => {
            Error::connectivity(host, "server host key verification failed")
        }
        Error::Connectivity { .. } => err,
        other => Error::connectivity(host, other),
    }
}

#[derive(Debug, Clone)]
pub struct ClientHandler {
    hostname: String,
    port: u16,
    server_check: ServerCheckMethod,
}

impl Handler for ClientHandler {
    type Error = Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool> {
        let trusted = self
            .server_check
            .verify(&self.hostname, self.port, server_public_key)?;
        if !trusted {
            warn!(host = %self.hostname, "Server host key rejected");
        }
        Ok(trusted)
    }
}
