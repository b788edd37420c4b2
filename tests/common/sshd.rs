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

//! In-process SSH server that answers exec requests from a script.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use russh::keys::ssh_key::{self, LineEnding};
use russh::keys::{Algorithm, PrivateKey};
use russh::server::{Auth, Handle, Msg, Server as _, Session};
use russh::{Channel, ChannelId, CryptoVec};
use sshtasks::{AuthMethod, SshRunner};
use tokio::net::TcpListener;

/// One action taken by the server after an exec request.
#[derive(Debug, Clone)]
pub enum Step {
    Stdout(&'static [u8]),
    Stderr(&'static [u8]),
    Exit(u32),
    /// Send EOF and close the channel.
    Close,
    /// Stop answering but keep the channel open.
    Hang,
}

pub type Script = Vec<Step>;

/// Stdout, exit status and close in one go.
pub fn finished(stdout: &'static [u8], exit_code: u32) -> Script {
    vec![Step::Stdout(stdout), Step::Exit(exit_code), Step::Close]
}

pub fn random_key() -> PrivateKey {
    PrivateKey::random(&mut rand::thread_rng(), Algorithm::Ed25519).unwrap()
}

pub fn openssh_pem(key: &PrivateKey) -> String {
    key.to_openssh(LineEnding::LF).unwrap().as_str().to_owned()
}

/// Handle to a running scripted server.
pub struct ScriptedSshd {
    pub port: u16,
    client_key: PrivateKey,
}

impl ScriptedSshd {
    /// Serve `scripts`, keyed by the exact command line, on a loopback port.
    pub async fn start(scripts: Vec<(String, Script)>) -> Self {
        let client_key = random_key();
        let config = Arc::new(russh::server::Config {
            keys: vec![random_key()],
            auth_rejection_time: Duration::from_millis(10),
            auth_rejection_time_initial: Some(Duration::ZERO),
            ..Default::default()
        });
        let socket = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = socket.local_addr().unwrap().port();

        let mut server = ScriptedServer {
            scripts: Arc::new(scripts.into_iter().collect()),
            authorized: client_key.public_key().clone(),
        };
        tokio::spawn(async move {
            let _ = server.run_on_socket(config, &socket).await;
        });

        Self { port, client_key }
    }

    /// A runner authenticating with the authorized key.
    pub fn runner(&self) -> SshRunner {
        self.runner_with_key(&self.client_key)
    }

    pub fn runner_with_key(&self, key: &PrivateKey) -> SshRunner {
        SshRunner::new(
            "tester",
            "127.0.0.1",
            AuthMethod::with_key_content(&openssh_pem(key), None),
        )
        .with_port(self.port)
        .with_connect_timeout(Duration::from_secs(10))
    }
}

#[derive(Clone)]
struct ScriptedServer {
    scripts: Arc<HashMap<String, Script>>,
    authorized: ssh_key::PublicKey,
}

impl russh::server::Server for ScriptedServer {
    type Handler = ScriptedSession;

    fn new_client(&mut self, _peer_addr: Option<SocketAddr>) -> Self::Handler {
        ScriptedSession {
            scripts: Arc::clone(&self.scripts),
            authorized: self.authorized.clone(),
            channels: Vec::new(),
        }
    }
}

struct ScriptedSession {
    scripts: Arc<HashMap<String, Script>>,
    authorized: ssh_key::PublicKey,
    // Held so client data has somewhere to go.
    channels: Vec<Channel<Msg>>,
}

impl russh::server::Handler for ScriptedSession {
    type Error = anyhow::Error;

    async fn auth_publickey(
        &mut self,
        _user: &str,
        public_key: &ssh_key::PublicKey,
    ) -> Result<Auth, Self::Error> {
        if public_key.key_data() == self.authorized.key_data() {
            Ok(Auth::Accept)
        } else {
            Ok(Auth::Reject {
                proceed_with_methods: None,
                partial_success: false,
            })
        }
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        self.channels.push(channel);
        Ok(true)
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let command = String::from_utf8_lossy(data).into_owned();
        let script = self.scripts.get(&command).cloned().unwrap_or_else(|| {
            vec![
                Step::Stderr(b"sh: command not found\n"),
                Step::Exit(127),
                Step::Close,
            ]
        });
        let _ = session.channel_success(channel);
        tokio::spawn(play(session.handle(), channel, script));
        Ok(())
    }
}

async fn play(handle: Handle, channel: ChannelId, script: Script) {
    for step in script {
        let sent = match step {
            Step::Stdout(bytes) => handle
                .data(channel, CryptoVec::from_slice(bytes))
                .await
                .is_ok(),
            Step::Stderr(bytes) => handle
                .extended_data(channel, 1, CryptoVec::from_slice(bytes))
                .await
                .is_ok(),
            Step::Exit(code) => handle.exit_status_request(channel, code).await.is_ok(),
            Step::Close => {
                let _ = handle.eof(channel).await;
                handle.close(channel).await.is_ok()
            }
            Step::Hang => return,
        };
        if !sent {
            return;
        }
    }
}
