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

use async_trait::async_trait;

use super::runner::SessionContext;
use crate::error::Result;
use crate::exec::{DiscardHandler, ShellCommand};

/// A unit of remote work run through [`SshRunner::run`](super::SshRunner::run).
///
/// Implementations receive a [`SessionContext`] that is valid while the
/// runner's command lock is held; it must not be stored.
#[async_trait]
pub trait RemoteTask: Send + Sync {
    /// Short human readable description, used in logs.
    fn describe(&self) -> String;

    async fn run(&self, session: &SessionContext<'_>) -> Result<()>;
}

#[async_trait]
impl RemoteTask for ShellCommand {
    fn describe(&self) -> String {
        self.to_string()
    }

    async fn run(&self, session: &SessionContext<'_>) -> Result<()> {
        session.execute(self, DiscardHandler).await
    }
}
