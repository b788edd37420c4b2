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

//! Utility functions for configuration management.

use std::path::{Path, PathBuf};

/// Key files tried, in order, when no key is configured.
const STANDARD_KEY_FILES: [&str; 4] = ["id_ed25519", "id_ecdsa", "id_rsa", "id_dsa"];

/// Expand a leading `~/` to the home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Some(rest) = path.to_str().and_then(|s| s.strip_prefix("~/")) {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

/// Name of the local user, used when no remote user is configured.
pub fn get_current_username() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .or_else(|_| std::env::var("LOGNAME"))
        .unwrap_or_else(|_| whoami::fallible::username().unwrap_or_else(|_| "user".to_string()))
}

/// First existing private key under `~/.ssh`.
pub fn find_standard_key_file() -> Option<PathBuf> {
    let ssh_dir = dirs::home_dir()?.join(".ssh");
    find_key_file_in(&ssh_dir)
}

fn find_key_file_in(ssh_dir: &Path) -> Option<PathBuf> {
    STANDARD_KEY_FILES
        .iter()
        .map(|name| ssh_dir.join(name))
        .find(|path| path.is_file())
        .inspect(|path| tracing::debug!("Using standard key file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn test_expand_tilde() {
        let expanded = expand_tilde(Path::new("~/.ssh/id_rsa"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expanded, home.join(".ssh/id_rsa"));
        }
        assert_eq!(
            expand_tilde(Path::new("/etc/ssh/key")),
            PathBuf::from("/etc/ssh/key")
        );
        assert_eq!(expand_tilde(Path::new("~user/x")), PathBuf::from("~user/x"));
    }

    #[test]
    fn test_current_username_not_empty() {
        assert!(!get_current_username().is_empty());
    }

    #[test]
    fn test_key_file_preference_order() {
        let dir = TempDir::new().unwrap();
        assert_eq!(find_key_file_in(dir.path()), None);

        std::fs::write(dir.path().join("id_rsa"), "rsa").unwrap();
        assert_eq!(find_key_file_in(dir.path()), Some(dir.path().join("id_rsa")));

        std::fs::write(dir.path().join("id_ed25519"), "ed").unwrap();
        assert_eq!(
            find_key_file_in(dir.path()),
            Some(dir.path().join("id_ed25519"))
        );
    }

    #[test]
    fn test_directory_named_like_key_is_ignored() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("id_ecdsa")).unwrap();
        std::fs::write(dir.path().join("id_dsa"), "dsa").unwrap();
        assert_eq!(find_key_file_in(dir.path()), Some(dir.path().join("id_dsa")));
    }
}
