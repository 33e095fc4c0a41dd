//-
// Copyright (c) 2022, 2024, The imap-backup authors
//
// This file is part of imap-backup.
//
// imap-backup is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// imap-backup is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General Public License for
// more details.
//
// You should have received a copy of the GNU General Public License along with
// imap-backup. If not, see <http://www.gnu.org/licenses/>.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The configuration for one run of imap-backup.
///
/// This can be loaded from a TOML file passed with `--config`. Any values
/// given on the command line take precedence over those in the file. The
/// result is passed explicitly into everything that needs it; nothing reads
/// it from global state.
#[derive(Clone, Debug, Deserialize, Serialize, Default)]
pub struct BackupConfig {
    /// How to reach the IMAP server.
    #[serde(default)]
    pub imap: ImapConfig,

    /// Where the local archive lives.
    #[serde(default)]
    pub storage: StorageConfig,

    /// How failed remote sessions are retried.
    #[serde(default)]
    pub retry: RetryConfig,

    /// If non-empty, restrict commands to these remote folders.
    #[serde(default)]
    pub folders: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ImapConfig {
    /// The host name of the IMAP server.
    pub host: String,
    /// The IMAPS port.
    pub port: u16,
    /// The user name to log in as.
    pub user: String,
    /// The password. If unset, it is prompted for on the terminal, which is
    /// strongly preferred over storing it here.
    pub password: Option<String>,
    /// Skip TLS certificate verification.
    pub allow_insecure_tls_connections: bool,
}

impl Default for ImapConfig {
    fn default() -> Self {
        ImapConfig {
            host: String::new(),
            port: 993,
            user: String::new(),
            password: None,
            allow_insecure_tls_connections: false,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// The directory holding the `.mbox`/`.idx` pairs.
    ///
    /// If unset, `<host>/<user>` under the current directory is used.
    pub root: Option<PathBuf>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total number of attempts for a remote session, including the first.
    pub attempts: u32,
    /// Seconds to wait between attempts.
    pub delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            attempts: 3,
            delay_secs: 10,
        }
    }
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

impl BackupConfig {
    /// The local storage root, derived from the server and user if not
    /// configured explicitly.
    pub fn storage_root(&self) -> PathBuf {
        self.storage.root.clone().unwrap_or_else(|| {
            [&self.imap.host, &self.imap.user].iter().collect()
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_full_config() {
        let config: BackupConfig = toml::from_str(
            r#"
folders = ["INBOX", "Sent"]

[imap]
host = "imap.example.com"
port = 1993
user = "alice"
allow_insecure_tls_connections = true

[storage]
root = "/var/backup/alice"

[retry]
attempts = 5
delay_secs = 2
"#,
        )
        .unwrap();

        assert_eq!("imap.example.com", config.imap.host);
        assert_eq!(1993, config.imap.port);
        assert_eq!("alice", config.imap.user);
        assert_eq!(None, config.imap.password);
        assert!(config.imap.allow_insecure_tls_connections);
        assert_eq!(PathBuf::from("/var/backup/alice"), config.storage_root());
        assert_eq!(5, config.retry.attempts);
        assert_eq!(Duration::from_secs(2), config.retry.delay());
        assert_eq!(vec!["INBOX".to_owned(), "Sent".to_owned()], config.folders);
    }

    #[test]
    fn parse_minimal_config() {
        let config: BackupConfig = toml::from_str(
            r#"
[imap]
host = "mail.example.org"
user = "bob"
"#,
        )
        .unwrap();

        assert_eq!(993, config.imap.port);
        assert!(!config.imap.allow_insecure_tls_connections);
        assert_eq!(3, config.retry.attempts);
        assert!(config.folders.is_empty());
        assert_eq!(
            ["mail.example.org", "bob"].iter().collect::<PathBuf>(),
            config.storage_root()
        );
    }
}
