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

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use structopt::StructOpt;

use super::remote;
use crate::support::config::BackupConfig;
use crate::support::human_size::HumanSize;
use crate::support::sysexits::*;
use crate::sync::commands::{self, SyncReport};

#[derive(StructOpt)]
#[structopt(max_term_width = 80)]
enum Command {
    /// List the remote folders and how much in each is not yet backed up.
    Query(CommonOptions),
    /// Download every message not yet backed up into the local store.
    ///
    /// Messages already in the local store are never downloaded again, and
    /// nothing is ever removed from the local store, even if it has been
    /// deleted from the server.
    Backup(CommonOptions),
    /// Delete old messages from the server.
    Delete(DeleteSubcommand),
    /// List the folders in the local store and their sizes.
    ///
    /// This does not connect to the server.
    LocalQuery(CommonOptions),
    /// Upload every message in the local store that the server lacks.
    ///
    /// Folders that do not exist on the server are created. Each message gets
    /// the date of its first Received header as its internal date.
    Restore(CommonOptions),
}

#[derive(StructOpt, Default)]
pub(super) struct CommonOptions {
    /// Read settings from this TOML file. Options given on the command line
    /// override it.
    #[structopt(long, parse(from_os_str))]
    pub(super) config: Option<PathBuf>,
    /// The IMAP server to connect to
    #[structopt(long, short = "s")]
    pub(super) host: Option<String>,
    /// The IMAPS port [default: 993]
    #[structopt(long, short)]
    pub(super) port: Option<u16>,
    /// The user name to log in as
    #[structopt(long, short)]
    pub(super) user: Option<String>,
    /// Restrict the command to these folders (comma-separated)
    #[structopt(long, short = "r", use_delimiter = true)]
    pub(super) folders: Vec<String>,
    /// The local storage directory [default: <host>/<user>]
    #[structopt(long, short = "l", parse(from_os_str))]
    pub(super) root: Option<PathBuf>,
    /// Skip verification of the server's TLS certificate
    #[structopt(long = "allow-insecure-tls")]
    pub(super) allow_insecure_tls_connections: bool,
    /// Log more detail about what is going on
    #[structopt(long, short)]
    pub(super) verbose: bool,
}

/// Delete messages older than a number of months from the server.
///
/// The age of a message is determined by its internal date on the server,
/// which is usually when it was delivered. Messages are deleted whether or
/// not they have been backed up.
#[derive(StructOpt)]
pub(super) struct DeleteSubcommand {
    #[structopt(flatten)]
    pub(super) common: CommonOptions,
    /// Delete messages from before this many months ago.
    #[structopt(long, short)]
    pub(super) months: u32,
    /// Do not ask for confirmation.
    #[structopt(long, short)]
    pub(super) force: bool,
}

/// What to do once connected to the server.
pub(super) enum RemoteAction {
    Query,
    Backup,
    Delete { months: u32, force: bool },
    Restore,
}

pub fn main() {
    // Clap exits with status 1 instead of EX_USAGE if we use the more concise
    // API
    let cmd = Command::from_clap(&match Command::clap().get_matches_safe() {
        Ok(matches) => matches,
        Err(
            e @ clap::Error {
                kind: clap::ErrorKind::HelpDisplayed,
                ..
            },
        )
        | Err(
            e @ clap::Error {
                kind: clap::ErrorKind::VersionDisplayed,
                ..
            },
        ) => {
            println!("{}", e.message);
            return;
        }
        Err(e) => {
            eprintln!("{}", e.message);
            EX_USAGE.exit()
        }
    });

    let (common, action) = match cmd {
        Command::Query(common) => (common, Some(RemoteAction::Query)),
        Command::Backup(common) => (common, Some(RemoteAction::Backup)),
        Command::Delete(DeleteSubcommand {
            common,
            months,
            force,
        }) => (common, Some(RemoteAction::Delete { months, force })),
        Command::LocalQuery(common) => (common, None),
        Command::Restore(common) => (common, Some(RemoteAction::Restore)),
    };

    init_log(common.config.as_deref(), common.verbose);

    let mut config = match common.config {
        Some(ref path) => load_config(path),
        None => BackupConfig::default(),
    };
    apply_overrides(&mut config, common);

    match action {
        None => local_query(&config),
        Some(action) => remote::main(config, action),
    }
}

fn init_log(config_path: Option<&Path>, verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    let log_config_file = config_path
        .and_then(Path::parent)
        .map(|dir| dir.join("logging.toml"))
        .filter(|f| f.is_file());

    match log_config_file {
        // Running interactively; ignore logging configuration and just write
        // to stderr.
        Some(_) if Ok(true) == nix::unistd::isatty(2) => {
            crate::init_simple_log(level)
        }
        None => crate::init_simple_log(level),
        Some(file) => {
            if let Err(e) =
                log4rs::init_file(&file, log4rs::file::Deserializers::new())
            {
                die!(
                    EX_CONFIG,
                    "Failed to initialise logging from '{}': {}",
                    file.display(),
                    e
                );
            }
        }
    }
}

fn load_config(path: &Path) -> BackupConfig {
    let mut config_toml = Vec::new();
    if let Err(e) =
        fs::File::open(path).and_then(|mut f| f.read_to_end(&mut config_toml))
    {
        die!(EX_CONFIG, "Error reading '{}': {}", path.display(), e);
    }

    match toml::from_slice(&config_toml) {
        Ok(config) => config,
        Err(e) => die!(
            EX_CONFIG,
            "Error in config file at '{}': {}",
            path.display(),
            e
        ),
    }
}

fn apply_overrides(config: &mut BackupConfig, common: CommonOptions) {
    if let Some(host) = common.host {
        config.imap.host = host;
    }
    if let Some(port) = common.port {
        config.imap.port = port;
    }
    if let Some(user) = common.user {
        config.imap.user = user;
    }
    if !common.folders.is_empty() {
        config.folders = common
            .folders
            .into_iter()
            .map(|f| f.trim().to_owned())
            .filter(|f| !f.is_empty())
            .collect();
    }
    if let Some(root) = common.root {
        config.storage.root = Some(root);
    }
    if common.allow_insecure_tls_connections {
        config.imap.allow_insecure_tls_connections = true;
    }
}

fn local_query(config: &BackupConfig) {
    let root = config.storage_root();
    let folders = match commands::local_query(&root) {
        Ok(folders) => folders,
        Err(e) => die!(Sysexit::for_error(&e), "Error: {}", e),
    };

    let messages = folders.iter().map(|f| f.messages.len()).sum::<usize>();
    let size = folders.iter().map(|f| f.size).sum::<u64>();

    println!();
    println!(
        "{} ({} messages, {})",
        root.display(),
        messages,
        HumanSize(size)
    );
    for f in &folders {
        println!(
            "|- {} ({}, {}, average {})",
            f.name,
            f.messages.len(),
            HumanSize(f.size),
            HumanSize(f.average_size())
        );
    }
    println!();
}

/// Print the outcome of a query or restore plan.
pub(super) fn print_report(title: &str, report: &SyncReport) {
    println!();
    println!(
        "{} ({}/{} messages, {}/{})",
        title,
        report.pending_messages(),
        report.total_messages,
        HumanSize(report.pending_size()),
        HumanSize(report.total_size)
    );
    for f in &report.folders {
        println!("|- {} ({}, {})", f.name, f.messages.len(), HumanSize(f.size));
    }
    println!();
}
