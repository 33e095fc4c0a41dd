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

use std::io::{self, BufRead, Write};

use chrono::prelude::*;
use log::warn;

use super::main::{print_report, RemoteAction};
use crate::imap::ImapSession;
use crate::store::list_local_folder_names;
use crate::support::config::BackupConfig;
use crate::support::error::Error;
use crate::support::human_size::HumanSize;
use crate::support::retry::with_retry;
use crate::support::sysexits::*;
use crate::sync::commands::{self, Transfer};
use crate::sync::RemoteMailbox;

pub(super) fn main(config: BackupConfig, action: RemoteAction) {
    if config.imap.host.is_empty() {
        die!(EX_USAGE, "No server given; use --host or set imap.host");
    }
    if config.imap.user.is_empty() {
        die!(EX_USAGE, "No user given; use --user or set imap.user");
    }

    if let RemoteAction::Delete { months, force } = action {
        if !confirm_delete(months, force) {
            println!("User did not confirm, aborting.");
            return;
        }
    }

    let password = match config.imap.password {
        Some(ref password) => password.clone(),
        None => match rpassword::read_password_from_tty(Some("Password: ")) {
            Ok(p) => p,
            Err(e) => die!(EX_NOINPUT, "Failed to read password: {}", e),
        },
    };

    let result = with_retry(config.retry.attempts, config.retry.delay(), || {
        run_session(&config, &password, &action)
    });

    if let Err(e) = result {
        die!(Sysexit::for_error(&e), "Error: {}", e);
    }

    println!("Done, exiting.");
}

fn confirm_delete(months: u32, force: bool) -> bool {
    let today = Utc::now().date_naive();
    let before = commands::months_before(today, months);
    println!(
        "Today is {}, deleting messages {} months or older, so before {}.",
        today.format("%Y-%m-%d"),
        months,
        before.format("%Y-%m-%d")
    );

    if force {
        return true;
    }

    print!("Are you sure [y/n]: ");
    let _ = io::stdout().flush();
    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }

    matches!(answer.trim(), "y" | "Y")
}

fn run_session(
    config: &BackupConfig,
    password: &str,
    action: &RemoteAction,
) -> Result<(), Error> {
    let mut session = ImapSession::connect(&config.imap, password)?;
    let result = run_action(&mut session, config, action);

    if let Err(e) = session.logout() {
        warn!("Logout failed: {}", e);
    }
    result
}

fn run_action(
    remote: &mut dyn RemoteMailbox,
    config: &BackupConfig,
    action: &RemoteAction,
) -> Result<(), Error> {
    let root = config.storage_root();
    let title = format!("{}/{}", config.imap.host, config.imap.user);

    match *action {
        RemoteAction::Query => {
            let folders = remote_folders(remote, config)?;
            let report = commands::query(remote, &root, &folders)?;
            print_report(&title, &report);
        }

        RemoteAction::Backup => {
            let folders = remote_folders(remote, config)?;
            let (_, transfer) =
                commands::backup(remote, &root, &folders, |report| {
                    print_report(&title, report)
                })?;
            print_transfer("Downloaded", transfer);
        }

        RemoteAction::Delete { months, .. } => {
            let folders = remote_folders(remote, config)?;
            let before =
                commands::months_before(Utc::now().date_naive(), months);
            let deleted = commands::delete_before(remote, &folders, before)?;
            for (name, count) in &deleted {
                println!("|- {} ({} deleted)", name, count);
            }
            println!(
                "Total {} messages deleted",
                deleted.iter().map(|&(_, n)| n).sum::<usize>()
            );
        }

        RemoteAction::Restore => {
            let mut folders = list_local_folder_names(&root)?;
            if !config.folders.is_empty() {
                folders = commands::intersect(&folders, &config.folders);
            }

            let title = root.display().to_string();
            let (_, transfer) =
                commands::restore(remote, &root, &folders, |report| {
                    print_report(&title, report)
                })?;
            print_transfer("Uploaded", transfer);
        }
    }

    Ok(())
}

/// The remote folders the command applies to, in server order.
fn remote_folders(
    remote: &mut dyn RemoteMailbox,
    config: &BackupConfig,
) -> Result<Vec<String>, Error> {
    let folders = remote.list_folders()?;
    if config.folders.is_empty() {
        Ok(folders)
    } else {
        Ok(commands::intersect(&folders, &config.folders))
    }
}

fn print_transfer(what: &str, transfer: Transfer) {
    if 0 == transfer.messages {
        return;
    }

    println!(
        "{} {} messages, {}",
        what,
        transfer.messages,
        HumanSize(transfer.bytes)
    );
}
