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

//! The operations behind each command: query, backup, delete, local query
//! and restore.
//!
//! Everything here works folder by folder, in the order given. Nothing is
//! printed; each operation returns a report and leaves presentation to the
//! caller.

use std::collections::HashSet;
use std::path::Path;

use chrono::prelude::*;
use chrono::Months;
use log::{debug, info, warn};

use super::folder_meta::FolderMeta;
use super::remote::{FetchedMessage, RemoteMailbox};
use crate::mime::received::received_time;
use crate::store::{list_local_folder_names, LocalFolder};
use crate::support::error::Error;

/// How many downloaded messages may be waiting to be written out before the
/// download stalls.
const FETCH_BUFFER: usize = 16;

/// The outcome of comparing a set of folders between the two sides.
#[derive(Clone, Debug, Default)]
pub struct SyncReport {
    /// For each folder, the messages that still need to be transferred.
    pub folders: Vec<FolderMeta>,
    /// Number of messages in the source folders before filtering.
    pub total_messages: usize,
    /// Size of the source folders before filtering.
    pub total_size: u64,
}

impl SyncReport {
    pub fn pending_messages(&self) -> usize {
        self.folders.iter().map(|f| f.messages.len()).sum()
    }

    pub fn pending_size(&self) -> u64 {
        self.folders.iter().map(|f| f.size).sum()
    }

    fn add(&mut self, mut source: FolderMeta, exclude: &FolderMeta) {
        self.total_messages += source.messages.len();
        self.total_size += source.size;
        source.retain_absent_from(exclude);
        self.folders.push(source);
    }
}

/// What was actually moved by a backup or restore.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Transfer {
    pub messages: usize,
    pub bytes: u64,
}

impl Transfer {
    fn record(&mut self, bytes: usize) {
        self.messages += 1;
        self.bytes += bytes as u64;
    }
}

impl std::ops::AddAssign for Transfer {
    fn add_assign(&mut self, other: Self) {
        self.messages += other.messages;
        self.bytes += other.bytes;
    }
}

/// Return the elements of `names` which also occur in `only`, in the order
/// of `names`.
pub fn intersect(names: &[String], only: &[String]) -> Vec<String> {
    let only = only.iter().collect::<HashSet<_>>();
    names.iter().filter(|n| only.contains(n)).cloned().collect()
}

/// List the messages in the remote folder `name`.
pub fn snapshot_remote(
    remote: &mut dyn RemoteMailbox,
    name: &str,
) -> Result<FolderMeta, Error> {
    let status = remote.select_folder(name, true)?;
    let mut messages = if 0 == status.exists {
        Vec::new()
    } else {
        remote.fetch_metadata(status.exists)?
    };
    for meta in &mut messages {
        meta.uid_validity = status.uid_validity;
    }

    let folder = FolderMeta::with_messages(name, status.uid_validity, messages);

    debug!(
        "{}: {} messages on server, UID validity {}",
        name,
        folder.messages.len(),
        folder.uid_validity
    );
    Ok(folder)
}

/// Read the index of the local folder `name`.
///
/// A folder which has never been backed up is simply empty.
pub fn snapshot_local(root: &Path, name: &str) -> Result<FolderMeta, Error> {
    match LocalFolder::open_read_only(root, name) {
        Ok(mut folder) => {
            let snapshot = folder.read_all_index()?;
            if 0 != folder.discarded_index_tail() {
                warn!(
                    "{}: ignoring {} bytes of an incomplete index record \
                     left by an interrupted backup",
                    name,
                    folder.discarded_index_tail()
                );
            }
            Ok(snapshot)
        }
        Err(Error::NxLocalFolder(_)) => Ok(FolderMeta::new(name, 0)),
        Err(e) => Err(e),
    }
}

/// Find out which messages in the given remote folders are not yet in the
/// local store under `root`.
pub fn query(
    remote: &mut dyn RemoteMailbox,
    root: &Path,
    folders: &[String],
) -> Result<SyncReport, Error> {
    let mut report = SyncReport::default();
    for name in folders {
        let remote_folder = snapshot_remote(remote, name)?;
        let local_folder = snapshot_local(root, name)?;
        report.add(remote_folder, &local_folder);
    }

    Ok(report)
}

/// Download everything `report` lists as missing into the local store.
pub fn download(
    remote: &mut dyn RemoteMailbox,
    root: &Path,
    report: &SyncReport,
) -> Result<Transfer, Error> {
    let mut transfer = Transfer::default();
    for folder in &report.folders {
        if folder.is_empty() {
            continue;
        }

        info!(
            "Downloading {} messages from {}",
            folder.messages.len(),
            folder.name
        );
        transfer += download_folder(remote, root, folder)?;
    }

    Ok(transfer)
}

/// Query, then download whatever is missing.
///
/// `on_plan` is shown the query result before anything is downloaded.
pub fn backup(
    remote: &mut dyn RemoteMailbox,
    root: &Path,
    folders: &[String],
    on_plan: impl FnOnce(&SyncReport),
) -> Result<(SyncReport, Transfer), Error> {
    let report = query(remote, root, folders)?;
    on_plan(&report);
    let transfer = download(remote, root, &report)?;
    Ok((report, transfer))
}

fn download_folder(
    remote: &mut dyn RemoteMailbox,
    root: &Path,
    folder: &FolderMeta,
) -> Result<Transfer, Error> {
    let status = remote.select_folder(&folder.name, true)?;
    if status.uid_validity != folder.uid_validity {
        // Sequence numbers and UIDs from the snapshot no longer mean anything
        return Err(Error::UidValidityChanged {
            folder: folder.name.clone(),
            expected: folder.uid_validity,
            actual: status.uid_validity,
        });
    }

    let seqnums = folder
        .messages
        .iter()
        .filter_map(|m| m.seqnum)
        .collect::<Vec<_>>();
    let requested = seqnums.len();
    let mut local = LocalFolder::open_append(root, &folder.name)?;
    if 0 != local.discarded_index_tail() {
        warn!(
            "{}: removed {} bytes of an incomplete index record",
            folder.name,
            local.discarded_index_tail()
        );
    }

    let (sender, receiver) =
        crossbeam::channel::bounded::<FetchedMessage>(FETCH_BUFFER);
    let (consumed, produced) = crossbeam::scope(|s| {
        let producer = s.spawn(move |_| {
            remote.fetch_bodies(&seqnums, &mut |message| {
                // The only way this fails is the consumer having given up,
                // in which case its error is the one that matters.
                sender.send(message).map_err(|_| {
                    Error::Protocol("Download abandoned".to_owned())
                })
            })
        });

        let consumed = store_fetched(&mut local, status.uid_validity, receiver);
        let produced = producer
            .join()
            .unwrap_or_else(|e| std::panic::resume_unwind(e));
        (consumed, produced)
    })
    .unwrap_or_else(|e| std::panic::resume_unwind(e));

    let closed = local.close();
    let transfer = consumed?;
    produced?;
    closed?;

    if transfer.messages < requested {
        warn!(
            "{}: server returned only {} of {} requested messages",
            folder.name, transfer.messages, requested
        );
    }

    Ok(transfer)
}

fn store_fetched(
    local: &mut LocalFolder,
    uid_validity: u32,
    received: crossbeam::channel::Receiver<FetchedMessage>,
) -> Result<Transfer, Error> {
    let mut transfer = Transfer::default();
    for message in received {
        let when = message
            .date
            .or_else(|| received_time(&message.body).ok())
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        local.append(
            uid_validity,
            message.uid,
            &message.from,
            when,
            &message.body,
        )?;
        transfer.record(message.body.len());
        if message.body.len() != message.size as usize {
            debug!(
                "{}: UID {} is {} bytes, but the server announced {}",
                local.name(),
                message.uid,
                message.body.len(),
                message.size
            );
        }
        debug!(
            "{}: stored #{} as UID {} ({} bytes)",
            local.name(),
            message.seqnum,
            message.uid,
            message.body.len()
        );
    }

    Ok(transfer)
}

/// The date `months` months before `today`.
///
/// Days past the end of the target month are clamped to its last day.
pub fn months_before(today: NaiveDate, months: u32) -> NaiveDate {
    today
        .checked_sub_months(Months::new(months))
        .unwrap_or(NaiveDate::MIN)
}

/// Delete messages with an internal date before `before` from each of the
/// given remote folders.
///
/// Returns the number of messages deleted from each folder.
pub fn delete_before(
    remote: &mut dyn RemoteMailbox,
    folders: &[String],
    before: NaiveDate,
) -> Result<Vec<(String, usize)>, Error> {
    let mut deleted = Vec::new();
    for name in folders {
        let status = remote.select_folder(name, false)?;
        let seqnums = if 0 == status.exists {
            Vec::new()
        } else {
            remote.search_before(before)?
        };

        if !seqnums.is_empty() {
            info!("Deleting {} messages from {}", seqnums.len(), name);
            remote.flag_and_expunge(&seqnums)?;
        }

        deleted.push((name.clone(), seqnums.len()));
    }

    Ok(deleted)
}

/// Read the index of every folder in the local store.
pub fn local_query(root: &Path) -> Result<Vec<FolderMeta>, Error> {
    list_local_folder_names(root)?
        .iter()
        .map(|name| LocalFolder::open_read_only(root, name)?.read_all_index())
        .collect()
}

/// Find out which messages in the given local folders are not on the server,
/// creating any folder the server does not have.
pub fn plan_restore(
    remote: &mut dyn RemoteMailbox,
    root: &Path,
    folders: &[String],
) -> Result<SyncReport, Error> {
    let mut report = SyncReport::default();
    for name in folders {
        let local_folder =
            LocalFolder::open_read_only(root, name)?.read_all_index()?;

        let remote_folder = match snapshot_remote(remote, name) {
            Ok(folder) => folder,
            Err(Error::NxRemoteFolder(_)) => {
                info!("Creating folder {} on server", name);
                remote.create_folder(name)?;
                snapshot_remote(remote, name)?
            }
            Err(e) => return Err(e),
        };

        report.add(local_folder, &remote_folder);
    }

    Ok(report)
}

/// Upload everything `report` lists as missing to the server.
pub fn upload(
    remote: &mut dyn RemoteMailbox,
    root: &Path,
    report: &SyncReport,
) -> Result<Transfer, Error> {
    let mut transfer = Transfer::default();
    let mut buf = Vec::new();
    for folder in &report.folders {
        if folder.is_empty() {
            continue;
        }

        info!(
            "Uploading {} messages to {}",
            folder.messages.len(),
            folder.name
        );
        let mut local = LocalFolder::open_read_only(root, &folder.name)?;
        for meta in &folder.messages {
            local.read_message(meta, &mut buf)?;
            let date = received_time(&buf).unwrap_or_else(|e| {
                warn!(
                    "{}: UID validity {} UID {}: {}; using current time",
                    folder.name, meta.uid_validity, meta.uid, e
                );
                Utc::now().into()
            });

            remote.append_message(&folder.name, date, &buf)?;
            transfer.record(buf.len());
        }
        local.close()?;
    }

    Ok(transfer)
}

/// Compare the given local folders against the server, then upload whatever
/// is missing.
///
/// `on_plan` is shown the comparison before anything is uploaded.
pub fn restore(
    remote: &mut dyn RemoteMailbox,
    root: &Path,
    folders: &[String],
    on_plan: impl FnOnce(&SyncReport),
) -> Result<(SyncReport, Transfer), Error> {
    let report = plan_restore(remote, root, folders)?;
    on_plan(&report);
    let transfer = upload(remote, root, &report)?;
    Ok((report, transfer))
}
