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

use chrono::prelude::*;

use crate::store::MessageMeta;
use crate::support::error::Error;

/// The state of a folder right after selecting it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RemoteFolderStatus {
    /// The number of messages in the folder, which is also the highest
    /// sequence number.
    pub exists: u32,
    pub uid_validity: u32,
}

/// One message as downloaded from the server.
#[derive(Clone, Debug)]
pub struct FetchedMessage {
    pub seqnum: u32,
    pub uid: u32,
    /// The size the server reported, which is not necessarily `body.len()`.
    pub size: u32,
    /// The address of the first sender in the envelope, or empty if there is
    /// none.
    pub from: String,
    /// The envelope date, if present and parseable.
    pub date: Option<DateTime<FixedOffset>>,
    pub body: Vec<u8>,
}

/// The operations on a mail server that backing up, restoring and pruning
/// need.
///
/// Sequence numbers passed into and returned from these methods refer to the
/// folder most recently selected with `select_folder()`.
pub trait RemoteMailbox: Send {
    /// List the names of all folders, sorted.
    fn list_folders(&mut self) -> Result<Vec<String>, Error>;

    /// Select `name` for subsequent operations.
    ///
    /// Fails with `Error::NxRemoteFolder` if there is no such folder.
    fn select_folder(
        &mut self,
        name: &str,
        read_only: bool,
    ) -> Result<RemoteFolderStatus, Error>;

    /// Fetch the UID and size of messages `1..=count` in the selected folder.
    ///
    /// The returned records carry their sequence number, no offset, and a
    /// UID validity of 0, which the caller must fill in.
    fn fetch_metadata(&mut self, count: u32) -> Result<Vec<MessageMeta>, Error>;

    /// Download the given messages from the selected folder, passing each to
    /// `sink` as it arrives.
    ///
    /// Messages are delivered in the order the server sends them. An error
    /// from `sink` aborts the download and is returned as is.
    fn fetch_bodies(
        &mut self,
        seqnums: &[u32],
        sink: &mut dyn FnMut(FetchedMessage) -> Result<(), Error>,
    ) -> Result<(), Error>;

    /// Add a message to `folder` with the given internal date.
    fn append_message(
        &mut self,
        folder: &str,
        date: DateTime<FixedOffset>,
        body: &[u8],
    ) -> Result<(), Error>;

    /// Return the sequence numbers of messages in the selected folder whose
    /// internal date is before `date`.
    fn search_before(&mut self, date: NaiveDate) -> Result<Vec<u32>, Error>;

    /// Mark the given messages deleted and expunge the selected folder.
    fn flag_and_expunge(&mut self, seqnums: &[u32]) -> Result<(), Error>;

    fn create_folder(&mut self, name: &str) -> Result<(), Error>;

    /// End the session.
    fn logout(&mut self) -> Result<(), Error>;
}
