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

//! An in-memory `RemoteMailbox` for tests.

use std::collections::BTreeMap;

use chrono::prelude::*;

use super::remote::{FetchedMessage, RemoteFolderStatus, RemoteMailbox};
use crate::store::MessageMeta;
use crate::support::error::Error;

#[derive(Clone, Debug)]
pub struct FakeMessage {
    pub uid: u32,
    pub from: String,
    pub date: Option<DateTime<FixedOffset>>,
    pub internal_date: DateTime<FixedOffset>,
    pub body: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct FakeFolder {
    pub uid_validity: u32,
    pub next_uid: u32,
    pub messages: Vec<FakeMessage>,
}

#[derive(Default)]
pub struct FakeRemote {
    pub folders: BTreeMap<String, FakeFolder>,
    selected: Option<(String, bool)>,
    next_validity: u32,
    /// If set, `fetch_bodies` fails after delivering this many messages.
    pub fail_fetch_after: Option<usize>,
    /// Total number of bodies delivered by `fetch_bodies`.
    pub bodies_fetched: usize,
    pub logged_out: bool,
}

pub fn date(y: i32, m: u32, d: u32) -> DateTime<FixedOffset> {
    Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap().into()
}

impl FakeRemote {
    pub fn new() -> Self {
        FakeRemote {
            next_validity: 100,
            ..FakeRemote::default()
        }
    }

    pub fn add_folder(&mut self, name: &str, uid_validity: u32) {
        self.folders.insert(
            name.to_owned(),
            FakeFolder {
                uid_validity,
                next_uid: 1,
                messages: Vec::new(),
            },
        );
    }

    /// Add a message with the given body to `folder`, returning its UID.
    pub fn add_message(
        &mut self,
        folder: &str,
        internal_date: DateTime<FixedOffset>,
        body: &[u8],
    ) -> u32 {
        let folder = self.folders.get_mut(folder).unwrap();
        let uid = folder.next_uid;
        folder.next_uid += 1;
        folder.messages.push(FakeMessage {
            uid,
            from: format!("sender{}@example.com", uid),
            date: Some(internal_date),
            internal_date,
            body: body.to_vec(),
        });
        uid
    }

    pub fn folder(&self, name: &str) -> &FakeFolder {
        &self.folders[name]
    }

    fn selected(&mut self) -> Result<(&mut FakeFolder, bool), Error> {
        let (name, read_only) = self
            .selected
            .clone()
            .ok_or_else(|| Error::Protocol("No folder selected".to_owned()))?;
        let folder = self.folders.get_mut(&name).ok_or_else(|| {
            Error::Protocol("Selected folder vanished".to_owned())
        })?;
        Ok((folder, read_only))
    }
}

impl RemoteMailbox for FakeRemote {
    fn list_folders(&mut self) -> Result<Vec<String>, Error> {
        Ok(self.folders.keys().cloned().collect())
    }

    fn select_folder(
        &mut self,
        name: &str,
        read_only: bool,
    ) -> Result<RemoteFolderStatus, Error> {
        let folder = self
            .folders
            .get(name)
            .ok_or_else(|| Error::NxRemoteFolder(name.to_owned()))?;
        let status = RemoteFolderStatus {
            exists: folder.messages.len() as u32,
            uid_validity: folder.uid_validity,
        };
        self.selected = Some((name.to_owned(), read_only));
        Ok(status)
    }

    fn fetch_metadata(
        &mut self,
        count: u32,
    ) -> Result<Vec<MessageMeta>, Error> {
        let (folder, _) = self.selected()?;
        Ok(folder
            .messages
            .iter()
            .take(count as usize)
            .enumerate()
            .map(|(ix, m)| MessageMeta {
                seqnum: Some(ix as u32 + 1),
                uid_validity: 0,
                uid: m.uid,
                size: m.body.len() as u32,
                offset: None,
            })
            .collect())
    }

    fn fetch_bodies(
        &mut self,
        seqnums: &[u32],
        sink: &mut dyn FnMut(FetchedMessage) -> Result<(), Error>,
    ) -> Result<(), Error> {
        let fail_after = self.fail_fetch_after;
        let (folder, _) = self.selected()?;
        let mut fetched = Vec::new();
        for &seqnum in seqnums {
            let m = folder.messages.get(seqnum as usize - 1).ok_or_else(|| {
                Error::Protocol(format!("No message {}", seqnum))
            })?;
            fetched.push(FetchedMessage {
                seqnum,
                uid: m.uid,
                size: m.body.len() as u32,
                from: m.from.clone(),
                date: m.date,
                body: m.body.clone(),
            });
        }

        for (ix, message) in fetched.into_iter().enumerate() {
            if Some(ix) == fail_after {
                return Err(Error::Protocol("Connection reset".to_owned()));
            }
            sink(message)?;
            self.bodies_fetched += 1;
        }

        Ok(())
    }

    fn append_message(
        &mut self,
        folder: &str,
        date: DateTime<FixedOffset>,
        body: &[u8],
    ) -> Result<(), Error> {
        if !self.folders.contains_key(folder) {
            return Err(Error::NxRemoteFolder(folder.to_owned()));
        }
        self.add_message(folder, date, body);
        Ok(())
    }

    fn search_before(&mut self, date: NaiveDate) -> Result<Vec<u32>, Error> {
        let (folder, _) = self.selected()?;
        Ok(folder
            .messages
            .iter()
            .enumerate()
            .filter(|(_, m)| m.internal_date.date_naive() < date)
            .map(|(ix, _)| ix as u32 + 1)
            .collect())
    }

    fn flag_and_expunge(&mut self, seqnums: &[u32]) -> Result<(), Error> {
        let (folder, read_only) = self.selected()?;
        if read_only {
            return Err(Error::Protocol("Folder is read-only".to_owned()));
        }

        let mut seqnum = 0;
        folder.messages.retain(|_| {
            seqnum += 1;
            !seqnums.contains(&seqnum)
        });
        Ok(())
    }

    fn create_folder(&mut self, name: &str) -> Result<(), Error> {
        if self.folders.contains_key(name) {
            return Err(Error::Protocol(format!("{} already exists", name)));
        }
        let uid_validity = self.next_validity;
        self.next_validity += 1;
        self.add_folder(name, uid_validity);
        Ok(())
    }

    fn logout(&mut self) -> Result<(), Error> {
        self.logged_out = true;
        Ok(())
    }
}
