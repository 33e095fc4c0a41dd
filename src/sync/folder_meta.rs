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

use std::collections::HashSet;

use crate::store::MessageMeta;

/// A point-in-time description of one folder, either as listed by the server
/// or as recorded in the local index.
///
/// `size` is always the sum of the sizes of `messages`. Code outside this
/// module should go through `push()` and `retain_absent_from()` rather than
/// modifying `messages` directly so that this holds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FolderMeta {
    pub name: String,
    pub uid_validity: u32,
    pub messages: Vec<MessageMeta>,
    pub size: u64,
}

impl FolderMeta {
    /// Create an empty snapshot.
    pub fn new(name: impl Into<String>, uid_validity: u32) -> Self {
        FolderMeta {
            name: name.into(),
            uid_validity,
            messages: Vec::new(),
            size: 0,
        }
    }

    /// Create a snapshot holding `messages`, in the given order.
    pub fn with_messages(
        name: impl Into<String>,
        uid_validity: u32,
        messages: Vec<MessageMeta>,
    ) -> Self {
        let size = total_size(&messages);
        FolderMeta {
            name: name.into(),
            uid_validity,
            messages,
            size,
        }
    }

    pub fn push(&mut self, meta: MessageMeta) {
        self.size += u64::from(meta.size);
        self.messages.push(meta);
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The set of message keys in this snapshot.
    pub fn keys(&self) -> HashSet<u64> {
        self.messages.iter().map(MessageMeta::key).collect()
    }

    /// Return the messages of this snapshot whose key does not occur in
    /// `exclude`, in their original order, along with their total size.
    ///
    /// Only the key takes part in the comparison; sequence numbers, sizes
    /// and offsets are ignored.
    ///
    /// Backing up uses `remote.filter_out(&local)` to find what to download;
    /// restoring uses `local.filter_out(&remote)` to find what to upload.
    pub fn filter_out(&self, exclude: &FolderMeta) -> (Vec<MessageMeta>, u64) {
        if exclude.is_empty() {
            return (self.messages.clone(), self.size);
        }

        let excluded = exclude.keys();
        let messages = self
            .messages
            .iter()
            .filter(|m| !excluded.contains(&m.key()))
            .copied()
            .collect::<Vec<_>>();
        let size = total_size(&messages);
        (messages, size)
    }

    /// Like `filter_out()`, but replaces the content of `self` with the
    /// result.
    pub fn retain_absent_from(&mut self, exclude: &FolderMeta) {
        let (messages, size) = self.filter_out(exclude);
        self.messages = messages;
        self.size = size;
    }

    /// The mean message size in bytes, or 0 if there are no messages.
    pub fn average_size(&self) -> u64 {
        if self.messages.is_empty() {
            0
        } else {
            self.size / self.messages.len() as u64
        }
    }
}

fn total_size(messages: &[MessageMeta]) -> u64 {
    messages.iter().map(|m| u64::from(m.size)).sum()
}
