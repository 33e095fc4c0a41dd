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

use std::convert::TryFrom;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::prelude::*;

use super::index::{IndexReader, IndexWriter};
use super::mbox::{MboxReader, MboxWriter};
use super::message_meta::MessageMeta;
use crate::support::error::Error;
use crate::support::file_ops::{self, ErrorTransforms, IgnoreKinds};
use crate::support::safe_name::{decode_folder_name, encode_folder_name};
use crate::sync::FolderMeta;

const MBOX_SUFFIX: &str = ".mbox";
const INDEX_SUFFIX: &str = ".idx";

/// A handle on one folder in the local store.
///
/// A handle is either read-only or append-only for its whole life, depending
/// on how it was opened. Only one handle should be appending to a folder at
/// any time; nothing here enforces that.
pub struct LocalFolder {
    name: String,
    access: Access,
    index_tail: u64,
}

impl fmt::Debug for LocalFolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.access {
            Access::Read { .. } => "read",
            Access::Append { .. } => "append",
        };
        write!(f, "LocalFolder({:?}, {})", self.name, mode)
    }
}

enum Access {
    Read {
        mbox: MboxReader,
        index_path: PathBuf,
        /// The index opened along with the archive, until the first scan
        /// consumes it.
        index: Option<IndexReader>,
    },
    Append {
        mbox: MboxWriter,
        index: IndexWriter,
    },
}

impl LocalFolder {
    /// Open the folder `name` under `root` for reading.
    ///
    /// Fails with `Error::NxLocalFolder` if either file of the folder does
    /// not exist, which usually just means it has never been backed up.
    pub fn open_read_only(
        root: impl AsRef<Path>,
        name: &str,
    ) -> Result<Self, Error> {
        let (mbox_path, index_path) = folder_paths(root.as_ref(), name)?;
        let nx = || Error::NxLocalFolder(name.to_owned());

        let mbox = MboxReader::open(&mbox_path).on_not_found(nx())?;
        let index = IndexReader::open(&index_path).on_not_found(nx())?;

        Ok(LocalFolder {
            name: name.to_owned(),
            access: Access::Read {
                mbox,
                index_path,
                index: Some(index),
            },
            index_tail: 0,
        })
    }

    /// Open the folder `name` under `root` for appending, creating `root` and
    /// the folder's files as needed.
    pub fn open_append(
        root: impl AsRef<Path>,
        name: &str,
    ) -> Result<Self, Error> {
        let root = root.as_ref();
        let (mbox_path, index_path) = folder_paths(root, name)?;
        file_ops::ensure_dir(root, 0o700)?;

        let mbox = MboxWriter::open(&mbox_path)?;
        let index = IndexWriter::open(&index_path)?;

        Ok(LocalFolder {
            name: name.to_owned(),
            index_tail: index.discarded(),
            access: Access::Append { mbox, index },
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The length of an incomplete final index record, left by an append
    /// that was cut short.
    ///
    /// For an append handle, this is what `open_append()` removed from the
    /// index. For a read handle, it is what the last `read_all_index()`
    /// stopped at. Such a record never counts as part of the folder, so the
    /// message it belonged to is simply fetched again.
    pub fn discarded_index_tail(&self) -> u64 {
        self.index_tail
    }

    /// Iterate over the records in the folder's index, in the order they were
    /// appended.
    ///
    /// The first call uses the index opened by `open_read_only()`; later calls
    /// reopen the file and start over.
    pub fn scan(
        &mut self,
    ) -> Result<impl Iterator<Item = Result<MessageMeta, Error>>, Error> {
        self.index_reader()
    }

    fn index_reader(&mut self) -> Result<IndexReader, Error> {
        match self.access {
            Access::Read {
                ref index_path,
                ref mut index,
                ..
            } => match index.take() {
                Some(index) => Ok(index),
                None => Ok(IndexReader::open(index_path)
                    .on_not_found(Error::NxLocalFolder(self.name.clone()))?),
            },
            Access::Append { .. } => Err(Error::FolderWriteOnly),
        }
    }

    /// Read the whole index into a `FolderMeta`.
    ///
    /// The UID validity of the result is that of the last record, or 0 if the
    /// folder is empty. Records whose key was already seen earlier in the
    /// index are skipped, so the result never holds two records for the same
    /// message.
    pub fn read_all_index(&mut self) -> Result<FolderMeta, Error> {
        let mut index = self.index_reader()?;
        let (records, last_validity) = index.load_all()?;
        self.index_tail = index.torn_tail() as u64;

        let mut messages = records.into_values().collect::<Vec<_>>();
        // Offsets grow with every append, so this restores index order
        messages.sort_by_key(|m| m.offset);

        Ok(FolderMeta::with_messages(
            self.name.clone(),
            last_validity.unwrap_or(0),
            messages,
        ))
    }

    /// Append one message to the folder.
    ///
    /// The body goes into the archive first, then the index record pointing
    /// at it. If the process dies in between, the archive is left with a
    /// message no index record refers to, which is harmless: it is never
    /// seen again and will simply be downloaded anew.
    pub fn append(
        &mut self,
        uid_validity: u32,
        uid: u32,
        from: &str,
        when: DateTime<Utc>,
        body: &[u8],
    ) -> Result<MessageMeta, Error> {
        match self.access {
            Access::Append {
                ref mut mbox,
                ref mut index,
            } => {
                let size = u32::try_from(body.len()).map_err(|_| {
                    Error::Protocol(format!(
                        "UID {} is too large to archive ({} bytes)",
                        uid,
                        body.len()
                    ))
                })?;
                let offset = mbox.append(from, when, body)?;
                index.append(uid_validity, uid, size, offset)?;
                Ok(MessageMeta {
                    seqnum: None,
                    uid_validity,
                    uid,
                    size,
                    offset: Some(offset),
                })
            }
            Access::Read { .. } => Err(Error::FolderReadOnly),
        }
    }

    /// Read the raw message described by `meta` into `dst`, replacing its
    /// previous content.
    pub fn read_message(
        &mut self,
        meta: &MessageMeta,
        dst: &mut Vec<u8>,
    ) -> Result<(), Error> {
        match self.access {
            Access::Read { ref mut mbox, .. } => {
                let offset = meta.offset.ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("UID {} is not stored locally", meta.uid),
                    )
                })?;
                mbox.read_at(offset, meta.size, dst)?;
                Ok(())
            }
            Access::Append { .. } => Err(Error::FolderWriteOnly),
        }
    }

    /// Close the folder, flushing anything written to disk.
    pub fn close(self) -> Result<(), Error> {
        match self.access {
            Access::Read { .. } => Ok(()),
            Access::Append { mbox, index } => {
                mbox.close()?;
                index.close()?;
                Ok(())
            }
        }
    }
}

/// List the names of all folders under `root`, sorted by name.
///
/// A folder is recognised by its index file. A nonexistent `root` just has no
/// folders.
pub fn list_local_folder_names(
    root: impl AsRef<Path>,
) -> Result<Vec<String>, Error> {
    let entries = fs::read_dir(root.as_ref())
        .map(Some)
        .ignore_not_found()?;

    let mut names = Vec::new();
    for entry in entries.into_iter().flatten() {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }

        let file_name = entry.file_name();
        let name = file_name
            .to_str()
            .and_then(|n| n.strip_suffix(INDEX_SUFFIX))
            .and_then(decode_folder_name);
        if let Some(name) = name {
            names.push(name);
        }
    }

    names.sort();
    Ok(names)
}

fn folder_paths(root: &Path, name: &str) -> Result<(PathBuf, PathBuf), Error> {
    let stem = encode_folder_name(name)?;
    Ok((
        root.join(format!("{}{}", stem, MBOX_SUFFIX)),
        root.join(format!("{}{}", stem, INDEX_SUFFIX)),
    ))
}
