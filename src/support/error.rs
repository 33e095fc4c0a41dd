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

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("No local folder named '{0}'")]
    NxLocalFolder(String),
    #[error("{}:{line}: {detail}", .path.display())]
    CorruptIndex {
        path: PathBuf,
        line: usize,
        detail: String,
    },
    #[error("Unsafe folder name")]
    UnsafeName,
    #[error("Local folder is open read-only")]
    FolderReadOnly,
    #[error("Local folder is open for appending only")]
    FolderWriteOnly,
    #[error("No remote folder named '{0}'")]
    NxRemoteFolder(String),
    #[error(
        "UID validity of '{folder}' changed from {expected} to {actual} \
         during the session"
    )]
    UidValidityChanged {
        folder: String,
        expected: u32,
        actual: u32,
    },
    #[error("Server did not return a body for message {seqnum}")]
    MissingBody { seqnum: u32 },
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Imap(#[from] imap::error::Error),
    #[error(transparent)]
    Ssl(#[from] openssl::error::ErrorStack),
    #[error(transparent)]
    Ssl2(#[from] openssl::ssl::Error),
}

impl Error {
    /// Whether this error comes from the state of the local store or from
    /// how it was used, as opposed to a failure which may go away if the
    /// operation is tried again.
    pub fn is_local_fault(&self) -> bool {
        matches!(
            *self,
            Error::NxLocalFolder(_)
                | Error::CorruptIndex { .. }
                | Error::UnsafeName
                | Error::FolderReadOnly
                | Error::FolderWriteOnly
        )
    }
}
