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

//! The local folder store.
//!
//! Each folder is kept as two append-only files side by side in the storage
//! root:
//!
//! - `<stem>.mbox`, the archive: every message body, each preceded by a
//!   `From ` delimiter line and followed by a blank line.
//!
//! - `<stem>.idx`, the index: one line per message recording its identity,
//!   its size and the offset of its body within the archive.
//!
//! The archive is never parsed to find message boundaries, since bodies can
//! legitimately contain lines which look like delimiters; only the offsets in
//! the index are used to find anything. Nothing in either file is ever
//! rewritten or removed.
//!
//! `<stem>` is the folder name as encoded by
//! `support::safe_name::encode_folder_name`.

pub mod index;
pub mod local_folder;
pub mod mbox;
pub mod message_meta;

pub use self::local_folder::{list_local_folder_names, LocalFolder};
pub use self::message_meta::MessageMeta;
