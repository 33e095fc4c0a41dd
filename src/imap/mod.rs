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

//! Talking to a real IMAP server.

pub mod session;

pub use self::session::ImapSession;
