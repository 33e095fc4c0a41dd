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

//! Process exit codes following the `sysexits.h` conventions.
//!
//! Only the command-line layer terminates the process; everything below it
//! reports failures through `Error`.

use crate::support::error::Error;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Sysexit(pub i32);

pub const EX_USAGE: Sysexit = Sysexit(64);
pub const EX_DATAERR: Sysexit = Sysexit(65);
pub const EX_NOINPUT: Sysexit = Sysexit(66);
pub const EX_UNAVAILABLE: Sysexit = Sysexit(69);
pub const EX_SOFTWARE: Sysexit = Sysexit(70);
pub const EX_IOERR: Sysexit = Sysexit(74);
pub const EX_TEMPFAIL: Sysexit = Sysexit(75);
pub const EX_PROTOCOL: Sysexit = Sysexit(76);
pub const EX_CONFIG: Sysexit = Sysexit(78);

impl Sysexit {
    pub fn exit(self) -> ! {
        std::process::exit(self.0)
    }

    /// Choose the exit code that best describes `error`.
    pub fn for_error(error: &Error) -> Self {
        match *error {
            Error::CorruptIndex { .. } => EX_DATAERR,
            Error::NxLocalFolder(_) => EX_NOINPUT,
            Error::NxRemoteFolder(_) => EX_UNAVAILABLE,
            Error::UidValidityChanged { .. } => EX_TEMPFAIL,
            Error::MissingBody { .. }
            | Error::Protocol(_)
            | Error::Imap(_)
            | Error::Ssl(_)
            | Error::Ssl2(_) => EX_PROTOCOL,
            Error::Io(_) => EX_IOERR,
            Error::UnsafeName
            | Error::FolderReadOnly
            | Error::FolderWriteOnly => EX_SOFTWARE,
        }
    }
}

/// Print a message to standard error and exit with the given `Sysexit`.
macro_rules! die {
    ($ex:expr, $($fmt:tt)*) => {{
        eprintln!($($fmt)*);
        $ex.exit()
    }}
}
