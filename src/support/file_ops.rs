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

//! Miscellaneous functions for working with files.

use std::fs;
use std::io::{self, Read};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::Path;

use crate::support::error::Error;

/// Open `path` for appending, creating it with `mode` if it does not exist.
pub fn open_append(path: impl AsRef<Path>, mode: u32) -> io::Result<fs::File> {
    fs::OpenOptions::new()
        .append(true)
        .create(true)
        .mode(mode)
        .open(path)
}

/// Create `path` and any missing parents, using `mode` for new directories.
pub fn ensure_dir(path: impl AsRef<Path>, mode: u32) -> io::Result<()> {
    fs::DirBuilder::new()
        .recursive(true)
        .mode(mode)
        .create(path)
}

pub trait ReadUninterruptibly: Read {
    fn read_uninteruptibly(&mut self, dst: &mut [u8]) -> io::Result<usize>;
}

impl<R: Read> ReadUninterruptibly for R {
    /// Read bytes into `dst` until `dst` is full or EOF is reached.
    ///
    /// `Interrupted` errors are ignored and retried. Other errors are
    /// propagated.
    fn read_uninteruptibly(&mut self, mut dst: &mut [u8]) -> io::Result<usize> {
        let mut total = 0;
        while 0 != dst.len() {
            match self.read(dst) {
                Ok(0) => break,
                Ok(n) => {
                    total += n;
                    dst = &mut dst[n..];
                }
                Err(e) if io::ErrorKind::Interrupted == e.kind() => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(total)
    }
}

pub trait IgnoreKinds {
    fn ignore_not_found(self) -> Self;
}

impl<R: Default> IgnoreKinds for Result<R, io::Error> {
    fn ignore_not_found(self) -> Self {
        match self {
            Ok(r) => Ok(r),
            Err(e) if io::ErrorKind::NotFound == e.kind() => Ok(R::default()),
            Err(e) => Err(e),
        }
    }
}

pub trait ErrorTransforms {
    type Coerced;
    fn on_not_found(self, error: Error) -> Self::Coerced;
}

impl<R, E: Into<Error>> ErrorTransforms for Result<R, E> {
    type Coerced = Result<R, Error>;

    fn on_not_found(self, error: Error) -> Result<R, Error> {
        match self.map_err(|e| e.into()) {
            Err(Error::Io(e)) if io::ErrorKind::NotFound == e.kind() => {
                Err(error)
            }
            s => s,
        }
    }
}

#[cfg(test)]
mod test {
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    #[test]
    fn open_append_creates_with_mode() {
        let root = tempfile::TempDir::new().unwrap();
        let path = root.path().join("f");
        drop(open_append(&path, 0o600).unwrap());
        assert_eq!(
            0o600,
            fs::metadata(&path).unwrap().permissions().mode() & 0o777
        );
    }

    #[test]
    fn ensure_dir_is_idempotent() {
        let root = tempfile::TempDir::new().unwrap();
        let path = root.path().join("a").join("b");
        ensure_dir(&path, 0o700).unwrap();
        ensure_dir(&path, 0o700).unwrap();
        assert!(path.is_dir());
    }

    #[test]
    fn not_found_transforms() {
        let r: io::Result<Vec<u8>> = fs::read("/nonexistent/imap-backup");
        assert_matches!(
            Err(Error::NxLocalFolder(_)),
            r.on_not_found(Error::NxLocalFolder("x".to_owned()))
        );

        let r: io::Result<Vec<u8>> = fs::read("/nonexistent/imap-backup");
        assert_eq!(Vec::<u8>::new(), r.ignore_not_found().unwrap());
    }

    #[test]
    fn read_uninterruptibly_stops_at_eof() {
        let mut buf = [0u8; 8];
        let n = (&b"abc"[..]).read_uninteruptibly(&mut buf).unwrap();
        assert_eq!(3, n);
        assert_eq!(b"abc", &buf[..3]);
    }
}
