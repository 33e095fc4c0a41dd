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

use std::time::Duration;

use log::warn;

use crate::support::error::Error;

/// Run `op` up to `attempts` times, sleeping `delay` after each failure.
///
/// Errors which come from the local store, such as a damaged index or a
/// folder that was never backed up, are returned immediately. Otherwise,
/// the error from the last attempt is returned once all attempts are
/// exhausted. `attempts` of 0 is treated as 1.
pub fn with_retry<T>(
    attempts: u32,
    delay: Duration,
    mut op: impl FnMut() -> Result<T, Error>,
) -> Result<T, Error> {
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(r) => return Ok(r),
            Err(e) if e.is_local_fault() || attempt >= attempts => {
                return Err(e)
            }
            Err(e) => {
                warn!(
                    "Attempt {}/{} failed: {}; retrying in {}s",
                    attempt,
                    attempts,
                    e,
                    delay.as_secs()
                );
                std::thread::sleep(delay);
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::io;
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn succeeds_after_transient_failures() {
        let mut calls = 0;
        let result = with_retry(3, Duration::from_millis(0), || {
            calls += 1;
            if calls < 3 {
                Err(Error::Protocol("try again".to_owned()))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(3, result.unwrap());
    }

    #[test]
    fn gives_up_after_last_attempt() {
        let mut calls = 0;
        let result: Result<(), Error> =
            with_retry(2, Duration::from_millis(0), || {
                calls += 1;
                Err(Error::Io(io::Error::new(io::ErrorKind::Other, "down")))
            });
        assert_matches!(Err(Error::Io(_)), result);
        assert_eq!(2, calls);
    }

    #[test]
    fn local_damage_is_not_retried() {
        let mut calls = 0;
        let result: Result<(), Error> =
            with_retry(5, Duration::from_millis(0), || {
                calls += 1;
                Err(Error::CorruptIndex {
                    path: PathBuf::from("INBOX.idx"),
                    line: 3,
                    detail: "missing field".to_owned(),
                })
            });
        assert_matches!(Err(Error::CorruptIndex { line: 3, .. }), result);
        assert_eq!(1, calls);
    }

    #[test]
    fn missing_local_folder_is_not_retried() {
        let mut calls = 0;
        let result: Result<(), Error> =
            with_retry(5, Duration::from_secs(3600), || {
                calls += 1;
                Err(Error::NxLocalFolder("Foo".to_owned()))
            });
        assert_matches!(Err(Error::NxLocalFolder(_)), result);
        assert_eq!(1, calls);
    }
}
