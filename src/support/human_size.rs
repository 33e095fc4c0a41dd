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

use std::fmt;

const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

/// Displays a byte count using the largest binary unit up to TB.
///
/// Values below 10 units get one decimal place, larger ones are truncated to
/// whole units.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HumanSize(pub u64);

impl fmt::Display for HumanSize {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let n = self.0;
        if n < 1024 {
            return write!(f, "{} B", n);
        }

        let mut scale = 1024u64;
        for (ix, unit) in UNITS.iter().enumerate() {
            let next = scale.saturating_mul(1024);
            if n < next || ix + 1 == UNITS.len() {
                return if n < 10 * scale {
                    write!(f, "{:.1} {}", n as f64 / scale as f64, unit)
                } else {
                    write!(f, "{} {}", n / scale, unit)
                };
            }
            scale = next;
        }

        unreachable!()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn h(n: u64) -> String {
        HumanSize(n).to_string()
    }

    #[test]
    fn formatting() {
        assert_eq!("0 B", h(0));
        assert_eq!("1023 B", h(1023));
        assert_eq!("1.0 KB", h(1024));
        assert_eq!("1.5 KB", h(1536));
        assert_eq!("10 KB", h(10 * 1024));
        assert_eq!("1023 KB", h(1024 * 1024 - 1));
        assert_eq!("1.0 MB", h(1024 * 1024));
        assert_eq!("600 MB", h(600 * 1024 * 1024));
        assert_eq!("2.5 GB", h(5 * 512 * 1024 * 1024));
        assert_eq!("3.0 TB", h(3 << 40));
        assert_eq!("2048 TB", h(2048 << 40));
    }
}
