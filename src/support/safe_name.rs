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

//! Mapping between remote folder names and local file name stems.
//!
//! Remote folder names are mostly usable as file names directly, and we want
//! the local archive to stay readable for the common case, so only the bytes
//! that would cause directory traversal, hidden files or ambiguity are
//! escaped, as `%XX` with upper-case hex digits:
//!
//! - `/` and `\`
//! - `%` itself
//! - ASCII control characters and DEL
//! - a `.` at the very start of the name
//!
//! Everything else, including non-ASCII text, is kept verbatim.

use std::fmt::Write;

use crate::support::error::Error;

/// Convert a folder name into the stem used for its `.mbox` and `.idx` files.
///
/// Fails with `Error::UnsafeName` for the empty name, which has no sensible
/// file representation.
pub fn encode_folder_name(name: &str) -> Result<String, Error> {
    if name.is_empty() {
        return Err(Error::UnsafeName);
    }

    let mut out = String::with_capacity(name.len());
    for (ix, ch) in name.char_indices() {
        let escape = match ch {
            '/' | '\\' | '%' => true,
            '.' => 0 == ix,
            c => c < ' ' || c == '\x7F',
        };

        if escape {
            let _ = write!(out, "%{:02X}", ch as u32);
        } else {
            out.push(ch);
        }
    }

    Ok(out)
}

/// Reverse `encode_folder_name`.
///
/// Returns `None` if `stem` could not have been produced by
/// `encode_folder_name`. Stems which decode to something but are not the
/// canonical encoding of it (`%41`, lower-case hex) are rejected too, since
/// the name they decode to would map back to different files.
pub fn decode_folder_name(stem: &str) -> Option<String> {
    let bytes = stem.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut ix = 0;
    while ix < bytes.len() {
        if b'%' == bytes[ix] {
            let hex = stem.get(ix + 1..ix + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            ix += 3;
        } else {
            out.push(bytes[ix]);
            ix += 1;
        }
    }

    let name = String::from_utf8(out).ok()?;
    if stem == encode_folder_name(&name).ok()? {
        Some(name)
    } else {
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn plain_names_are_verbatim() {
        assert_eq!("INBOX", encode_folder_name("INBOX").unwrap());
        assert_eq!("Entwürfe", encode_folder_name("Entwürfe").unwrap());
        assert_eq!("foo.bar", encode_folder_name("foo.bar").unwrap());
        assert_eq!("folder #1", encode_folder_name("folder #1").unwrap());
    }

    #[test]
    fn special_characters_are_escaped() {
        assert_eq!(
            "Archive%2F2020",
            encode_folder_name("Archive/2020").unwrap()
        );
        assert_eq!("a%5Cb", encode_folder_name("a\\b").unwrap());
        assert_eq!("100%25", encode_folder_name("100%").unwrap());
        assert_eq!("%2Ehidden", encode_folder_name(".hidden").unwrap());
        assert_eq!("%2E.", encode_folder_name("..").unwrap());
        assert_eq!("foo%00", encode_folder_name("foo\0").unwrap());
        assert_eq!("fo%7Fo", encode_folder_name("fo\x7Fo").unwrap());
        assert_matches!(Err(Error::UnsafeName), encode_folder_name(""));
    }

    #[test]
    fn decode_reverses_encode() {
        for name in &[
            "INBOX",
            "Archive/2020",
            "..",
            "100%",
            "[Gmail]/Alle Nachrichten",
            "郵便",
        ] {
            let stem = encode_folder_name(name).unwrap();
            assert_eq!(Some(name.to_string()), decode_folder_name(&stem));
        }
    }

    #[test]
    fn decode_rejects_malformed_stems() {
        assert_eq!(None, decode_folder_name("foo%"));
        assert_eq!(None, decode_folder_name("foo%4"));
        assert_eq!(None, decode_folder_name("foo%zz"));
        assert_eq!(None, decode_folder_name("%FF"));
        assert_eq!(None, decode_folder_name(""));
    }

    #[test]
    fn decode_rejects_non_canonical_stems() {
        assert_eq!(None, decode_folder_name("%41rchive"));
        assert_eq!(None, decode_folder_name("%2ehidden"));
        assert_eq!(None, decode_folder_name("a%2fb"));
        assert_eq!(None, decode_folder_name("%+F"));
        assert_eq!(None, decode_folder_name("a%2Eb"));
        assert_eq!(Some("a.b".to_owned()), decode_folder_name("a.b"));
    }
}
