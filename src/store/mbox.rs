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

//! The per-folder archive file.
//!
//! The archive is an mbox-style file: for each message, a delimiter line of
//! the form
//!
//! ```text
//! From <sender-address> <asctime-style UTC date>
//! ```
//!
//! then the raw message exactly as received from the server, then a single
//! line feed. Message bodies are not escaped in any way (no `>From ` quoting),
//! which keeps them byte-for-byte identical to the original so that sizes,
//! checksums and signatures remain valid. The consequence is that the file
//! cannot be split reliably by looking for delimiter lines, so bodies are only
//! ever located through the offsets recorded in the index.

use std::fs;
use std::io::{self, Seek, Write};
use std::path::Path;

use chrono::prelude::*;

use crate::support::file_ops::{self, ReadUninterruptibly};

/// Placeholder for the delimiter line when the sender is unknown.
const UNKNOWN_SENDER: &str = "MAILER-DAEMON";

/// Appends messages to an archive file.
///
/// Every write goes straight to the file, so once `append()` returns, the
/// message is as durable as the OS makes unflushed writes.
pub struct MboxWriter {
    file: fs::File,
    /// The current length of the file, which is where the next byte goes.
    position: u64,
}

impl MboxWriter {
    /// Open the archive at `path` for appending, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let mut file = file_ops::open_append(path, 0o600)?;
        let position = file.seek(io::SeekFrom::End(0))?;
        Ok(MboxWriter { file, position })
    }

    /// Append one message.
    ///
    /// `from` and `when` are only used for the delimiter line. Returns the
    /// offset of the first byte of `body` within the file.
    pub fn append(
        &mut self,
        from: &str,
        when: DateTime<Utc>,
        body: &[u8],
    ) -> io::Result<u64> {
        let delimiter = delimiter_line(from, when);
        self.write(delimiter.as_bytes())?;
        let offset = self.position;
        self.write(body)?;
        self.write(b"\n")?;
        Ok(offset)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.file.write_all(data)?;
        self.position += data.len() as u64;
        Ok(())
    }

    /// Flush the file to disk and close it.
    pub fn close(self) -> io::Result<()> {
        self.file.sync_data()
    }
}

/// Reads message bodies out of an archive file by offset.
pub struct MboxReader {
    file: fs::File,
}

impl MboxReader {
    /// Open the archive at `path` for reading.
    ///
    /// Fails with an error of kind `NotFound` if there is no such file.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(MboxReader {
            file: fs::File::open(path)?,
        })
    }

    /// Read exactly `size` bytes starting at `offset` into `dst`, replacing
    /// its previous content.
    ///
    /// If the file ends before `size` bytes have been read, this fails with
    /// an error of kind `UnexpectedEof`.
    pub fn read_at(
        &mut self,
        offset: u64,
        size: u32,
        dst: &mut Vec<u8>,
    ) -> io::Result<()> {
        dst.clear();
        dst.resize(size as usize, 0);
        self.file.seek(io::SeekFrom::Start(offset))?;
        let nread = self.file.read_uninteruptibly(dst)?;
        if nread < dst.len() {
            dst.truncate(nread);
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "archive ends {} bytes into the {}-byte message \
                     at offset {}",
                    nread, size, offset
                ),
            ));
        }

        Ok(())
    }
}

fn delimiter_line(from: &str, when: DateTime<Utc>) -> String {
    // The delimiter must stay on one line and the address must be one word
    let from = from
        .split(|c: char| c.is_whitespace() || c.is_control())
        .find(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_SENDER);
    format!("From {} {}\n", from, when.format("%a %b %e %H:%M:%S %Y"))
}

#[cfg(test)]
mod test {
    use tempfile::TempDir;

    use super::*;

    fn when() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 3, 4, 5, 6, 7).unwrap()
    }

    #[test]
    fn delimiter_formatting() {
        assert_eq!(
            "From alice@example.com Fri Mar  4 05:06:07 2022\n",
            delimiter_line("alice@example.com", when())
        );
        assert_eq!(
            "From MAILER-DAEMON Fri Mar  4 05:06:07 2022\n",
            delimiter_line("", when())
        );
        assert_eq!(
            "From evil Fri Mar  4 05:06:07 2022\n",
            delimiter_line("evil\nFrom x", when())
        );
        assert_eq!(
            "From bob@example.com Sat Dec 31 23:59:59 2022\n",
            delimiter_line(
                "bob@example.com",
                Utc.with_ymd_and_hms(2022, 12, 31, 23, 59, 59).unwrap()
            )
        );
    }

    #[test]
    fn append_and_read_back() {
        let root = TempDir::new().unwrap();
        let path = root.path().join("INBOX.mbox");

        let first = b"Subject: one\r\n\r\nhello\r\n";
        let second = b"Subject: two\r\n\r\nFrom the start\r\nFrom nowhere\r\n";

        let mut writer = MboxWriter::open(&path).unwrap();
        let off1 = writer.append("a@example.com", when(), first).unwrap();
        let off2 = writer.append("b@example.com", when(), second).unwrap();
        writer.close().unwrap();

        let delim_len =
            delimiter_line("a@example.com", when()).len() as u64;
        assert_eq!(delim_len, off1);
        assert_eq!(
            off1 + first.len() as u64 + 1 + delim_len,
            off2
        );

        let mut expected = Vec::new();
        expected.extend_from_slice(
            delimiter_line("a@example.com", when()).as_bytes(),
        );
        expected.extend_from_slice(first);
        expected.push(b'\n');
        expected.extend_from_slice(
            delimiter_line("b@example.com", when()).as_bytes(),
        );
        expected.extend_from_slice(second);
        expected.push(b'\n');
        assert_eq!(expected, fs::read(&path).unwrap());

        let mut reader = MboxReader::open(&path).unwrap();
        let mut buf = Vec::new();
        reader.read_at(off2, second.len() as u32, &mut buf).unwrap();
        assert_eq!(&second[..], &buf[..]);
        reader.read_at(off1, first.len() as u32, &mut buf).unwrap();
        assert_eq!(&first[..], &buf[..]);
    }

    #[test]
    fn reopen_continues_at_end() {
        let root = TempDir::new().unwrap();
        let path = root.path().join("INBOX.mbox");

        let mut writer = MboxWriter::open(&path).unwrap();
        writer.append("a@example.com", when(), b"one").unwrap();
        writer.close().unwrap();
        let len_after_first = fs::metadata(&path).unwrap().len();

        let mut writer = MboxWriter::open(&path).unwrap();
        let offset = writer.append("a@example.com", when(), b"two").unwrap();
        writer.close().unwrap();

        assert_eq!(
            len_after_first
                + delimiter_line("a@example.com", when()).len() as u64,
            offset
        );

        let mut buf = Vec::new();
        MboxReader::open(&path)
            .unwrap()
            .read_at(offset, 3, &mut buf)
            .unwrap();
        assert_eq!(b"two", &buf[..]);
    }

    #[test]
    fn short_read_fails() {
        let root = TempDir::new().unwrap();
        let path = root.path().join("INBOX.mbox");

        let mut writer = MboxWriter::open(&path).unwrap();
        let offset = writer.append("a@example.com", when(), b"short").unwrap();
        writer.close().unwrap();

        let mut reader = MboxReader::open(&path).unwrap();
        let mut buf = Vec::new();
        match reader.read_at(offset, 100, &mut buf) {
            Err(e) => assert_eq!(io::ErrorKind::UnexpectedEof, e.kind()),
            Ok(()) => panic!("read past end of archive"),
        }

        match reader.read_at(offset + 1000, 1, &mut buf) {
            Err(e) => assert_eq!(io::ErrorKind::UnexpectedEof, e.kind()),
            Ok(()) => panic!("read past end of archive"),
        }
    }

    #[test]
    fn empty_body() {
        let root = TempDir::new().unwrap();
        let path = root.path().join("INBOX.mbox");

        let mut writer = MboxWriter::open(&path).unwrap();
        let offset = writer.append("a@example.com", when(), b"").unwrap();
        writer.close().unwrap();

        let mut buf = vec![1, 2, 3];
        MboxReader::open(&path)
            .unwrap()
            .read_at(offset, 0, &mut buf)
            .unwrap();
        assert!(buf.is_empty());
    }
}
