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

//! The per-folder index file.
//!
//! # Format
//!
//! The index is plain text with one record per line, and no header or
//! trailer. Each line holds four decimal integers separated by tabs and is
//! terminated by a single line feed:
//!
//! ```text
//! <uid-validity>\t<uid>\t<size>\t<offset>\n
//! ```
//!
//! - `uid-validity` (u32): the UID validity of the remote folder at the time
//!   the message was backed up.
//! - `uid` (u32): the UID of the message within that validity epoch.
//! - `size` (u32): the length in bytes of the raw message.
//! - `offset` (u64): the position of the first byte of the message body
//!   within the archive file.
//!
//! Lines are only ever appended, in the order messages were written to the
//! archive, so offsets strictly increase from one record to the next. A line
//! which does not follow this format exactly makes the whole index
//! unreadable; there is no attempt to skip over damage.
//!
//! The one exception is a final line without its line feed. That is what a
//! process killed in the middle of an append leaves behind, so it is treated
//! as a record which was never written: readers stop before it and report
//! its length through `IndexReader::torn_tail()`, and `IndexWriter::open()`
//! cuts it off before anything is appended after it.

use std::collections::HashMap;
use std::fs;
use std::io::{self, BufRead, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::str;

use super::message_meta::MessageMeta;
use crate::support::error::Error;
use crate::support::file_ops;

/// Reads records out of an index file in order.
///
/// This is a forward-only iterator. After it yields an error or reaches the
/// end, it yields nothing further; the file must be opened again to scan it
/// again.
pub struct IndexReader {
    path: PathBuf,
    reader: io::BufReader<fs::File>,
    line_no: usize,
    buf: Vec<u8>,
    done: bool,
    torn_tail: usize,
}

impl IndexReader {
    /// Open the index at `path` for reading.
    ///
    /// Fails with an error of kind `NotFound` if there is no such file.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_owned();
        let file = fs::File::open(&path)?;
        Ok(IndexReader {
            path,
            reader: io::BufReader::new(file),
            line_no: 0,
            buf: Vec::new(),
            done: false,
            torn_tail: 0,
        })
    }

    /// The length of the unterminated final line the scan stopped at, or 0
    /// if the index ended cleanly (or has not been read to the end yet).
    pub fn torn_tail(&self) -> usize {
        self.torn_tail
    }

    /// Drain the rest of the index into a map keyed by message key.
    ///
    /// Also returns the UID validity of the last record, if there were any
    /// records.
    ///
    /// If the same key occurs more than once, the first record wins; later
    /// ones refer to redundant copies in the archive. Any error aborts the
    /// whole load.
    pub fn load_all(
        &mut self,
    ) -> Result<(HashMap<u64, MessageMeta>, Option<u32>), Error> {
        let mut map = HashMap::new();
        let mut last_validity = None;
        for meta in self.by_ref() {
            let meta = meta?;
            last_validity = Some(meta.uid_validity);
            map.entry(meta.key()).or_insert(meta);
        }

        Ok((map, last_validity))
    }

    fn corrupt(&self, detail: impl Into<String>) -> Error {
        Error::CorruptIndex {
            path: self.path.clone(),
            line: self.line_no,
            detail: detail.into(),
        }
    }

    fn read_record(&mut self) -> Result<Option<MessageMeta>, Error> {
        self.buf.clear();
        if 0 == self.reader.read_until(b'\n', &mut self.buf)? {
            return Ok(None);
        }

        if Some(&b'\n') != self.buf.last() {
            // read_until() only stops short of the delimiter at EOF
            self.torn_tail = self.buf.len();
            return Ok(None);
        }

        self.line_no += 1;

        let line = str::from_utf8(&self.buf[..self.buf.len() - 1])
            .map_err(|_| self.corrupt("line is not valid UTF-8"))?;
        parse_line(line).map(Some).map_err(|e| self.corrupt(e))
    }
}

impl Iterator for IndexReader {
    type Item = Result<MessageMeta, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.read_record() {
            Ok(Some(meta)) => Some(Ok(meta)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Appends records to an index file.
///
/// Writes are buffered; nothing is guaranteed to reach the file until
/// `close()` returns successfully. Dropping the writer without calling
/// `close()` still flushes on a best-effort basis. Each record enters the
/// buffer in one piece, so the buffer is only ever flushed at a record
/// boundary.
pub struct IndexWriter {
    writer: io::BufWriter<fs::File>,
    discarded: u64,
}

impl IndexWriter {
    /// Open the index at `path` for appending, creating it if needed.
    ///
    /// An unterminated final line left by an interrupted append is removed
    /// first; see `discarded()`.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let discarded = truncate_torn_tail(path)?;
        Ok(IndexWriter {
            writer: io::BufWriter::new(file_ops::open_append(path, 0o600)?),
            discarded,
        })
    }

    /// The number of bytes of an unterminated final line `open()` removed.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Append one record.
    pub fn append(
        &mut self,
        uid_validity: u32,
        uid: u32,
        size: u32,
        offset: u64,
    ) -> io::Result<()> {
        let line =
            format!("{}\t{}\t{}\t{}\n", uid_validity, uid, size, offset);
        self.writer.write_all(line.as_bytes())
    }

    /// Flush everything written so far to disk and close the file.
    pub fn close(mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()
    }
}

/// Cut `path` back to just after its last line feed.
///
/// Returns the number of bytes removed. A nonexistent file is left alone.
fn truncate_torn_tail(path: &Path) -> io::Result<u64> {
    let mut file =
        match fs::OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => file,
            Err(e) if io::ErrorKind::NotFound == e.kind() => return Ok(0),
            Err(e) => return Err(e),
        };

    let len = file.metadata()?.len();
    let mut end = len;
    let mut buf = [0u8; 4096];
    while end > 0 {
        let start = end.saturating_sub(buf.len() as u64);
        let chunk = &mut buf[..(end - start) as usize];
        file.seek(io::SeekFrom::Start(start))?;
        file.read_exact(chunk)?;
        if let Some(pos) = chunk.iter().rposition(|&b| b'\n' == b) {
            end = start + pos as u64 + 1;
            break;
        }
        end = start;
    }

    if end < len {
        file.set_len(end)?;
        file.sync_data()?;
    }

    Ok(len - end)
}

fn parse_line(line: &str) -> Result<MessageMeta, String> {
    let fields = line.split('\t').collect::<Vec<_>>();
    if 4 != fields.len() {
        return Err(format!("expected 4 fields, found {}", fields.len()));
    }

    fn field<T: str::FromStr>(what: &str, s: &str) -> Result<T, String>
    where
        T::Err: std::fmt::Display,
    {
        // FromStr for integers accepts a leading '+', which we never write
        if s.starts_with('+') {
            return Err(format!("bad {} '{}'", what, s));
        }
        s.parse::<T>()
            .map_err(|e| format!("bad {} '{}': {}", what, s, e))
    }

    Ok(MessageMeta {
        seqnum: None,
        uid_validity: field("UID validity", fields[0])?,
        uid: field("UID", fields[1])?,
        size: field("size", fields[2])?,
        offset: Some(field::<u64>("offset", fields[3])?),
    })
}
