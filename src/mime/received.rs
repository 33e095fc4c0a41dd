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

//! Extraction of the delivery time from a raw message.
//!
//! Every hop that handles a message prepends a `Received` header whose value
//! ends with `; <date>`. The first such header in the message is therefore
//! the time the message arrived at its final destination, which is the best
//! available stand-in for the server's internal date when a message is
//! uploaded again.

use chrono::prelude::*;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ReceivedError {
    #[error("Message has no Received header")]
    Missing,
    #[error("Received header has no date: {0}")]
    NoDate(String),
    #[error("Bad date in Received header '{0}': {1}")]
    BadDate(String, chrono::ParseError),
}

/// Find the date in the first `Received` header of `message`.
pub fn received_time(
    message: &[u8],
) -> Result<DateTime<FixedOffset>, ReceivedError> {
    let value =
        first_header(message, "Received").ok_or(ReceivedError::Missing)?;
    let value = String::from_utf8_lossy(&value);

    let date = match value.rfind(';') {
        Some(ix) => value[ix + 1..].trim(),
        None => return Err(ReceivedError::NoDate(value.trim().to_owned())),
    };
    let date = strip_trailing_comment(date);

    DateTime::parse_from_rfc2822(date)
        .map_err(|e| ReceivedError::BadDate(date.to_owned(), e))
}

/// Return the unfolded value of the first header called `name` in the header
/// block of `message`, if there is one.
///
/// Line endings may be CRLF or bare LF. Unfolding just drops the line breaks,
/// leaving the leading whitespace of continuation lines in place.
fn first_header(message: &[u8], name: &str) -> Option<Vec<u8>> {
    let mut value: Option<Vec<u8>> = None;

    for line in message.split(|&b| b'\n' == b) {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            break;
        }

        if b' ' == line[0] || b'\t' == line[0] {
            if let Some(ref mut value) = value {
                value.extend_from_slice(line);
            }
            continue;
        }

        if value.is_some() {
            // The header we wanted just ended
            break;
        }

        let colon = match line.iter().position(|&b| b':' == b) {
            Some(colon) => colon,
            None => continue,
        };
        if line[..colon].eq_ignore_ascii_case(name.as_bytes()) {
            value = Some(line[colon + 1..].to_vec());
        }
    }

    value
}

/// Drop a parenthesised comment such as `(PST)` from the end of a date.
fn strip_trailing_comment(date: &str) -> &str {
    if date.ends_with(')') {
        if let Some(open) = date.rfind('(') {
            return date[..open].trim_end();
        }
    }

    date
}

#[cfg(test)]
mod test {
    use super::*;

    fn ts(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    #[test]
    fn first_received_header_wins() {
        let message = b"Return-Path: <alice@example.com>\r\n\
Received: from mx.example.com (mx.example.com [192.0.2.1])\r\n\
\tby imap.example.com with ESMTPS id abc123\r\n\
\tfor <bob@example.com>; Tue, 15 Mar 2022 10:20:30 +0100\r\n\
Received: from laptop by mx.example.com; Tue, 15 Mar 2022 09:00:00 +0000\r\n\
Subject: Hello; there\r\n\
\r\n\
Received: from body; Wed, 1 Jan 2020 00:00:00 +0000\r\n";

        assert_eq!(
            Ok(ts("2022-03-15T10:20:30+01:00")),
            received_time(message)
        );
    }

    #[test]
    fn header_name_is_case_insensitive() {
        let message = b"RECEIVED: by host; 1 Feb 2021 08:00:00 -0500\n\n";
        assert_eq!(Ok(ts("2021-02-01T08:00:00-05:00")), received_time(message));
    }

    #[test]
    fn trailing_comment_is_ignored() {
        let message =
            b"Received: by host; Mon, 7 Jun 2021 14:15:16 -0700 (PDT)\r\n\r\n";
        assert_eq!(Ok(ts("2021-06-07T14:15:16-07:00")), received_time(message));
    }

    #[test]
    fn missing_header() {
        assert_eq!(
            Err(ReceivedError::Missing),
            received_time(b"Subject: hi\r\n\r\nbody\r\n")
        );
        assert_eq!(Err(ReceivedError::Missing), received_time(b""));
        assert_eq!(
            Err(ReceivedError::Missing),
            received_time(
                b"Subject: hi\r\n\r\n\
                  Received: x; 1 Feb 2021 08:00:00 +0000\r\n"
            )
        );
    }

    #[test]
    fn header_without_date() {
        assert_matches!(
            Err(ReceivedError::NoDate(_)),
            received_time(b"Received: from somewhere\r\n\r\n")
        );
    }

    #[test]
    fn unparseable_date() {
        assert_matches!(
            Err(ReceivedError::BadDate(..)),
            received_time(b"Received: by host; yesterday at noon\r\n\r\n")
        );
    }
}
