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

use std::fmt::Write as _;
use std::io;
use std::net::{TcpStream, ToSocketAddrs};

use chrono::prelude::*;
use log::{debug, info};
use openssl::ssl::{
    HandshakeError, SslConnector, SslMethod, SslStream, SslVerifyMode,
};

use ::imap::types::NameAttribute;

use crate::store::MessageMeta;
use crate::support::config::ImapConfig;
use crate::support::error::Error;
use crate::sync::{FetchedMessage, RemoteFolderStatus, RemoteMailbox};

/// Maximum number of messages whose metadata is requested in one `FETCH`.
const METADATA_BATCH: u32 = 1000;
/// Maximum number of messages whose bodies are requested in one `FETCH`.
///
/// The whole response to a command is buffered in memory before any of it is
/// handed out, so this bounds memory use as much as anything.
const BODY_BATCH: usize = 32;
/// Maximum number of sequence numbers in one `STORE`.
const STORE_BATCH: usize = 500;

/// A logged-in IMAPS session.
pub struct ImapSession {
    session: ::imap::Session<SslStream<TcpStream>>,
}

impl ImapSession {
    /// Connect to the server described by `config` and log in.
    pub fn connect(config: &ImapConfig, password: &str) -> Result<Self, Error> {
        let address = (&config.host as &str, config.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                Error::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("Host not found: {}", config.host),
                ))
            })?;

        debug!("Opening connection to {}", address);
        let tcp_stream = TcpStream::connect(address)?;

        debug!("Starting TLS handshake");
        let mut connector = SslConnector::builder(SslMethod::tls())?;
        if config.allow_insecure_tls_connections {
            connector.set_verify(SslVerifyMode::NONE);
        }

        let ssl_stream = connector
            .build()
            .connect(&config.host, tcp_stream)
            .map_err(|e| match e {
                HandshakeError::SetupFailure(es) => Error::Ssl(es),
                HandshakeError::Failure(f) => Error::Ssl2(f.into_error()),
                HandshakeError::WouldBlock(_) => unreachable!(),
            })?;

        let mut client = ::imap::Client::new(ssl_stream);
        client.read_greeting()?;

        debug!("Logging in as {}", config.user);
        let session = client
            .login(&config.user, password)
            .map_err(|(e, _)| Error::from(e))?;
        info!("Logged in to {} as {}", config.host, config.user);

        Ok(ImapSession { session })
    }
}

impl RemoteMailbox for ImapSession {
    fn list_folders(&mut self) -> Result<Vec<String>, Error> {
        let names = self.session.list(Some(""), Some("*"))?;
        let mut folders = names
            .iter()
            .filter(|n| {
                !n.attributes()
                    .iter()
                    .any(|a| matches!(*a, NameAttribute::NoSelect))
            })
            .map(|n| n.name().to_owned())
            .collect::<Vec<_>>();
        folders.sort();
        Ok(folders)
    }

    fn select_folder(
        &mut self,
        name: &str,
        read_only: bool,
    ) -> Result<RemoteFolderStatus, Error> {
        let mailbox = if read_only {
            self.session.examine(name)
        } else {
            self.session.select(name)
        }
        .map_err(|e| match e {
            ::imap::error::Error::No(_) => {
                Error::NxRemoteFolder(name.to_owned())
            }
            e => e.into(),
        })?;

        let uid_validity = mailbox.uid_validity.ok_or_else(|| {
            Error::Protocol(format!("Server sent no UIDVALIDITY for {}", name))
        })?;

        Ok(RemoteFolderStatus {
            exists: mailbox.exists,
            uid_validity,
        })
    }

    fn fetch_metadata(
        &mut self,
        count: u32,
    ) -> Result<Vec<MessageMeta>, Error> {
        let mut messages = Vec::with_capacity(count as usize);
        let mut start = 1u32;
        while start <= count {
            let end = start.saturating_add(METADATA_BATCH - 1).min(count);
            let fetches = self
                .session
                .fetch(format!("{}:{}", start, end), "(UID RFC822.SIZE)")?;

            for fetch in fetches.iter() {
                messages.push(MessageMeta {
                    seqnum: Some(fetch.message),
                    uid_validity: 0,
                    uid: fetch
                        .uid
                        .ok_or_else(|| missing("UID", fetch.message))?,
                    size: fetch
                        .size
                        .ok_or_else(|| missing("RFC822.SIZE", fetch.message))?,
                    offset: None,
                });
            }

            if end == u32::MAX {
                break;
            }
            start = end + 1;
        }

        messages.sort_by_key(|m| m.seqnum);
        Ok(messages)
    }

    fn fetch_bodies(
        &mut self,
        seqnums: &[u32],
        sink: &mut dyn FnMut(FetchedMessage) -> Result<(), Error>,
    ) -> Result<(), Error> {
        for batch in seqnums.chunks(BODY_BATCH) {
            let fetches = self.session.fetch(
                seqset_string(batch),
                "(UID RFC822.SIZE ENVELOPE BODY.PEEK[])",
            )?;

            for fetch in fetches.iter() {
                let seqnum = fetch.message;
                let body = fetch
                    .body()
                    .ok_or(Error::MissingBody { seqnum })?
                    .to_vec();
                let envelope = fetch.envelope();

                let from = envelope
                    .and_then(|e| e.from.as_ref())
                    .and_then(|addrs| addrs.first())
                    .map(|a| {
                        let mailbox = a
                            .mailbox
                            .map(String::from_utf8_lossy)
                            .unwrap_or_default();
                        match a.host {
                            Some(host) => format!(
                                "{}@{}",
                                mailbox,
                                String::from_utf8_lossy(host)
                            ),
                            None => mailbox.into_owned(),
                        }
                    })
                    .unwrap_or_default();

                let date = envelope
                    .and_then(|e| e.date)
                    .and_then(|d| std::str::from_utf8(d).ok())
                    .and_then(|d| DateTime::parse_from_rfc2822(d.trim()).ok());

                sink(FetchedMessage {
                    seqnum,
                    uid: fetch.uid.ok_or_else(|| missing("UID", seqnum))?,
                    size: fetch.size.unwrap_or(body.len() as u32),
                    from,
                    date,
                    body,
                })?;
            }
        }

        Ok(())
    }

    fn append_message(
        &mut self,
        folder: &str,
        date: DateTime<FixedOffset>,
        body: &[u8],
    ) -> Result<(), Error> {
        self.session
            .append_with_flags_and_date(folder, body, &[], Some(date))?;
        Ok(())
    }

    fn search_before(&mut self, date: NaiveDate) -> Result<Vec<u32>, Error> {
        let found = self
            .session
            .search(format!("BEFORE {}", date.format("%-d-%b-%Y")))?;
        let mut seqnums = found.into_iter().collect::<Vec<_>>();
        seqnums.sort_unstable();
        Ok(seqnums)
    }

    fn flag_and_expunge(&mut self, seqnums: &[u32]) -> Result<(), Error> {
        // Sequence numbers only shift on EXPUNGE, so batches of STORE can
        // all use the original numbering.
        for batch in seqnums.chunks(STORE_BATCH) {
            self.session
                .store(seqset_string(batch), "+FLAGS.SILENT (\\Deleted)")?;
        }
        self.session.expunge()?;
        Ok(())
    }

    fn create_folder(&mut self, name: &str) -> Result<(), Error> {
        self.session.create(name)?;
        Ok(())
    }

    fn logout(&mut self) -> Result<(), Error> {
        self.session.logout()?;
        Ok(())
    }
}

fn missing(what: &str, seqnum: u32) -> Error {
    Error::Protocol(format!("Server sent no {} for message {}", what, seqnum))
}

/// Render `seqnums` as an IMAP sequence set, merging consecutive numbers into
/// ranges.
pub fn seqset_string(seqnums: &[u32]) -> String {
    let mut sorted = seqnums.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut out = String::new();
    let mut ix = 0;
    while ix < sorted.len() {
        let start = sorted[ix];
        let mut end = start;
        while ix + 1 < sorted.len()
            && end.checked_add(1) == Some(sorted[ix + 1])
        {
            ix += 1;
            end = sorted[ix];
        }

        if !out.is_empty() {
            out.push(',');
        }
        if start == end {
            let _ = write!(out, "{}", start);
        } else {
            let _ = write!(out, "{}:{}", start, end);
        }
        ix += 1;
    }

    out
}
