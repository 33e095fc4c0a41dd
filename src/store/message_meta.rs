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

/// Combine a UID validity and a UID into the key which identifies a message
/// across the server and the local archive.
///
/// The validity occupies the upper 32 bits, so keys order first by validity
/// and then by UID.
pub fn message_key(uid_validity: u32, uid: u32) -> u64 {
    (u64::from(uid_validity) << 32) | u64::from(uid)
}

/// Metadata for one message, either as listed by the server or as recorded
/// in a local index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageMeta {
    /// The sequence number on the server, if this came from a server listing.
    ///
    /// Sequence numbers only mean something within the session that produced
    /// them and never take part in identity.
    pub seqnum: Option<u32>,
    pub uid_validity: u32,
    pub uid: u32,
    /// Size of the raw message in bytes.
    pub size: u32,
    /// Offset of the message body within the local archive, if the message
    /// has been stored locally.
    pub offset: Option<u64>,
}

impl MessageMeta {
    pub fn key(&self) -> u64 {
        message_key(self.uid_validity, self.uid)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn key_layout() {
        assert_eq!(0, message_key(0, 0));
        assert_eq!(1, message_key(0, 1));
        assert_eq!(1 << 32, message_key(1, 0));
        assert_eq!(0x0000_0007_0000_0003, message_key(7, 3));
        assert_eq!(u64::MAX, message_key(u32::MAX, u32::MAX));
    }

    #[test]
    fn keys_order_by_validity_then_uid() {
        assert!(message_key(1, u32::MAX) < message_key(2, 0));
        assert!(message_key(2, 1) < message_key(2, 2));
    }

    #[test]
    fn key_ignores_everything_but_identity() {
        let a = MessageMeta {
            seqnum: Some(4),
            uid_validity: 7,
            uid: 3,
            size: 100,
            offset: None,
        };
        let b = MessageMeta {
            seqnum: None,
            size: 999,
            offset: Some(12),
            ..a
        };
        assert_eq!(a.key(), b.key());
    }
}
