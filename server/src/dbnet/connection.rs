/*
 * Created on Sun Apr 25 2021
 *
 * This file is a part of Skytable
 * Skytable (formerly known as TerrabaseDB or Skybase) is a free and open-source
 * NoSQL database written by Sayan Nandan ("the Author") with the
 * vision to provide flexibility in data modelling without compromising
 * on performance, queryability or scalability.
 *
 * Copyright (c) 2020, Sayan Nandan <ohsayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! The connection's read side: a growable buffer that bytes are read into and RESP requests
//! are decoded out of. Kept separate from the request-handling loop in `dbnet::mod` so the
//! decoding logic can be driven directly from a test without a real socket.

use crate::protocol::{parser::ParseOutcome, Parser, ProtocolError};
use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Wraps a readable half of a connection with the buffer `Parser::parse` decodes requests out
/// of. One frame is copied into a `Bytes` snapshot per parse attempt; the argument slices the
/// parser hands back stay valid regardless of what `fill` does to the buffer afterward, since
/// they're independent refcounted allocations, not views into it.
pub struct Connection<R> {
    reader: R,
    buffer: BytesMut,
}

impl<R: AsyncRead + Unpin> Connection<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: BytesMut::with_capacity(libsky::BUF_CAP),
        }
    }

    /// Tries to decode one request already sitting in the buffer. Returns `Ok(None)` when the
    /// buffer doesn't yet hold a complete frame — the caller should `fill` and retry.
    pub fn next_request(&mut self) -> Result<Option<Vec<Bytes>>, ProtocolError> {
        let snapshot = Bytes::copy_from_slice(&self.buffer);
        match Parser::parse(&snapshot)? {
            ParseOutcome::Incomplete => Ok(None),
            ParseOutcome::Request { args, consumed } => {
                self.buffer.advance(consumed);
                Ok(Some(args))
            }
        }
    }

    /// Reads more bytes off the socket. `Ok(false)` signals a clean EOF (the peer closed its
    /// write half with nothing left buffered on our side).
    pub async fn fill(&mut self) -> std::io::Result<bool> {
        let mut chunk = [0u8; libsky::BUF_CAP];
        let n = self.reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(false);
        }
        self.buffer.extend_from_slice(&chunk[..n]);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn decodes_a_request_split_across_two_reads() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut conn = Connection::new(server);
        assert!(conn.next_request().unwrap().is_none());

        client.write_all(b"*2\r\n$3\r\nGET").await.unwrap();
        assert!(conn.fill().await.unwrap());
        assert!(conn.next_request().unwrap().is_none());

        client.write_all(b"\r\n$1\r\nk\r\n").await.unwrap();
        assert!(conn.fill().await.unwrap());
        let req = conn.next_request().unwrap().unwrap();
        assert_eq!(req, vec![Bytes::from_static(b"GET"), Bytes::from_static(b"k")]);
    }

    #[tokio::test]
    async fn decodes_pipelined_requests_from_one_read() {
        let (mut client, server) = tokio::io::duplex(128);
        let mut conn = Connection::new(server);
        client
            .write_all(b"*1\r\n$4\r\nPING\r\n*1\r\n$4\r\nPING\r\n")
            .await
            .unwrap();
        assert!(conn.fill().await.unwrap());
        let first = conn.next_request().unwrap().unwrap();
        assert_eq!(first, vec![Bytes::from_static(b"PING")]);
        let second = conn.next_request().unwrap().unwrap();
        assert_eq!(second, vec![Bytes::from_static(b"PING")]);
        assert!(conn.next_request().unwrap().is_none());
    }

    #[tokio::test]
    async fn clean_eof_reports_false() {
        let (client, server) = tokio::io::duplex(8);
        let mut conn = Connection::new(server);
        drop(client);
        assert!(!conn.fill().await.unwrap());
    }
}
