/*
 * Created on Sun Mar 16 2025
 *
 * This file is a part of Skytable
 * Skytable (formerly known as TerrabaseDB or Skybase) is a free and open-source
 * NoSQL database written by Sayan Nandan ("the Author") with the
 * vision to provide flexibility in data modelling without compromising
 * on performance, queryability or scalability.
 *
 * Copyright (c) 2025, Sayan Nandan <ohsayan@outlook.com>
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

//! One WAL record is the RESP3 map `{timestamp, database, command, args}` (§4.8), encoded with
//! the same frame grammar the wire protocol uses so replay can reuse `protocol::parser`
//! directly rather than a second ad hoc format.

use crate::protocol::value::RespValue;
use bytes::Bytes;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalRecord {
    pub timestamp_millis: u64,
    pub database: u8,
    pub command: Vec<u8>,
    pub args: Vec<Vec<u8>>,
}

fn write_bulk(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(format!("${}\r\n", data.len()).as_bytes());
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
}

impl WalRecord {
    /// Encodes this record as an uncompressed RESP3 map frame. Compression and file framing
    /// are the caller's concern (`wal::Wal::append`).
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64 + self.args.iter().map(|a| a.len() + 8).sum::<usize>());
        out.extend_from_slice(b"%4\r\n");
        write_bulk(&mut out, b"timestamp");
        out.extend_from_slice(format!(":{}\r\n", self.timestamp_millis).as_bytes());
        write_bulk(&mut out, b"database");
        out.extend_from_slice(format!(":{}\r\n", self.database).as_bytes());
        write_bulk(&mut out, b"command");
        write_bulk(&mut out, &self.command);
        write_bulk(&mut out, b"args");
        out.extend_from_slice(format!("*{}\r\n", self.args.len()).as_bytes());
        for arg in &self.args {
            write_bulk(&mut out, arg);
        }
        out
    }

    pub fn decode(raw: &[u8]) -> Option<WalRecord> {
        let buf = Bytes::copy_from_slice(raw);
        let value = match crate::protocol::parser::Parser::parse_value(&buf).ok()? {
            crate::protocol::parser::ParseValueOutcome::Value { value, .. } => value,
            crate::protocol::parser::ParseValueOutcome::Incomplete => return None,
        };
        let RespValue::Map(pairs) = value else {
            return None;
        };
        let mut timestamp_millis = None;
        let mut database = None;
        let mut command = None;
        let mut args = None;
        for (k, v) in pairs {
            let RespValue::BulkString(Some(key)) = k else {
                continue;
            };
            match key.as_ref() {
                b"timestamp" => {
                    if let RespValue::Integer(n) = v {
                        timestamp_millis = Some(n as u64);
                    }
                }
                b"database" => {
                    if let RespValue::Integer(n) = v {
                        database = Some(n as u8);
                    }
                }
                b"command" => {
                    if let RespValue::BulkString(Some(b)) = v {
                        command = Some(b.to_vec());
                    }
                }
                b"args" => {
                    if let RespValue::Array(Some(items)) = v {
                        let mut out = Vec::with_capacity(items.len());
                        for item in items {
                            if let RespValue::BulkString(Some(b)) = item {
                                out.push(b.to_vec());
                            }
                        }
                        args = Some(out);
                    }
                }
                _ => {}
            }
        }
        Some(WalRecord {
            timestamp_millis: timestamp_millis?,
            database: database?,
            command: command?,
            args: args?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_resp_encoding() {
        let record = WalRecord {
            timestamp_millis: 12345,
            database: 3,
            command: b"SET".to_vec(),
            args: vec![b"k".to_vec(), b"v".to_vec()],
        };
        let encoded = record.encode();
        let decoded = WalRecord::decode(&encoded).unwrap();
        assert_eq!(record, decoded);
    }
}
