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

//! A streaming scanner over the connection's read buffer. Like the rest of this protocol
//! layer, it never copies bytes out until a frame boundary is confirmed: intermediate
//! slices are taken via `Bytes::slice`, which is a refcount bump, not an allocation.

use super::{value::RespValue, ProtocolError};
use bytes::Bytes;

/// Outcome of attempting to parse one client request out of the buffer.
pub enum ParseOutcome {
    /// Not enough bytes yet; caller should read more from the socket and retry.
    Incomplete,
    /// A full request was parsed; `consumed` bytes should be advanced off the front
    /// of the connection's read buffer.
    Request { args: Vec<Bytes>, consumed: usize },
}

/// Outcome of decoding one arbitrary RESP value (used by the WAL record codec and by tests
/// that exercise the encode/decode round-trip; the hot request path uses `Parser::parse`
/// instead, which only ever expects the request shape).
pub enum ParseValueOutcome {
    Incomplete,
    Value { value: RespValue, consumed: usize },
}

pub struct Parser;

impl Parser {
    /// Parse one client request (a RESP array of bulk strings, or an inline command).
    pub fn parse(buf: &Bytes) -> Result<ParseOutcome, ProtocolError> {
        let raw = buf.as_ref();
        if raw.is_empty() {
            return Ok(ParseOutcome::Incomplete);
        }
        if raw[0] == b'*' {
            Self::parse_multibulk(buf, raw)
        } else {
            Self::parse_inline(buf, raw)
        }
    }

    /// Decode one arbitrary RESP value off the front of `buf`. Exposed for the WAL codec
    /// and for protocol round-trip tests.
    pub fn parse_value(buf: &Bytes) -> Result<ParseValueOutcome, ProtocolError> {
        let raw = buf.as_ref();
        if raw.is_empty() {
            return Ok(ParseValueOutcome::Incomplete);
        }
        let mut cursor = 0usize;
        match Self::decode_one(buf, raw, &mut cursor)? {
            None => Ok(ParseValueOutcome::Incomplete),
            Some(value) => Ok(ParseValueOutcome::Value {
                value,
                consumed: cursor,
            }),
        }
    }

    fn decode_one(
        buf: &Bytes,
        raw: &[u8],
        cursor: &mut usize,
    ) -> Result<Option<RespValue>, ProtocolError> {
        if *cursor >= raw.len() {
            return Ok(None);
        }
        let tag = raw[*cursor];
        match tag {
            b'+' => match Self::read_line(buf, raw, cursor, 1)? {
                None => Ok(None),
                Some(b) => Ok(Some(RespValue::SimpleString(b))),
            },
            b'-' => match Self::read_line(buf, raw, cursor, 1)? {
                None => Ok(None),
                Some(b) => Ok(Some(RespValue::Error(b))),
            },
            b':' => match Self::read_integer_line(raw, cursor, b':')? {
                None => Ok(None),
                Some(n) => Ok(Some(RespValue::Integer(n))),
            },
            b'#' => match Self::read_line(buf, raw, cursor, 1)? {
                None => Ok(None),
                Some(b) => match b.as_ref() {
                    b"t" => Ok(Some(RespValue::Boolean(true))),
                    b"f" => Ok(Some(RespValue::Boolean(false))),
                    _ => Err(ProtocolError::Invalid("invalid boolean frame")),
                },
            },
            b',' => match Self::read_line(buf, raw, cursor, 1)? {
                None => Ok(None),
                Some(b) => {
                    let s = std::str::from_utf8(&b)
                        .map_err(|_| ProtocolError::Invalid("non-utf8 double"))?;
                    let d: f64 = s
                        .parse()
                        .map_err(|_| ProtocolError::Invalid("invalid double"))?;
                    Ok(Some(RespValue::Double(d)))
                }
            },
            b'(' => match Self::read_line(buf, raw, cursor, 1)? {
                None => Ok(None),
                Some(b) => Ok(Some(RespValue::BigNumber(b))),
            },
            b'_' => {
                if *cursor + 3 > raw.len() {
                    return Ok(None);
                }
                if &raw[*cursor + 1..*cursor + 3] != b"\r\n" {
                    return Err(ProtocolError::Invalid("malformed null frame"));
                }
                *cursor += 3;
                Ok(Some(RespValue::Null))
            }
            b'$' => {
                let mut c = *cursor;
                match Self::read_integer_line(raw, &mut c, b'$')? {
                    None => Ok(None),
                    Some(n) => {
                        if n < 0 {
                            *cursor = c;
                            return Ok(Some(RespValue::BulkString(None)));
                        }
                        let n = n as usize;
                        if c + n + 2 > raw.len() {
                            return Ok(None);
                        }
                        if &raw[c + n..c + n + 2] != b"\r\n" {
                            return Err(ProtocolError::Invalid("missing CRLF after bulk string"));
                        }
                        let data = buf.slice(c..c + n);
                        *cursor = c + n + 2;
                        Ok(Some(RespValue::BulkString(Some(data))))
                    }
                }
            }
            b'*' | b'%' | b'~' | b'>' => {
                let mut c = *cursor;
                let n = match Self::read_integer_line(raw, &mut c, tag)? {
                    None => return Ok(None),
                    Some(n) => n,
                };
                if n < 0 {
                    *cursor = c;
                    return Ok(Some(RespValue::Array(None)));
                }
                let count = if tag == b'%' { n as usize * 2 } else { n as usize };
                let mut items = Vec::with_capacity(count.min(4096));
                for _ in 0..count {
                    match Self::decode_one(buf, raw, &mut c)? {
                        None => return Ok(None),
                        Some(v) => items.push(v),
                    }
                }
                *cursor = c;
                Ok(Some(match tag {
                    b'*' => RespValue::Array(Some(items)),
                    b'~' => RespValue::Set(items),
                    b'>' => RespValue::Push(items),
                    b'%' => {
                        let mut pairs = Vec::with_capacity(items.len() / 2);
                        let mut it = items.into_iter();
                        while let (Some(k), Some(v)) = (it.next(), it.next()) {
                            pairs.push((k, v));
                        }
                        RespValue::Map(pairs)
                    }
                    _ => unreachable!(),
                }))
            }
            _ => Err(ProtocolError::Invalid("unrecognized frame prefix")),
        }
    }

    fn find_crlf(raw: &[u8], from: usize) -> Option<usize> {
        let mut i = from;
        while i + 1 < raw.len() {
            if raw[i] == b'\r' && raw[i + 1] == b'\n' {
                return Some(i);
            }
            i += 1;
        }
        None
    }

    /// Reads the line starting at `*cursor + skip` up to (not including) the CRLF, returning
    /// the slice as `Bytes` and advancing `*cursor` past the CRLF.
    fn read_line(
        buf: &Bytes,
        raw: &[u8],
        cursor: &mut usize,
        skip: usize,
    ) -> Result<Option<Bytes>, ProtocolError> {
        match Self::find_crlf(raw, *cursor + skip) {
            None => Ok(None),
            Some(pos) => {
                let data = buf.slice(*cursor + skip..pos);
                *cursor = pos + 2;
                Ok(Some(data))
            }
        }
    }

    /// Reads a `<prefix><integer>\r\n` line starting at `*cursor`, advancing `*cursor` past it.
    fn read_integer_line(
        raw: &[u8],
        cursor: &mut usize,
        prefix: u8,
    ) -> Result<Option<i64>, ProtocolError> {
        if *cursor >= raw.len() || raw[*cursor] != prefix {
            return Err(ProtocolError::Invalid("unexpected frame prefix"));
        }
        match Self::find_crlf(raw, *cursor + 1) {
            None => Ok(None),
            Some(pos) => {
                let digits = &raw[*cursor + 1..pos];
                let s = std::str::from_utf8(digits)
                    .map_err(|_| ProtocolError::Invalid("non-utf8 length"))?;
                let n: i64 = s
                    .parse()
                    .map_err(|_| ProtocolError::Invalid("invalid length"))?;
                *cursor = pos + 2;
                Ok(Some(n))
            }
        }
    }

    fn parse_inline(buf: &Bytes, raw: &[u8]) -> Result<ParseOutcome, ProtocolError> {
        match Self::find_crlf(raw, 0) {
            None => {
                if raw.len() > 64 * 1024 {
                    return Err(ProtocolError::Invalid("inline request too long"));
                }
                Ok(ParseOutcome::Incomplete)
            }
            Some(pos) => {
                let line = &raw[..pos];
                let mut args = Vec::new();
                let mut i = 0;
                while i < line.len() {
                    while i < line.len() && line[i] == b' ' {
                        i += 1;
                    }
                    let start = i;
                    while i < line.len() && line[i] != b' ' {
                        i += 1;
                    }
                    if i > start {
                        args.push(buf.slice(start..i));
                    }
                }
                Ok(ParseOutcome::Request {
                    args,
                    consumed: pos + 2,
                })
            }
        }
    }

    fn parse_multibulk(buf: &Bytes, raw: &[u8]) -> Result<ParseOutcome, ProtocolError> {
        let mut cursor = 0usize;
        let nelem = match Self::read_integer_line(raw, &mut cursor, b'*')? {
            None => return Ok(ParseOutcome::Incomplete),
            Some(n) => n,
        };
        if nelem <= 0 {
            return Ok(ParseOutcome::Request {
                args: vec![],
                consumed: cursor,
            });
        }
        let nelem = nelem as usize;
        if nelem > 1024 * 1024 {
            return Err(ProtocolError::Invalid("request array too large"));
        }
        let mut args = Vec::with_capacity(nelem);
        for _ in 0..nelem {
            if cursor >= raw.len() {
                return Ok(ParseOutcome::Incomplete);
            }
            if raw[cursor] != b'$' {
                return Err(ProtocolError::Invalid("expected bulk string in request array"));
            }
            let len = match Self::read_integer_line(raw, &mut cursor, b'$')? {
                None => return Ok(ParseOutcome::Incomplete),
                Some(n) => n,
            };
            if len < 0 {
                args.push(Bytes::new());
                continue;
            }
            let len = len as usize;
            if cursor + len + 2 > raw.len() {
                return Ok(ParseOutcome::Incomplete);
            }
            if &raw[cursor + len..cursor + len + 2] != b"\r\n" {
                return Err(ProtocolError::Invalid("missing CRLF after bulk string"));
            }
            args.push(buf.slice(cursor..cursor + len));
            cursor += len + 2;
        }
        Ok(ParseOutcome::Request {
            args,
            consumed: cursor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_get() {
        let buf = Bytes::from_static(b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n");
        match Parser::parse(&buf).unwrap() {
            ParseOutcome::Request { args, consumed } => {
                assert_eq!(consumed, buf.len());
                assert_eq!(args, vec![Bytes::from_static(b"GET"), Bytes::from_static(b"k")]);
            }
            ParseOutcome::Incomplete => panic!("expected a full request"),
        }
    }

    #[test]
    fn reports_incomplete_on_partial_frame() {
        let buf = Bytes::from_static(b"*2\r\n$3\r\nGET\r\n$4\r\nkey");
        assert!(matches!(
            Parser::parse(&buf).unwrap(),
            ParseOutcome::Incomplete
        ));
    }

    #[test]
    fn parses_inline_command() {
        let buf = Bytes::from_static(b"PING\r\n");
        match Parser::parse(&buf).unwrap() {
            ParseOutcome::Request { args, consumed } => {
                assert_eq!(consumed, buf.len());
                assert_eq!(args, vec![Bytes::from_static(b"PING")]);
            }
            ParseOutcome::Incomplete => panic!("expected a full request"),
        }
    }

    #[test]
    fn decodes_null_bulk_and_null_array() {
        let buf = Bytes::from_static(b"$-1\r\n");
        match Parser::parse_value(&buf).unwrap() {
            ParseValueOutcome::Value { value, .. } => {
                assert_eq!(value, RespValue::BulkString(None));
            }
            ParseValueOutcome::Incomplete => panic!(),
        }
        let buf = Bytes::from_static(b"*-1\r\n");
        match Parser::parse_value(&buf).unwrap() {
            ParseValueOutcome::Value { value, .. } => {
                assert_eq!(value, RespValue::Array(None));
            }
            ParseValueOutcome::Incomplete => panic!(),
        }
    }
}
