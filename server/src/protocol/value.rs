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

use bytes::Bytes;

/// A decoded RESP value. Only the decoder produces these; the response side writes directly
/// through `RespWriter` without materializing a value tree (see §4.1 framing rules).
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    SimpleString(Bytes),
    Error(Bytes),
    Integer(i64),
    BulkString(Option<Bytes>),
    Array(Option<Vec<RespValue>>),
    Map(Vec<(RespValue, RespValue)>),
    Set(Vec<RespValue>),
    Push(Vec<RespValue>),
    Boolean(bool),
    Double(f64),
    BigNumber(Bytes),
    Null,
}

impl RespValue {
    /// A client request is always an array of bulk strings (or, exceptionally, an inline
    /// command split on whitespace). This extracts that shape for command dispatch.
    pub fn into_command_args(self) -> Option<Vec<Bytes>> {
        match self {
            RespValue::Array(Some(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        RespValue::BulkString(Some(b)) => out.push(b),
                        RespValue::SimpleString(b) => out.push(b),
                        _ => return None,
                    }
                }
                Some(out)
            }
            _ => None,
        }
    }
}
