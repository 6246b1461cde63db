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

/// Domain errors produced by the typed keyspace. These are distinct from the process-level
/// `util::error::Error`: every variant here has a fixed, specified RESP error rendering
/// (§7), so command handlers map them directly rather than routing them through `?` chains
/// meant for I/O failures.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyError {
    WrongType,
    NotInteger,
    NotFloat,
    OutOfRange,
    SyntaxError,
    NoSuchKey,
    /// `XADD` with an explicit ID that does not strictly advance the stream's `last_id` (§3.3,
    /// §4.5.1).
    StreamIdTooSmall,
    /// `XGROUP CREATE` on a group name that already exists on the stream.
    BusyGroup,
}

impl KeyError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::WrongType => {
                "WRONGTYPE Operation against a key holding the wrong kind of value"
            }
            Self::NotInteger => "ERR value is not an integer or out of range",
            Self::NotFloat => "ERR value is not a valid float",
            Self::OutOfRange => "ERR index out of range",
            Self::SyntaxError => "ERR syntax error",
            Self::NoSuchKey => "ERR no such key",
            Self::StreamIdTooSmall => {
                "ERR The ID specified in XADD is equal or smaller than the target stream top item"
            }
            Self::BusyGroup => "BUSYGROUP Consumer Group name already exists",
        }
    }
}

pub type KeyResult<T> = Result<T, KeyError>;
