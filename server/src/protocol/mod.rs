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

//! The RESP2/RESP3 wire protocol: a streaming frame decoder (`parser`), a typed
//! response value and writer (`value`, `writer`), and nothing else — command
//! semantics live in `crate::commands`.

pub mod parser;
pub mod value;
pub mod writer;

pub use parser::{ParseOutcome, Parser};
pub use value::RespValue;
pub use writer::RespWriter;

/// Protocol epoch negotiated via `HELLO`. Default is RESP2 until a client sends `HELLO 3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    Resp2,
    Resp3,
}

impl ProtocolVersion {
    pub const fn is_resp3(self) -> bool {
        matches!(self, Self::Resp3)
    }
}

#[derive(Debug)]
pub enum ProtocolError {
    /// The frame was syntactically invalid; the connection should be killed
    Invalid(&'static str),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Invalid(msg) => write!(f, "Protocol error: {msg}"),
        }
    }
}

impl std::error::Error for ProtocolError {}
