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

use super::{
    error::{KeyError, KeyResult},
    zset::ZSet,
};
use crate::streams::Stream;
use std::collections::{HashMap, HashSet, VecDeque};

/// The polymorphic value is a tagged variant, not a trait object: per-type operations are
/// free functions keyed on the tag (`keyspace::memstore` and `commands::*`), and type guards
/// at the store boundary turn a tag mismatch into `WRONGTYPE` (§9 design note — no virtual
/// dispatch for the per-type payload).
#[derive(Debug, Clone)]
pub enum Value {
    Str(Vec<u8>),
    List(VecDeque<Vec<u8>>),
    Set(HashSet<Vec<u8>>),
    ZSet(ZSet),
    Hash(HashMap<Vec<u8>, Vec<u8>>),
    Stream(Stream),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    String,
    List,
    Set,
    ZSet,
    Hash,
    Stream,
}

impl TypeTag {
    pub const fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::List => "list",
            Self::Set => "set",
            Self::ZSet => "zset",
            Self::Hash => "hash",
            Self::Stream => "stream",
        }
    }
}

macro_rules! accessor {
    ($as_ref:ident, $as_mut:ident, $variant:ident, $ty:ty) => {
        pub fn $as_ref(&self) -> KeyResult<&$ty> {
            match self {
                Self::$variant(v) => Ok(v),
                _ => Err(KeyError::WrongType),
            }
        }
        pub fn $as_mut(&mut self) -> KeyResult<&mut $ty> {
            match self {
                Self::$variant(v) => Ok(v),
                _ => Err(KeyError::WrongType),
            }
        }
    };
}

impl Value {
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Self::Str(_) => TypeTag::String,
            Self::List(_) => TypeTag::List,
            Self::Set(_) => TypeTag::Set,
            Self::ZSet(_) => TypeTag::ZSet,
            Self::Hash(_) => TypeTag::Hash,
            Self::Stream(_) => TypeTag::Stream,
        }
    }

    /// Empty List/Set/Hash/ZSet values are never persisted (§3.3): the store checks this
    /// after every mutating op and deletes the key when it holds.
    pub fn is_empty_collection(&self) -> bool {
        match self {
            Self::List(l) => l.is_empty(),
            Self::Set(s) => s.is_empty(),
            Self::ZSet(z) => z.is_empty(),
            Self::Hash(h) => h.is_empty(),
            Self::Str(_) | Self::Stream(_) => false,
        }
    }

    accessor!(as_str, as_str_mut, Str, Vec<u8>);
    accessor!(as_list, as_list_mut, List, VecDeque<Vec<u8>>);
    accessor!(as_set, as_set_mut, Set, HashSet<Vec<u8>>);
    accessor!(as_zset, as_zset_mut, ZSet, ZSet);
    accessor!(as_hash, as_hash_mut, Hash, HashMap<Vec<u8>, Vec<u8>>);
    accessor!(as_stream, as_stream_mut, Stream, Stream);
}
