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

//! The command descriptor table: one entry per surface command, hashed with 32-bit FNV-1a
//! (`util::fnv1a_32`). Lookup goes hash-bucket-then-name-compare rather than a straight string
//! match, so a dispatch miss on an unknown command is the only path that ever falls back to
//! scanning a bucket of more than one name.
//!
//! `commands::dispatch` uses a descriptor only for arity validation and alias resolution
//! (`canonical`); the actual handler call is a plain match in `commands::execute` keyed on
//! `canonical`, since a generic, per-connection `W: AsyncWrite` makes a literal table of
//! function pointers awkward without boxing every call — the hash table still does the real
//! dispatch work, just not through a stored fn pointer.

use crate::util::fnv1a_32;
use std::collections::HashMap;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Generic,
    Connection,
    Server,
    String,
    Bitmap,
    List,
    Set,
    Hash,
    ZSet,
    Stream,
    PubSub,
    Transaction,
}

impl Category {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::Connection => "connection",
            Self::Server => "server",
            Self::String => "string",
            Self::Bitmap => "bitmap",
            Self::List => "list",
            Self::Set => "set",
            Self::Hash => "hash",
            Self::ZSet => "sortedset",
            Self::Stream => "stream",
            Self::PubSub => "pubsub",
            Self::Transaction => "transaction",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CommandDescriptor {
    /// The name a client actually sends.
    pub name: &'static str,
    /// The name `commands::execute` matches on. Equal to `name` except for aliases
    /// (`UNLINK` -> `DEL`).
    pub canonical: &'static str,
    /// Minimum argument count, not counting the command name itself.
    pub min_args: i64,
    /// Maximum argument count, not counting the command name itself. `-1` means unbounded.
    pub max_args: i64,
    pub modifies_data: bool,
    pub category: Category,
}

macro_rules! cmd {
    ($name:expr, $canon:expr, $min:expr, $max:expr, $modifies:expr, $cat:ident) => {
        CommandDescriptor {
            name: $name,
            canonical: $canon,
            min_args: $min,
            max_args: $max,
            modifies_data: $modifies,
            category: Category::$cat,
        }
    };
}

/// The full command surface, one row per command (aliases get their own row pointing at the
/// same `canonical`).
const DESCRIPTORS: &[CommandDescriptor] = &[
    // generic
    cmd!("DEL", "DEL", 1, -1, true, Generic),
    cmd!("DELETE", "DEL", 1, -1, true, Generic),
    cmd!("UNLINK", "DEL", 1, -1, true, Generic),
    cmd!("EXISTS", "EXISTS", 1, -1, false, Generic),
    cmd!("TYPE", "TYPE", 1, 1, false, Generic),
    cmd!("EXPIRE", "EXPIRE", 2, 3, true, Generic),
    cmd!("PEXPIRE", "PEXPIRE", 2, 3, true, Generic),
    cmd!("EXPIREAT", "EXPIREAT", 2, 3, true, Generic),
    cmd!("PEXPIREAT", "PEXPIREAT", 2, 3, true, Generic),
    cmd!("PERSIST", "PERSIST", 1, 1, true, Generic),
    cmd!("TTL", "TTL", 1, 1, false, Generic),
    cmd!("PTTL", "PTTL", 1, 1, false, Generic),
    cmd!("KEYS", "KEYS", 1, 1, false, Generic),
    cmd!("RANDOMKEY", "RANDOMKEY", 0, 0, false, Generic),
    cmd!("RENAME", "RENAME", 2, 2, true, Generic),
    cmd!("RENAMENX", "RENAMENX", 2, 2, true, Generic),
    cmd!("COPY", "COPY", 2, 3, true, Generic),
    cmd!("DBSIZE", "DBSIZE", 0, 0, false, Generic),
    cmd!("FLUSHDB", "FLUSHDB", 0, 1, true, Generic),
    cmd!("FLUSHALL", "FLUSHALL", 0, 1, true, Generic),
    cmd!("SCAN", "SCAN", 1, 5, false, Generic),
    cmd!("SWAPDB", "SWAPDB", 2, 2, true, Generic),
    // connection
    cmd!("PING", "PING", 0, 1, false, Connection),
    cmd!("ECHO", "ECHO", 1, 1, false, Connection),
    cmd!("SELECT", "SELECT", 1, 1, false, Connection),
    cmd!("HELLO", "HELLO", 0, -1, false, Connection),
    cmd!("HI", "HELLO", 0, -1, false, Connection),
    cmd!("AUTH", "AUTH", 1, 2, false, Connection),
    cmd!("CLIENT", "CLIENT", 1, -1, false, Connection),
    cmd!("QUIT", "QUIT", 0, 0, false, Connection),
    cmd!("EXIT", "QUIT", 0, 0, false, Connection),
    cmd!("RESET", "RESET", 0, 0, false, Connection),
    // server
    cmd!("INFO", "INFO", 0, 1, false, Server),
    cmd!("COMMAND", "COMMAND", 0, -1, false, Server),
    cmd!("LASTSAVE", "LASTSAVE", 0, 0, false, Server),
    cmd!("TIME", "TIME", 0, 0, false, Server),
    cmd!("WAIT", "WAIT", 2, 2, false, Server),
    // string
    cmd!("GET", "GET", 1, 1, false, String),
    cmd!("SET", "SET", 2, -1, true, String),
    cmd!("SETNX", "SETNX", 2, 2, true, String),
    cmd!("SETEX", "SETEX", 3, 3, true, String),
    cmd!("PSETEX", "PSETEX", 3, 3, true, String),
    cmd!("GETSET", "GETSET", 2, 2, true, String),
    cmd!("GETDEL", "GETDEL", 1, 1, true, String),
    cmd!("GETEX", "GETEX", 1, -1, true, String),
    cmd!("APPEND", "APPEND", 2, 2, true, String),
    cmd!("STRLEN", "STRLEN", 1, 1, false, String),
    cmd!("INCR", "INCR", 1, 1, true, String),
    cmd!("DECR", "DECR", 1, 1, true, String),
    cmd!("INCRBY", "INCRBY", 2, 2, true, String),
    cmd!("DECRBY", "DECRBY", 2, 2, true, String),
    cmd!("INCRBYFLOAT", "INCRBYFLOAT", 2, 2, true, String),
    cmd!("MGET", "MGET", 1, -1, false, String),
    cmd!("MSET", "MSET", 2, -1, true, String),
    cmd!("MSETNX", "MSETNX", 2, -1, true, String),
    cmd!("SETRANGE", "SETRANGE", 3, 3, true, String),
    cmd!("GETRANGE", "GETRANGE", 3, 3, false, String),
    // bitmap
    cmd!("SETBIT", "SETBIT", 3, 3, true, Bitmap),
    cmd!("GETBIT", "GETBIT", 2, 2, false, Bitmap),
    cmd!("BITCOUNT", "BITCOUNT", 1, 4, false, Bitmap),
    cmd!("BITPOS", "BITPOS", 2, 5, false, Bitmap),
    cmd!("BITOP", "BITOP", 3, -1, true, Bitmap),
    cmd!("BITFIELD", "BITFIELD", 1, -1, true, Bitmap),
    // list
    cmd!("LPUSH", "LPUSH", 2, -1, true, List),
    cmd!("RPUSH", "RPUSH", 2, -1, true, List),
    cmd!("LPUSHX", "LPUSHX", 2, -1, true, List),
    cmd!("RPUSHX", "RPUSHX", 2, -1, true, List),
    cmd!("LPOP", "LPOP", 1, 2, true, List),
    cmd!("RPOP", "RPOP", 1, 2, true, List),
    cmd!("LLEN", "LLEN", 1, 1, false, List),
    cmd!("LRANGE", "LRANGE", 3, 3, false, List),
    cmd!("LINDEX", "LINDEX", 2, 2, false, List),
    cmd!("LSET", "LSET", 3, 3, true, List),
    cmd!("LINSERT", "LINSERT", 4, 4, true, List),
    cmd!("LREM", "LREM", 3, 3, true, List),
    cmd!("LTRIM", "LTRIM", 3, 3, true, List),
    cmd!("RPOPLPUSH", "RPOPLPUSH", 2, 2, true, List),
    cmd!("LMOVE", "LMOVE", 4, 4, true, List),
    cmd!("BLPOP", "BLPOP", 2, -1, true, List),
    cmd!("BRPOP", "BRPOP", 2, -1, true, List),
    cmd!("BLMOVE", "BLMOVE", 5, 5, true, List),
    // set
    cmd!("SADD", "SADD", 2, -1, true, Set),
    cmd!("SREM", "SREM", 2, -1, true, Set),
    cmd!("SISMEMBER", "SISMEMBER", 2, 2, false, Set),
    cmd!("SMISMEMBER", "SMISMEMBER", 2, -1, false, Set),
    cmd!("SMEMBERS", "SMEMBERS", 1, 1, false, Set),
    cmd!("SCARD", "SCARD", 1, 1, false, Set),
    cmd!("SPOP", "SPOP", 1, 2, true, Set),
    cmd!("SRANDMEMBER", "SRANDMEMBER", 1, 2, false, Set),
    cmd!("SUNION", "SUNION", 1, -1, false, Set),
    cmd!("SUNIONSTORE", "SUNIONSTORE", 2, -1, true, Set),
    cmd!("SINTER", "SINTER", 1, -1, false, Set),
    cmd!("SINTERSTORE", "SINTERSTORE", 2, -1, true, Set),
    cmd!("SDIFF", "SDIFF", 1, -1, false, Set),
    cmd!("SDIFFSTORE", "SDIFFSTORE", 2, -1, true, Set),
    cmd!("SMOVE", "SMOVE", 3, 3, true, Set),
    // hash
    cmd!("HSET", "HSET", 3, -1, true, Hash),
    cmd!("HSETNX", "HSETNX", 3, 3, true, Hash),
    cmd!("HGET", "HGET", 2, 2, false, Hash),
    cmd!("HMGET", "HMGET", 2, -1, false, Hash),
    cmd!("HMSET", "HMSET", 3, -1, true, Hash),
    cmd!("HDEL", "HDEL", 2, -1, true, Hash),
    cmd!("HLEN", "HLEN", 1, 1, false, Hash),
    cmd!("HEXISTS", "HEXISTS", 2, 2, false, Hash),
    cmd!("HGETALL", "HGETALL", 1, 1, false, Hash),
    cmd!("HKEYS", "HKEYS", 1, 1, false, Hash),
    cmd!("HVALS", "HVALS", 1, 1, false, Hash),
    cmd!("HINCRBY", "HINCRBY", 3, 3, true, Hash),
    cmd!("HINCRBYFLOAT", "HINCRBYFLOAT", 3, 3, true, Hash),
    cmd!("HRANDFIELD", "HRANDFIELD", 1, 3, false, Hash),
    // zset
    cmd!("ZADD", "ZADD", 3, -1, true, ZSet),
    cmd!("ZREM", "ZREM", 2, -1, true, ZSet),
    cmd!("ZSCORE", "ZSCORE", 2, 2, false, ZSet),
    cmd!("ZMSCORE", "ZMSCORE", 2, -1, false, ZSet),
    cmd!("ZCARD", "ZCARD", 1, 1, false, ZSet),
    cmd!("ZCOUNT", "ZCOUNT", 3, 3, false, ZSet),
    cmd!("ZINCRBY", "ZINCRBY", 3, 3, true, ZSet),
    cmd!("ZRANGE", "ZRANGE", 3, 4, false, ZSet),
    cmd!("ZREVRANGE", "ZREVRANGE", 3, 4, false, ZSet),
    cmd!("ZRANGEBYSCORE", "ZRANGEBYSCORE", 3, 8, false, ZSet),
    cmd!("ZREVRANGEBYSCORE", "ZREVRANGEBYSCORE", 3, 8, false, ZSet),
    cmd!("ZRANK", "ZRANK", 2, 2, false, ZSet),
    cmd!("ZREVRANK", "ZREVRANK", 2, 2, false, ZSet),
    cmd!("ZREMRANGEBYRANK", "ZREMRANGEBYRANK", 3, 3, true, ZSet),
    cmd!("ZREMRANGEBYSCORE", "ZREMRANGEBYSCORE", 3, 3, true, ZSet),
    cmd!("BZPOPMIN", "BZPOPMIN", 2, -1, true, ZSet),
    cmd!("BZPOPMAX", "BZPOPMAX", 2, -1, true, ZSet),
    // stream
    cmd!("XADD", "XADD", 4, -1, true, Stream),
    cmd!("XLEN", "XLEN", 1, 1, false, Stream),
    cmd!("XRANGE", "XRANGE", 3, 5, false, Stream),
    cmd!("XREVRANGE", "XREVRANGE", 3, 5, false, Stream),
    cmd!("XREAD", "XREAD", 3, -1, false, Stream),
    cmd!("XREADGROUP", "XREADGROUP", 6, -1, true, Stream),
    cmd!("XACK", "XACK", 3, -1, true, Stream),
    cmd!("XCLAIM", "XCLAIM", 5, -1, true, Stream),
    cmd!("XPENDING", "XPENDING", 2, 8, false, Stream),
    cmd!("XINFO", "XINFO", 2, 3, false, Stream),
    cmd!("XGROUP", "XGROUP", 2, -1, true, Stream),
    cmd!("XDEL", "XDEL", 2, -1, true, Stream),
    cmd!("XTRIM", "XTRIM", 3, -1, true, Stream),
    // pub/sub
    cmd!("SUBSCRIBE", "SUBSCRIBE", 1, -1, false, PubSub),
    cmd!("UNSUBSCRIBE", "UNSUBSCRIBE", 0, -1, false, PubSub),
    cmd!("PSUBSCRIBE", "PSUBSCRIBE", 1, -1, false, PubSub),
    cmd!("PUNSUBSCRIBE", "PUNSUBSCRIBE", 0, -1, false, PubSub),
    cmd!("PUBLISH", "PUBLISH", 2, 2, false, PubSub),
    cmd!("PUBSUB", "PUBSUB", 1, -1, false, PubSub),
    // transaction
    cmd!("MULTI", "MULTI", 0, 0, false, Transaction),
    cmd!("EXEC", "EXEC", 0, 0, false, Transaction),
    cmd!("DISCARD", "DISCARD", 0, 0, false, Transaction),
    cmd!("WATCH", "WATCH", 1, -1, false, Transaction),
    cmd!("UNWATCH", "UNWATCH", 0, 0, false, Transaction),
];

fn build_table() -> HashMap<u32, Vec<CommandDescriptor>> {
    let mut table: HashMap<u32, Vec<CommandDescriptor>> = HashMap::with_capacity(DESCRIPTORS.len());
    for d in DESCRIPTORS {
        table.entry(fnv1a_32(d.name.as_bytes())).or_default().push(*d);
    }
    table
}

fn table() -> &'static HashMap<u32, Vec<CommandDescriptor>> {
    static TABLE: OnceLock<HashMap<u32, Vec<CommandDescriptor>>> = OnceLock::new();
    TABLE.get_or_init(build_table)
}

/// Resolves a wire command name to its descriptor: hash the (case-folded) name, then confirm
/// with a name comparison against whatever landed in that bucket (almost always exactly one
/// entry).
pub fn lookup(name: &[u8]) -> Option<&'static CommandDescriptor> {
    let hash = fnv1a_32(name);
    table()
        .get(&hash)?
        .iter()
        .find(|d| d.name.as_bytes().eq_ignore_ascii_case(name))
}

pub fn count() -> usize {
    DESCRIPTORS.len()
}

pub fn all() -> &'static [CommandDescriptor] {
    DESCRIPTORS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_resolves_to_canonical() {
        let d = lookup(b"unlink").unwrap();
        assert_eq!(d.canonical, "DEL");
        assert_eq!(lookup(b"delete").unwrap().canonical, "DEL");
        assert_eq!(lookup(b"exit").unwrap().canonical, "QUIT");
        assert_eq!(lookup(b"hi").unwrap().canonical, "HELLO");
    }

    #[test]
    fn unknown_command_is_absent() {
        assert!(lookup(b"NOTACOMMAND").is_none());
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert!(lookup(b"get").is_some());
        assert!(lookup(b"GeT").is_some());
    }
}
