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

//! Command dispatch (§4.2, §4.6): looks a wire command name up in [`registry`], validates its
//! arity, and routes to the per-category handler module. Handlers themselves never touch the
//! registry — `execute` is the single place that knows the mapping from canonical name to
//! handler function.

pub mod bitmap;
pub mod connection;
pub mod context;
pub mod generic;
pub mod hashes;
pub mod lists;
pub mod pubsub;
pub mod registry;
pub mod server;
pub mod sets;
pub mod streams;
pub mod strings;
pub mod transaction;
pub mod zsets;

pub use context::{CommandContext, ConnectionState, Engine, QueuedCommand, SubscriptionMode, TransactionState};

use crate::keyspace::error::KeyError;
use crate::protocol::RespWriter;
use bytes::Bytes;
use std::io;
use tokio::io::AsyncWrite;

/// Case-insensitive ASCII comparison between a wire argument and a literal keyword.
pub fn eq_ci(b: &[u8], s: &str) -> bool {
    b.eq_ignore_ascii_case(s.as_bytes())
}

pub fn parse_i64(b: &[u8]) -> Result<i64, KeyError> {
    std::str::from_utf8(b)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(KeyError::NotInteger)
}

pub fn parse_f64(b: &[u8]) -> Result<f64, KeyError> {
    std::str::from_utf8(b)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(KeyError::NotFloat)
}

pub async fn reply_key_error<W: AsyncWrite + Unpin>(writer: &mut RespWriter<W>, e: KeyError) -> io::Result<()> {
    writer.write_error(e.message()).await
}

pub async fn wrong_args<W: AsyncWrite + Unpin>(writer: &mut RespWriter<W>, name: &str) -> io::Result<()> {
    writer
        .write_error(&format!("ERR wrong number of arguments for '{}' command", name.to_ascii_lowercase()))
        .await
}

/// Writes a RESP array of bulk strings, with `None` entries rendered as the null bulk string
/// (used by `MGET` and similar fan-out reads where individual keys can be absent).
pub async fn write_bulk_array<W: AsyncWrite + Unpin>(
    writer: &mut RespWriter<W>,
    items: &[Option<Vec<u8>>],
) -> io::Result<()> {
    writer.write_array_header(items.len() as i64).await?;
    for item in items {
        writer.write_bulk(item.as_deref()).await?;
    }
    Ok(())
}

/// Writes a RESP array of bulk strings where every entry is present (`SMEMBERS`, `HKEYS`, ...).
pub async fn write_bytes_array<W: AsyncWrite + Unpin>(
    writer: &mut RespWriter<W>,
    items: &[Vec<u8>],
) -> io::Result<()> {
    writer.write_array_header(items.len() as i64).await?;
    for item in items {
        writer.write_bulk(Some(item)).await?;
    }
    Ok(())
}

/// Looks `name` up in the registry, validates its arity against `args` (which never includes
/// the command name itself), and dispatches to its handler. Unknown commands and arity
/// mismatches are both terminal for this one request, not the connection.
pub async fn dispatch<W: AsyncWrite + Unpin>(
    ctx: &mut CommandContext<'_, W>,
    name: &[u8],
    args: &[Bytes],
) -> io::Result<()> {
    let Some(descriptor) = registry::lookup(name) else {
        let rendered = String::from_utf8_lossy(name);
        return ctx
            .writer
            .write_error(&format!("ERR unknown command '{}'", rendered))
            .await;
    };
    let n = args.len() as i64;
    let arity_ok = n >= descriptor.min_args && (descriptor.max_args < 0 || n <= descriptor.max_args);
    if !arity_ok {
        return wrong_args(ctx.writer, descriptor.name).await;
    }
    execute(ctx, descriptor.canonical, args).await
}

/// The actual handler table, keyed on the descriptor's canonical name. Kept as one big `match`
/// rather than a table of function pointers — see `registry`'s doc comment for why.
async fn execute<W: AsyncWrite + Unpin>(
    ctx: &mut CommandContext<'_, W>,
    canonical: &str,
    args: &[Bytes],
) -> io::Result<()> {
    use generic::ExpireUnit as GenUnit;
    use strings::ExpireUnit as StrUnit;

    match canonical {
        // generic
        "DEL" => generic::del(ctx, args).await,
        "EXISTS" => generic::exists(ctx, args).await,
        "TYPE" => generic::type_of(ctx, args).await,
        "EXPIRE" => generic::expire(ctx, args, GenUnit::Seconds, false).await,
        "PEXPIRE" => generic::expire(ctx, args, GenUnit::Millis, false).await,
        "EXPIREAT" => generic::expire(ctx, args, GenUnit::Seconds, true).await,
        "PEXPIREAT" => generic::expire(ctx, args, GenUnit::Millis, true).await,
        "PERSIST" => generic::persist(ctx, args).await,
        "TTL" => generic::ttl(ctx, args, GenUnit::Seconds).await,
        "PTTL" => generic::ttl(ctx, args, GenUnit::Millis).await,
        "KEYS" => generic::keys(ctx, args).await,
        "RANDOMKEY" => generic::randomkey(ctx, args).await,
        "RENAME" => generic::rename(ctx, args, false).await,
        "RENAMENX" => generic::rename(ctx, args, true).await,
        "COPY" => generic::copy(ctx, args).await,
        "DBSIZE" => generic::dbsize(ctx, args).await,
        "FLUSHDB" => generic::flushdb(ctx, args).await,
        "FLUSHALL" => generic::flushall(ctx, args).await,
        "SCAN" => generic::scan(ctx, args).await,
        "SWAPDB" => generic::swapdb(ctx, args).await,

        // connection
        "PING" => connection::ping(ctx, args).await,
        "ECHO" => connection::echo(ctx, args).await,
        "SELECT" => connection::select(ctx, args).await,
        "HELLO" => connection::hello(ctx, args).await,
        "AUTH" => connection::auth(ctx, args).await,
        "CLIENT" => connection::client(ctx, args).await,
        "QUIT" => connection::quit(ctx, args).await,
        "RESET" => connection::reset(ctx, args).await,

        // server
        "INFO" => server::info(ctx, args).await,
        "COMMAND" => server::command(ctx, args).await,
        "LASTSAVE" => server::lastsave(ctx, args).await,
        "TIME" => server::time(ctx, args).await,
        "WAIT" => server::wait(ctx, args).await,

        // string
        "GET" => strings::get(ctx, args).await,
        "SET" => strings::set(ctx, args).await,
        "SETNX" => strings::setnx(ctx, args).await,
        "SETEX" => strings::setex(ctx, args, StrUnit::Seconds).await,
        "PSETEX" => strings::setex(ctx, args, StrUnit::Millis).await,
        "GETSET" => strings::getset(ctx, args).await,
        "GETDEL" => strings::getdel(ctx, args).await,
        "GETEX" => strings::getex(ctx, args).await,
        "APPEND" => strings::append(ctx, args).await,
        "STRLEN" => strings::strlen(ctx, args).await,
        "INCR" => strings::incrby(ctx, args, 1).await,
        "DECR" => strings::incrby(ctx, args, -1).await,
        "INCRBY" => strings::incrby_arg(ctx, args, 1).await,
        "DECRBY" => strings::incrby_arg(ctx, args, -1).await,
        "INCRBYFLOAT" => strings::incrbyfloat(ctx, args).await,
        "MGET" => strings::mget(ctx, args).await,
        "MSET" => strings::mset(ctx, args, false).await,
        "MSETNX" => strings::mset(ctx, args, true).await,
        "SETRANGE" => strings::setrange(ctx, args).await,
        "GETRANGE" => strings::getrange(ctx, args).await,

        // bitmap
        "SETBIT" => bitmap::setbit(ctx, args).await,
        "GETBIT" => bitmap::getbit(ctx, args).await,
        "BITCOUNT" => bitmap::bitcount(ctx, args).await,
        "BITPOS" => bitmap::bitpos(ctx, args).await,
        "BITOP" => bitmap::bitop(ctx, args).await,
        "BITFIELD" => bitmap::bitfield(ctx, args).await,

        // list
        "LPUSH" => lists::push(ctx, args, true, false).await,
        "RPUSH" => lists::push(ctx, args, false, false).await,
        "LPUSHX" => lists::push(ctx, args, true, true).await,
        "RPUSHX" => lists::push(ctx, args, false, true).await,
        "LPOP" => lists::pop(ctx, args, true).await,
        "RPOP" => lists::pop(ctx, args, false).await,
        "LLEN" => lists::llen(ctx, args).await,
        "LRANGE" => lists::lrange(ctx, args).await,
        "LINDEX" => lists::lindex(ctx, args).await,
        "LSET" => lists::lset(ctx, args).await,
        "LINSERT" => lists::linsert(ctx, args).await,
        "LREM" => lists::lrem(ctx, args).await,
        "LTRIM" => lists::ltrim(ctx, args).await,
        "RPOPLPUSH" => lists::rpoplpush(ctx, args).await,
        "LMOVE" => lists::lmove(ctx, args).await,
        "BLPOP" => lists::bpop(ctx, args, true).await,
        "BRPOP" => lists::bpop(ctx, args, false).await,
        "BLMOVE" => lists::blmove(ctx, args).await,

        // set
        "SADD" => sets::sadd(ctx, args).await,
        "SREM" => sets::srem(ctx, args).await,
        "SISMEMBER" => sets::sismember(ctx, args).await,
        "SMISMEMBER" => sets::smismember(ctx, args).await,
        "SMEMBERS" => sets::smembers(ctx, args).await,
        "SCARD" => sets::scard(ctx, args).await,
        "SPOP" => sets::spop(ctx, args).await,
        "SRANDMEMBER" => sets::srandmember(ctx, args).await,
        "SUNION" => sets::setop(ctx, args, sets::SetOp::Union, false).await,
        "SUNIONSTORE" => sets::setop(ctx, args, sets::SetOp::Union, true).await,
        "SINTER" => sets::setop(ctx, args, sets::SetOp::Inter, false).await,
        "SINTERSTORE" => sets::setop(ctx, args, sets::SetOp::Inter, true).await,
        "SDIFF" => sets::setop(ctx, args, sets::SetOp::Diff, false).await,
        "SDIFFSTORE" => sets::setop(ctx, args, sets::SetOp::Diff, true).await,
        "SMOVE" => sets::smove(ctx, args).await,

        // hash
        "HSET" => hashes::hset(ctx, args, false).await,
        "HSETNX" => hashes::hsetnx(ctx, args).await,
        "HGET" => hashes::hget(ctx, args).await,
        "HMGET" => hashes::hmget(ctx, args).await,
        "HMSET" => hashes::hset(ctx, args, true).await,
        "HDEL" => hashes::hdel(ctx, args).await,
        "HLEN" => hashes::hlen(ctx, args).await,
        "HEXISTS" => hashes::hexists(ctx, args).await,
        "HGETALL" => hashes::hgetall(ctx, args).await,
        "HKEYS" => hashes::hkeys(ctx, args).await,
        "HVALS" => hashes::hvals(ctx, args).await,
        "HINCRBY" => hashes::hincrby(ctx, args).await,
        "HINCRBYFLOAT" => hashes::hincrbyfloat(ctx, args).await,
        "HRANDFIELD" => hashes::hrandfield(ctx, args).await,

        // zset
        "ZADD" => zsets::zadd(ctx, args).await,
        "ZREM" => zsets::zrem(ctx, args).await,
        "ZSCORE" => zsets::zscore(ctx, args).await,
        "ZMSCORE" => zsets::zmscore(ctx, args).await,
        "ZCARD" => zsets::zcard(ctx, args).await,
        "ZCOUNT" => zsets::zcount(ctx, args).await,
        "ZINCRBY" => zsets::zincrby(ctx, args).await,
        "ZRANGE" => zsets::zrange(ctx, args, false).await,
        "ZREVRANGE" => zsets::zrange(ctx, args, true).await,
        "ZRANGEBYSCORE" => zsets::zrangebyscore(ctx, args, false).await,
        "ZREVRANGEBYSCORE" => zsets::zrangebyscore(ctx, args, true).await,
        "ZRANK" => zsets::zrank(ctx, args, false).await,
        "ZREVRANK" => zsets::zrank(ctx, args, true).await,
        "ZREMRANGEBYRANK" => zsets::zremrangebyrank(ctx, args).await,
        "ZREMRANGEBYSCORE" => zsets::zremrangebyscore(ctx, args).await,
        "BZPOPMIN" => zsets::bzpop(ctx, args, true).await,
        "BZPOPMAX" => zsets::bzpop(ctx, args, false).await,

        // stream
        "XADD" => streams::xadd(ctx, args).await,
        "XLEN" => streams::xlen(ctx, args).await,
        "XRANGE" => streams::xrange(ctx, args, false).await,
        "XREVRANGE" => streams::xrange(ctx, args, true).await,
        "XREAD" => streams::xread(ctx, args).await,
        "XREADGROUP" => streams::xreadgroup(ctx, args).await,
        "XACK" => streams::xack(ctx, args).await,
        "XCLAIM" => streams::xclaim(ctx, args).await,
        "XPENDING" => streams::xpending(ctx, args).await,
        "XINFO" => streams::xinfo(ctx, args).await,
        "XGROUP" => streams::xgroup(ctx, args).await,
        "XDEL" => streams::xdel(ctx, args).await,
        "XTRIM" => streams::xtrim(ctx, args).await,

        // pub/sub
        "SUBSCRIBE" => pubsub::subscribe(ctx, args).await,
        "UNSUBSCRIBE" => pubsub::unsubscribe(ctx, args).await,
        "PSUBSCRIBE" => pubsub::psubscribe(ctx, args).await,
        "PUNSUBSCRIBE" => pubsub::punsubscribe(ctx, args).await,
        "PUBLISH" => pubsub::publish(ctx, args).await,
        "PUBSUB" => pubsub::pubsub(ctx, args).await,

        // transaction
        "MULTI" => transaction::multi(ctx, args).await,
        "EXEC" => transaction::exec(ctx, args).await,
        "DISCARD" => transaction::discard(ctx, args).await,
        "WATCH" => transaction::watch(ctx, args).await,
        "UNWATCH" => transaction::unwatch(ctx, args).await,

        _ => unreachable!("registry and execute() have drifted out of sync for {canonical}"),
    }
}
