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

//! Key-space-wide commands that don't care about a key's type (§4.6 GENERIC).

use super::{eq_ci, parse_i64, reply_key_error, CommandContext};
use crate::keyspace::{error::KeyError, memstore::wall_deadline_to_instant};
use bytes::Bytes;
use std::{
    io,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tokio::io::AsyncWrite;

pub async fn del<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let keys: Vec<Vec<u8>> = args.iter().map(|a| a.to_vec()).collect();
    let removed = ctx.db().del(&keys);
    if removed > 0 {
        ctx.wal_append(b"DEL", args);
    }
    ctx.writer.write_integer(removed as i64).await
}

pub async fn exists<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let db = ctx.db();
    let n = args.iter().filter(|k| db.exists(k)).count();
    ctx.writer.write_integer(n as i64).await
}

pub async fn type_of<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    match ctx.db().type_of(&args[0]) {
        Some(tag) => ctx.writer.write_simple_string(tag.name()).await,
        None => ctx.writer.write_simple_string("none").await,
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ExpireUnit {
    Seconds,
    Millis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExpireFlag {
    None,
    Nx,
    Xx,
    Gt,
    Lt,
}

fn parse_flag(b: &[u8]) -> Option<ExpireFlag> {
    if eq_ci(b, "NX") {
        Some(ExpireFlag::Nx)
    } else if eq_ci(b, "XX") {
        Some(ExpireFlag::Xx)
    } else if eq_ci(b, "GT") {
        Some(ExpireFlag::Gt)
    } else if eq_ci(b, "LT") {
        Some(ExpireFlag::Lt)
    } else {
        None
    }
}

/// Shared implementation of `EXPIRE`/`PEXPIRE`/`EXPIREAT`/`PEXPIREAT`. `absolute` means the
/// numeric argument is a Unix timestamp rather than a relative duration; `unit` is whether that
/// number is in seconds or milliseconds either way.
pub async fn expire<W: AsyncWrite + Unpin>(
    ctx: &mut CommandContext<'_, W>,
    args: &[Bytes],
    unit: ExpireUnit,
    absolute: bool,
) -> io::Result<()> {
    let key = &args[0];
    let n = match parse_i64(&args[1]) {
        Ok(n) => n,
        Err(e) => return reply_key_error(ctx.writer, e).await,
    };
    let flag = if args.len() > 2 {
        match parse_flag(&args[2]) {
            Some(f) => f,
            None => return reply_key_error(ctx.writer, KeyError::SyntaxError).await,
        }
    } else {
        ExpireFlag::None
    };

    let db = ctx.db();
    if !db.exists(key) {
        return ctx.writer.write_integer(0).await;
    }

    let target_wall = if absolute {
        match unit {
            ExpireUnit::Seconds => UNIX_EPOCH + Duration::from_millis(n.max(0) as u64 * 1000),
            ExpireUnit::Millis => UNIX_EPOCH + Duration::from_millis(n.max(0) as u64),
        }
    } else {
        let dur = match unit {
            ExpireUnit::Seconds => Duration::from_secs(n.max(0) as u64),
            ExpireUnit::Millis => Duration::from_millis(n.max(0) as u64),
        };
        SystemTime::now() + dur
    };

    if flag != ExpireFlag::None {
        let current = db.ttl(key); // Some(None) = persistent, Some(Some(d)) = has ttl, None = absent (already checked)
        let allowed = match flag {
            ExpireFlag::None => true,
            ExpireFlag::Nx => matches!(current, Some(None)),
            ExpireFlag::Xx => matches!(current, Some(Some(_))),
            ExpireFlag::Gt => match current {
                Some(Some(remaining)) => target_wall > SystemTime::now() + remaining,
                _ => false,
            },
            ExpireFlag::Lt => match current {
                Some(Some(remaining)) => target_wall < SystemTime::now() + remaining,
                // A persistent key has no TTL, i.e. +inf; any finite expiry is less than that.
                Some(None) => true,
                None => false,
            },
        };
        if !allowed {
            return ctx.writer.write_integer(0).await;
        }
    }

    let deadline = wall_deadline_to_instant(target_wall);
    let applied = db.expire_at(key, deadline);
    if applied {
        let epoch_ms = target_wall
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        ctx.wal_append(
            b"PEXPIREAT",
            &[key.clone(), Bytes::from(epoch_ms.to_string())],
        );
    }
    ctx.writer.write_integer(applied as i64).await
}

pub async fn persist<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let persisted = ctx.db().persist(&args[0]);
    if persisted {
        ctx.wal_append(b"PERSIST", args);
    }
    ctx.writer.write_integer(persisted as i64).await
}

pub async fn ttl<W: AsyncWrite + Unpin>(
    ctx: &mut CommandContext<'_, W>,
    args: &[Bytes],
    unit: ExpireUnit,
) -> io::Result<()> {
    match ctx.db().ttl(&args[0]) {
        None => ctx.writer.write_integer(-2).await,
        Some(None) => ctx.writer.write_integer(-1).await,
        Some(Some(remaining)) => {
            let n = match unit {
                ExpireUnit::Seconds => remaining.as_secs_f64().ceil() as i64,
                ExpireUnit::Millis => remaining.as_millis() as i64,
            };
            ctx.writer.write_integer(n).await
        }
    }
}

pub async fn keys<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let matches = ctx.db().keys_matching(&args[0]);
    ctx.writer.write_array_header(matches.len() as i64).await?;
    for k in matches {
        ctx.writer.write_bulk(Some(&k)).await?;
    }
    Ok(())
}

pub async fn randomkey<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, _args: &[Bytes]) -> io::Result<()> {
    match ctx.db().random_key() {
        Some(k) => ctx.writer.write_bulk(Some(&k)).await,
        None => ctx.writer.write_null().await,
    }
}

pub async fn rename<W: AsyncWrite + Unpin>(
    ctx: &mut CommandContext<'_, W>,
    args: &[Bytes],
    not_exists_only: bool,
) -> io::Result<()> {
    let db = ctx.db();
    if not_exists_only && db.exists(&args[1]) {
        return ctx.writer.write_integer(0).await;
    }
    match db.rename(&args[0], &args[1]) {
        Ok(()) => {
            ctx.wal_append(if not_exists_only { b"RENAMENX" } else { b"RENAME" }, args);
            if not_exists_only {
                ctx.writer.write_integer(1).await
            } else {
                ctx.writer.write_simple_string("OK").await
            }
        }
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn copy<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let replace = args.get(2).map(|a| eq_ci(a, "REPLACE")).unwrap_or(false);
    let copied = ctx.db().copy(&args[0], &args[1], replace);
    if copied {
        ctx.wal_append(b"COPY", args);
    }
    ctx.writer.write_integer(copied as i64).await
}

pub async fn dbsize<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, _args: &[Bytes]) -> io::Result<()> {
    ctx.writer.write_integer(ctx.db().size() as i64).await
}

pub async fn flushdb<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    ctx.db().flush();
    ctx.wal_append(b"FLUSHDB", args);
    ctx.writer.write_simple_string("OK").await
}

pub async fn flushall<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    for i in 0..ctx.engine.store.num_databases() {
        ctx.engine.db(i).flush();
    }
    ctx.wal_append(b"FLUSHALL", args);
    ctx.writer.write_simple_string("OK").await
}

/// `SCAN cursor [MATCH pattern] [COUNT n]`. The keyspace is a plain `HashMap`, so there is no
/// stable cursor to resume a partial iteration from (§4.6 does not require one) — a `SCAN 0`
/// always returns every matching key in one page with cursor `0` to signal completion; any
/// other starting cursor is treated the same way since there's nothing left to resume.
pub async fn scan<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let mut pattern: &[u8] = b"*";
    let mut i = 1;
    while i < args.len() {
        if eq_ci(&args[i], "MATCH") && i + 1 < args.len() {
            pattern = &args[i + 1];
            i += 2;
        } else if eq_ci(&args[i], "COUNT") && i + 1 < args.len() {
            i += 2;
        } else {
            return reply_key_error(ctx.writer, KeyError::SyntaxError).await;
        }
    }
    let matches = ctx.db().keys_matching(pattern);
    ctx.writer.write_array_header(2).await?;
    ctx.writer.write_bulk(Some(b"0")).await?;
    ctx.writer.write_array_header(matches.len() as i64).await?;
    for k in matches {
        ctx.writer.write_bulk(Some(&k)).await?;
    }
    Ok(())
}

pub async fn swapdb<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let a = match parse_i64(&args[0]) {
        Ok(n) => n,
        Err(e) => return reply_key_error(ctx.writer, e).await,
    };
    let b = match parse_i64(&args[1]) {
        Ok(n) => n,
        Err(e) => return reply_key_error(ctx.writer, e).await,
    };
    let num_dbs = ctx.engine.store.num_databases() as i64;
    if a < 0 || b < 0 || a >= num_dbs || b >= num_dbs {
        return ctx
            .writer
            .write_error("ERR DB index is out of range")
            .await;
    }
    ctx.engine.store.swap(a as usize, b as usize);
    ctx.wal_append(b"SWAPDB", args);
    ctx.writer.write_simple_string("OK").await
}
