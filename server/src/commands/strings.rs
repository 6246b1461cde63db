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

//! String-valued key commands (§4.6 STRING). The Open Question resolution for `SET ... GET NX`
//! is implemented here: when `NX` blocks the write on an existing key and `GET` was also given,
//! the existing value is still returned rather than null (current Redis behavior, see
//! DESIGN.md).

use super::{eq_ci, parse_f64, parse_i64, reply_key_error, write_bulk_array, CommandContext};
use crate::keyspace::{error::KeyError, memstore::wall_deadline_to_instant, value::Value};
use bytes::Bytes;
use std::{
    io,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tokio::io::AsyncWrite;

#[derive(Debug, Clone, Copy)]
pub enum ExpireUnit {
    Seconds,
    Millis,
}

/// Renders a float the way Redis does: no trailing `.0` for integral values, otherwise the
/// shortest round-tripping decimal form.
pub fn format_float(f: f64) -> String {
    if f == f.trunc() && f.abs() < 1e17 {
        format!("{}", f as i64)
    } else {
        format!("{}", f)
    }
}

fn epoch_ms(t: SystemTime) -> u128 {
    t.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

pub async fn get<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let result = ctx.db().read(&args[0], |v| v.as_str().map(|s| s.clone()));
    match result {
        Ok(Some(s)) => ctx.writer.write_bulk(Some(&s)).await,
        Ok(None) => ctx.writer.write_null().await,
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

/// `SET key value [NX|XX] [GET] [KEEPTTL] [EX s|PX ms|EXAT ts|PXAT ts]`.
pub async fn set<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let key = &args[0];
    let value = args[1].to_vec();
    let (mut nx, mut xx, mut get, mut keepttl) = (false, false, false, false);
    let mut expire_wall: Option<SystemTime> = None;
    let mut i = 2;
    while i < args.len() {
        let a = &args[i];
        if eq_ci(a, "NX") {
            nx = true;
            i += 1;
        } else if eq_ci(a, "XX") {
            xx = true;
            i += 1;
        } else if eq_ci(a, "GET") {
            get = true;
            i += 1;
        } else if eq_ci(a, "KEEPTTL") {
            keepttl = true;
            i += 1;
        } else if eq_ci(a, "EX") && i + 1 < args.len() {
            let n = match parse_i64(&args[i + 1]) {
                Ok(n) => n,
                Err(e) => return reply_key_error(ctx.writer, e).await,
            };
            expire_wall = Some(SystemTime::now() + Duration::from_secs(n.max(0) as u64));
            i += 2;
        } else if eq_ci(a, "PX") && i + 1 < args.len() {
            let n = match parse_i64(&args[i + 1]) {
                Ok(n) => n,
                Err(e) => return reply_key_error(ctx.writer, e).await,
            };
            expire_wall = Some(SystemTime::now() + Duration::from_millis(n.max(0) as u64));
            i += 2;
        } else if eq_ci(a, "EXAT") && i + 1 < args.len() {
            let n = match parse_i64(&args[i + 1]) {
                Ok(n) => n,
                Err(e) => return reply_key_error(ctx.writer, e).await,
            };
            expire_wall = Some(UNIX_EPOCH + Duration::from_secs(n.max(0) as u64));
            i += 2;
        } else if eq_ci(a, "PXAT") && i + 1 < args.len() {
            let n = match parse_i64(&args[i + 1]) {
                Ok(n) => n,
                Err(e) => return reply_key_error(ctx.writer, e).await,
            };
            expire_wall = Some(UNIX_EPOCH + Duration::from_millis(n.max(0) as u64));
            i += 2;
        } else {
            return reply_key_error(ctx.writer, KeyError::SyntaxError).await;
        }
    }
    if (nx && xx) || (keepttl && expire_wall.is_some()) {
        return reply_key_error(ctx.writer, KeyError::SyntaxError).await;
    }

    let db = ctx.db();
    let existing = db.get_value_cloned(key);
    if get {
        if let Some(v) = &existing {
            if v.as_str().is_err() {
                return reply_key_error(ctx.writer, KeyError::WrongType).await;
            }
        }
    }
    let existed = existing.is_some();
    let existing_str = existing.and_then(|v| v.as_str().ok().cloned());
    let condition_ok = (!nx || !existed) && (!xx || existed);

    if !condition_ok {
        return if get {
            match existing_str {
                Some(s) => ctx.writer.write_bulk(Some(&s)).await,
                None => ctx.writer.write_null().await,
            }
        } else {
            ctx.writer.write_null().await
        };
    }

    let resolved_wall = if keepttl {
        match db.ttl(key) {
            Some(Some(remaining)) => Some(SystemTime::now() + remaining),
            _ => None,
        }
    } else {
        expire_wall
    };
    let expires_at = resolved_wall.map(wall_deadline_to_instant);
    db.set_value(key.to_vec(), Value::Str(value.clone()), expires_at);

    let mut wal_args = vec![key.clone(), Bytes::from(value)];
    if let Some(wall) = resolved_wall {
        wal_args.push(Bytes::from_static(b"PXAT"));
        wal_args.push(Bytes::from(epoch_ms(wall).to_string()));
    }
    ctx.wal_append(b"SET", &wal_args);

    if get {
        match existing_str {
            Some(s) => ctx.writer.write_bulk(Some(&s)).await,
            None => ctx.writer.write_null().await,
        }
    } else {
        ctx.writer.write_simple_string("OK").await
    }
}

pub async fn setnx<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let db = ctx.db();
    if db.exists(&args[0]) {
        return ctx.writer.write_integer(0).await;
    }
    db.set_value(args[0].to_vec(), Value::Str(args[1].to_vec()), None);
    ctx.wal_append(b"SET", args);
    ctx.writer.write_integer(1).await
}

pub async fn setex<W: AsyncWrite + Unpin>(
    ctx: &mut CommandContext<'_, W>,
    args: &[Bytes],
    unit: ExpireUnit,
) -> io::Result<()> {
    let n = match parse_i64(&args[1]) {
        Ok(n) => n,
        Err(e) => return reply_key_error(ctx.writer, e).await,
    };
    let wall = SystemTime::now()
        + match unit {
            ExpireUnit::Seconds => Duration::from_secs(n.max(0) as u64),
            ExpireUnit::Millis => Duration::from_millis(n.max(0) as u64),
        };
    ctx.db()
        .set_value(args[0].to_vec(), Value::Str(args[2].to_vec()), Some(wall_deadline_to_instant(wall)));
    ctx.wal_append(
        b"SET",
        &[
            args[0].clone(),
            args[2].clone(),
            Bytes::from_static(b"PXAT"),
            Bytes::from(epoch_ms(wall).to_string()),
        ],
    );
    ctx.writer.write_simple_string("OK").await
}

pub async fn getset<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let db = ctx.db();
    let existing = db.get_value_cloned(&args[0]);
    if let Some(v) = &existing {
        if v.as_str().is_err() {
            return reply_key_error(ctx.writer, KeyError::WrongType).await;
        }
    }
    db.set_value(args[0].to_vec(), Value::Str(args[1].to_vec()), None);
    ctx.wal_append(b"SET", args);
    match existing.and_then(|v| v.as_str().ok().cloned()) {
        Some(s) => ctx.writer.write_bulk(Some(&s)).await,
        None => ctx.writer.write_null().await,
    }
}

pub async fn getdel<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let db = ctx.db();
    let result = db.read(&args[0], |v| v.as_str().map(|s| s.clone()));
    match result {
        Err(e) => reply_key_error(ctx.writer, e).await,
        Ok(None) => ctx.writer.write_null().await,
        Ok(Some(s)) => {
            db.del(std::slice::from_ref(&args[0].to_vec()));
            ctx.wal_append(b"DEL", &args[..1]);
            ctx.writer.write_bulk(Some(&s)).await
        }
    }
}

/// `GETEX key [EX s|PX ms|EXAT ts|PXAT ts|PERSIST]`: reads the value and optionally changes
/// (or clears) the TTL, without touching the value itself.
pub async fn getex<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let db = ctx.db();
    let existing = match db.read(&args[0], |v| v.as_str().map(|s| s.clone())) {
        Err(e) => return reply_key_error(ctx.writer, e).await,
        Ok(None) => return ctx.writer.write_null().await,
        Ok(Some(s)) => s,
    };
    if args.len() > 1 {
        if eq_ci(&args[1], "PERSIST") {
            if db.persist(&args[0]) {
                ctx.wal_append(b"PERSIST", &args[..1]);
            }
        } else if args.len() > 2 {
            let n = match parse_i64(&args[2]) {
                Ok(n) => n,
                Err(e) => return reply_key_error(ctx.writer, e).await,
            };
            let wall = if eq_ci(&args[1], "EX") {
                SystemTime::now() + Duration::from_secs(n.max(0) as u64)
            } else if eq_ci(&args[1], "PX") {
                SystemTime::now() + Duration::from_millis(n.max(0) as u64)
            } else if eq_ci(&args[1], "EXAT") {
                UNIX_EPOCH + Duration::from_secs(n.max(0) as u64)
            } else if eq_ci(&args[1], "PXAT") {
                UNIX_EPOCH + Duration::from_millis(n.max(0) as u64)
            } else {
                return reply_key_error(ctx.writer, KeyError::SyntaxError).await;
            };
            db.expire_at(&args[0], wall_deadline_to_instant(wall));
            ctx.wal_append(
                b"PEXPIREAT",
                &[args[0].clone(), Bytes::from(epoch_ms(wall).to_string())],
            );
        } else {
            return reply_key_error(ctx.writer, KeyError::SyntaxError).await;
        }
    }
    ctx.writer.write_bulk(Some(&existing)).await
}

pub async fn append<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let result = ctx.db().mutate_or_create(
        &args[0],
        || Value::Str(Vec::new()),
        |v| {
            let s = v.as_str_mut()?;
            s.extend_from_slice(&args[1]);
            Ok(s.len())
        },
    );
    match result {
        Ok(len) => {
            ctx.wal_append(b"APPEND", args);
            ctx.writer.write_integer(len as i64).await
        }
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn strlen<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    match ctx.db().read(&args[0], |v| v.as_str().map(|s| s.len())) {
        Ok(len) => ctx.writer.write_integer(len.unwrap_or(0) as i64).await,
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

/// Shared body of `INCR`/`DECR` (no explicit amount — `delta` is the fixed `+1`/`-1`).
pub async fn incrby<W: AsyncWrite + Unpin>(
    ctx: &mut CommandContext<'_, W>,
    args: &[Bytes],
    delta: i64,
) -> io::Result<()> {
    incr_impl(ctx, &args[0], delta).await
}

/// Shared body of `INCRBY`/`DECRBY` (explicit amount argument, negated for `DECRBY`).
pub async fn incrby_arg<W: AsyncWrite + Unpin>(
    ctx: &mut CommandContext<'_, W>,
    args: &[Bytes],
    sign: i64,
) -> io::Result<()> {
    let amount = match parse_i64(&args[1]) {
        Ok(n) => n,
        Err(e) => return reply_key_error(ctx.writer, e).await,
    };
    incr_impl(ctx, &args[0], amount * sign).await
}

async fn incr_impl<W: AsyncWrite + Unpin>(
    ctx: &mut CommandContext<'_, W>,
    key: &Bytes,
    delta: i64,
) -> io::Result<()> {
    let result = ctx.db().mutate_or_create(
        key,
        || Value::Str(b"0".to_vec()),
        |v| {
            let s = v.as_str_mut()?;
            let current: i64 = std::str::from_utf8(s)
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or(KeyError::NotInteger)?;
            let next = current.checked_add(delta).ok_or(KeyError::OutOfRange)?;
            *s = next.to_string().into_bytes();
            Ok(next)
        },
    );
    match result {
        Ok(next) => {
            ctx.wal_append(b"SET", &[key.clone(), Bytes::from(next.to_string())]);
            ctx.writer.write_integer(next).await
        }
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn incrbyfloat<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let delta = match parse_f64(&args[1]) {
        Ok(n) => n,
        Err(e) => return reply_key_error(ctx.writer, e).await,
    };
    let result = ctx.db().mutate_or_create(
        &args[0],
        || Value::Str(b"0".to_vec()),
        |v| {
            let s = v.as_str_mut()?;
            let current: f64 = std::str::from_utf8(s)
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or(KeyError::NotFloat)?;
            let next = current + delta;
            if !next.is_finite() {
                return Err(KeyError::NotFloat);
            }
            let rendered = format_float(next);
            *s = rendered.clone().into_bytes();
            Ok(rendered)
        },
    );
    match result {
        Ok(rendered) => {
            ctx.wal_append(b"SET", &[args[0].clone(), Bytes::from(rendered.clone())]);
            ctx.writer.write_bulk(Some(rendered.as_bytes())).await
        }
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn mget<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let db = ctx.db();
    let items: Vec<Option<Vec<u8>>> = args
        .iter()
        .map(|k| db.read(k, |v| v.as_str().map(|s| s.clone())).unwrap_or(None))
        .collect();
    write_bulk_array(ctx.writer, &items).await
}

pub async fn mset<W: AsyncWrite + Unpin>(
    ctx: &mut CommandContext<'_, W>,
    args: &[Bytes],
    not_exists_only: bool,
) -> io::Result<()> {
    if args.len() % 2 != 0 {
        return reply_key_error(ctx.writer, KeyError::SyntaxError).await;
    }
    let db = ctx.db();
    if not_exists_only && args.chunks(2).any(|pair| db.exists(&pair[0])) {
        return ctx.writer.write_integer(0).await;
    }
    for pair in args.chunks(2) {
        db.set_value(pair[0].to_vec(), Value::Str(pair[1].to_vec()), None);
    }
    ctx.wal_append(if not_exists_only { b"MSETNX" } else { b"MSET" }, args);
    if not_exists_only {
        ctx.writer.write_integer(1).await
    } else {
        ctx.writer.write_simple_string("OK").await
    }
}

pub async fn setrange<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let offset = match parse_i64(&args[1]) {
        Ok(n) if n >= 0 => n as usize,
        _ => return reply_key_error(ctx.writer, KeyError::OutOfRange).await,
    };
    let patch = &args[2];
    let result = ctx.db().mutate_or_create(
        &args[0],
        || Value::Str(Vec::new()),
        |v| {
            let s = v.as_str_mut()?;
            if s.len() < offset + patch.len() {
                s.resize(offset + patch.len(), 0);
            }
            s[offset..offset + patch.len()].copy_from_slice(patch);
            Ok(s.len())
        },
    );
    match result {
        Ok(len) => {
            ctx.wal_append(b"SETRANGE", args);
            ctx.writer.write_integer(len as i64).await
        }
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn getrange<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let start = match parse_i64(&args[1]) {
        Ok(n) => n,
        Err(e) => return reply_key_error(ctx.writer, e).await,
    };
    let end = match parse_i64(&args[2]) {
        Ok(n) => n,
        Err(e) => return reply_key_error(ctx.writer, e).await,
    };
    let result = ctx.db().read(&args[0], |v| v.as_str().map(|s| s.clone()));
    match result {
        Err(e) => reply_key_error(ctx.writer, e).await,
        Ok(None) => ctx.writer.write_bulk(Some(b"")).await,
        Ok(Some(s)) => {
            match crate::keyspace::zset::normalize_range(s.len(), start, end) {
                None => ctx.writer.write_bulk(Some(b"")).await,
                Some((lo, hi)) => ctx.writer.write_bulk(Some(&s[lo..=hi])).await,
            }
        }
    }
}
