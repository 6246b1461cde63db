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

//! List commands (§4.6 LIST), including the blocking pop/move variants. A replayed `BLPOP`
//! (`ctx.replaying`) never actually suspends — it's a single non-blocking attempt, matching
//! how the rest of the blocking family behaves during WAL recovery (§4.8).

use super::{eq_ci, parse_f64, parse_i64, reply_key_error, write_bytes_array, CommandContext};
use crate::keyspace::{error::KeyError, memstore::Database, value::Value, zset::normalize_range};
use bytes::Bytes;
use std::{collections::VecDeque, io, time::Duration};
use tokio::io::AsyncWrite;

pub async fn push<W: AsyncWrite + Unpin>(
    ctx: &mut CommandContext<'_, W>,
    args: &[Bytes],
    left: bool,
    only_if_exists: bool,
) -> io::Result<()> {
    let key = &args[0];
    let values = &args[1..];
    let db = ctx.db();
    if only_if_exists && !db.exists(key) {
        return ctx.writer.write_integer(0).await;
    }
    let result = db.mutate_or_create(
        key,
        || Value::List(VecDeque::new()),
        |v| {
            let l = v.as_list_mut()?;
            for val in values {
                if left {
                    l.push_front(val.to_vec());
                } else {
                    l.push_back(val.to_vec());
                }
            }
            Ok(l.len())
        },
    );
    match result {
        Ok(len) => {
            ctx.wal_append(if left { b"LPUSH" } else { b"RPUSH" }, args);
            ctx.writer.write_integer(len as i64).await
        }
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn pop<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes], left: bool) -> io::Result<()> {
    let key = &args[0];
    let count = match args.get(1) {
        Some(c) => match parse_i64(c) {
            Ok(n) if n >= 0 => Some(n as usize),
            _ => return reply_key_error(ctx.writer, KeyError::OutOfRange).await,
        },
        None => None,
    };
    let n = count.unwrap_or(1);
    let result = ctx.db().mutate_if_exists(key, |v| {
        let l = v.as_list_mut()?;
        let mut popped = Vec::with_capacity(n.min(l.len()));
        for _ in 0..n {
            let item = if left { l.pop_front() } else { l.pop_back() };
            match item {
                Some(i) => popped.push(i),
                None => break,
            }
        }
        Ok(popped)
    });
    match result {
        Ok(None) => {
            if count.is_some() {
                ctx.writer.write_array_header(-1).await
            } else {
                ctx.writer.write_null().await
            }
        }
        Ok(Some(popped)) => {
            if !popped.is_empty() {
                ctx.wal_append(if left { b"LPOP" } else { b"RPOP" }, &args[..1]);
            }
            if count.is_some() {
                write_bytes_array(ctx.writer, &popped).await
            } else {
                match popped.into_iter().next() {
                    Some(v) => ctx.writer.write_bulk(Some(&v)).await,
                    None => ctx.writer.write_null().await,
                }
            }
        }
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn llen<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    match ctx.db().read(&args[0], |v| v.as_list().map(|l| l.len())) {
        Ok(len) => ctx.writer.write_integer(len.unwrap_or(0) as i64).await,
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn lrange<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let start = match parse_i64(&args[1]) {
        Ok(n) => n,
        Err(e) => return reply_key_error(ctx.writer, e).await,
    };
    let stop = match parse_i64(&args[2]) {
        Ok(n) => n,
        Err(e) => return reply_key_error(ctx.writer, e).await,
    };
    let result = ctx.db().read(&args[0], |v| {
        let l = v.as_list()?;
        Ok(match normalize_range(l.len(), start, stop) {
            None => Vec::new(),
            Some((lo, hi)) => l.iter().skip(lo).take(hi - lo + 1).cloned().collect::<Vec<_>>(),
        })
    });
    match result {
        Ok(items) => write_bytes_array(ctx.writer, &items.unwrap_or_default()).await,
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn lindex<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let index = match parse_i64(&args[1]) {
        Ok(n) => n,
        Err(e) => return reply_key_error(ctx.writer, e).await,
    };
    let result = ctx.db().read(&args[0], |v| {
        let l = v.as_list()?;
        let idx = if index < 0 { index + l.len() as i64 } else { index };
        Ok(if idx >= 0 { l.get(idx as usize).cloned() } else { None })
    });
    match result {
        Ok(Some(Some(item))) => ctx.writer.write_bulk(Some(&item)).await,
        Ok(_) => ctx.writer.write_null().await,
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn lset<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let index = match parse_i64(&args[1]) {
        Ok(n) => n,
        Err(e) => return reply_key_error(ctx.writer, e).await,
    };
    let result = ctx.db().mutate_if_exists(&args[0], |v| {
        let l = v.as_list_mut()?;
        let idx = if index < 0 { index + l.len() as i64 } else { index };
        if idx < 0 || idx as usize >= l.len() {
            return Err(KeyError::OutOfRange);
        }
        l[idx as usize] = args[2].to_vec();
        Ok(())
    });
    match result {
        Ok(Some(())) => {
            ctx.wal_append(b"LSET", args);
            ctx.writer.write_simple_string("OK").await
        }
        Ok(None) => reply_key_error(ctx.writer, KeyError::NoSuchKey).await,
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn linsert<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let before = if eq_ci(&args[1], "BEFORE") {
        true
    } else if eq_ci(&args[1], "AFTER") {
        false
    } else {
        return reply_key_error(ctx.writer, KeyError::SyntaxError).await;
    };
    let result = ctx.db().mutate_if_exists(&args[0], |v| {
        let l = v.as_list_mut()?;
        match l.iter().position(|item| item == args[2].as_ref()) {
            Some(pos) => {
                let insert_at = if before { pos } else { pos + 1 };
                l.insert(insert_at, args[3].to_vec());
                Ok(l.len() as i64)
            }
            None => Ok(-1),
        }
    });
    match result {
        Ok(None) => ctx.writer.write_integer(0).await,
        Ok(Some(n)) => {
            if n >= 0 {
                ctx.wal_append(b"LINSERT", args);
            }
            ctx.writer.write_integer(n).await
        }
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn lrem<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let count = match parse_i64(&args[1]) {
        Ok(n) => n,
        Err(e) => return reply_key_error(ctx.writer, e).await,
    };
    let target = &args[2];
    let result = ctx.db().mutate_if_exists(&args[0], |v| {
        let l = v.as_list_mut()?;
        let mut removed = 0i64;
        if count >= 0 {
            let limit = if count == 0 { i64::MAX } else { count };
            let mut i = 0;
            while i < l.len() && removed < limit {
                if l[i] == target.as_ref() {
                    l.remove(i);
                    removed += 1;
                } else {
                    i += 1;
                }
            }
        } else {
            let limit = -count;
            let mut i = l.len();
            while i > 0 && removed < limit {
                i -= 1;
                if l[i] == target.as_ref() {
                    l.remove(i);
                    removed += 1;
                }
            }
        }
        Ok(removed)
    });
    match result {
        Ok(Some(removed)) => {
            if removed > 0 {
                ctx.wal_append(b"LREM", args);
            }
            ctx.writer.write_integer(removed).await
        }
        Ok(None) => ctx.writer.write_integer(0).await,
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn ltrim<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let start = match parse_i64(&args[1]) {
        Ok(n) => n,
        Err(e) => return reply_key_error(ctx.writer, e).await,
    };
    let stop = match parse_i64(&args[2]) {
        Ok(n) => n,
        Err(e) => return reply_key_error(ctx.writer, e).await,
    };
    let result = ctx.db().mutate_if_exists(&args[0], |v| {
        let l = v.as_list_mut()?;
        match normalize_range(l.len(), start, stop) {
            None => l.clear(),
            Some((lo, hi)) => {
                let kept: VecDeque<Vec<u8>> = l.iter().skip(lo).take(hi - lo + 1).cloned().collect();
                *l = kept;
            }
        }
        Ok(())
    });
    match result {
        Ok(_) => {
            ctx.wal_append(b"LTRIM", args);
            ctx.writer.write_simple_string("OK").await
        }
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

fn move_once(db: &Database, src: &[u8], dst: &[u8], from_left: bool, to_left: bool) -> Result<Option<Vec<u8>>, KeyError> {
    if let Some(tag) = db.type_of(dst) {
        if tag != crate::keyspace::value::TypeTag::List {
            return Err(KeyError::WrongType);
        }
    }
    let popped = db.mutate_if_exists(src, |v| {
        let l = v.as_list_mut()?;
        Ok(if from_left { l.pop_front() } else { l.pop_back() })
    })?;
    let Some(Some(val)) = popped else {
        return Ok(None);
    };
    db.mutate_or_create(
        dst,
        || Value::List(VecDeque::new()),
        |v| {
            let l = v.as_list_mut()?;
            if to_left {
                l.push_front(val.clone());
            } else {
                l.push_back(val.clone());
            }
            Ok(())
        },
    )?;
    Ok(Some(val))
}

pub async fn rpoplpush<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    match move_once(ctx.db(), &args[0], &args[1], false, true) {
        Ok(Some(val)) => {
            ctx.wal_append(b"RPOPLPUSH", args);
            ctx.writer.write_bulk(Some(&val)).await
        }
        Ok(None) => ctx.writer.write_null().await,
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn lmove<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let from_left = if eq_ci(&args[2], "LEFT") {
        true
    } else if eq_ci(&args[2], "RIGHT") {
        false
    } else {
        return reply_key_error(ctx.writer, KeyError::SyntaxError).await;
    };
    let to_left = if eq_ci(&args[3], "LEFT") {
        true
    } else if eq_ci(&args[3], "RIGHT") {
        false
    } else {
        return reply_key_error(ctx.writer, KeyError::SyntaxError).await;
    };
    match move_once(ctx.db(), &args[0], &args[1], from_left, to_left) {
        Ok(Some(val)) => {
            ctx.wal_append(b"LMOVE", args);
            ctx.writer.write_bulk(Some(&val)).await
        }
        Ok(None) => ctx.writer.write_null().await,
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

/// Shared body of `BLPOP`/`BRPOP`: `args` is one or more keys followed by a trailing timeout
/// (seconds, fractional allowed). Registers interest in the database's write notification
/// *before* each re-check, the ordering §9 requires to avoid a lost wakeup.
pub async fn bpop<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes], left: bool) -> io::Result<()> {
    let (keys, timeout_arg) = args.split_at(args.len() - 1);
    let timeout_secs = match parse_f64(&timeout_arg[0]) {
        Ok(n) if n >= 0.0 => n,
        _ => return reply_key_error(ctx.writer, KeyError::OutOfRange).await,
    };
    let deadline = if timeout_secs == 0.0 { None } else { Some(Duration::from_secs_f64(timeout_secs)) };

    loop {
        let notified = ctx.db().notified();
        for key in keys {
            let result = ctx.db().mutate_if_exists(key, |v| {
                let l = v.as_list_mut()?;
                Ok(if left { l.pop_front() } else { l.pop_back() })
            });
            match result {
                Ok(Some(Some(val))) => {
                    ctx.wal_append(if left { b"LPOP" } else { b"RPOP" }, std::slice::from_ref(key));
                    ctx.writer.write_array_header(2).await?;
                    ctx.writer.write_bulk(Some(key)).await?;
                    return ctx.writer.write_bulk(Some(&val)).await;
                }
                Ok(_) => {}
                Err(e) => return reply_key_error(ctx.writer, e).await,
            }
        }
        if ctx.replaying {
            return ctx.writer.write_array_header(-1).await;
        }
        match deadline {
            Some(d) => {
                if tokio::time::timeout(d, notified).await.is_err() {
                    return ctx.writer.write_array_header(-1).await;
                }
            }
            None => notified.await,
        }
    }
}

pub async fn blmove<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let from_left = if eq_ci(&args[2], "LEFT") {
        true
    } else if eq_ci(&args[2], "RIGHT") {
        false
    } else {
        return reply_key_error(ctx.writer, KeyError::SyntaxError).await;
    };
    let to_left = if eq_ci(&args[3], "LEFT") {
        true
    } else if eq_ci(&args[3], "RIGHT") {
        false
    } else {
        return reply_key_error(ctx.writer, KeyError::SyntaxError).await;
    };
    let timeout_secs = match parse_f64(&args[4]) {
        Ok(n) if n >= 0.0 => n,
        _ => return reply_key_error(ctx.writer, KeyError::OutOfRange).await,
    };
    let deadline = if timeout_secs == 0.0 { None } else { Some(Duration::from_secs_f64(timeout_secs)) };

    loop {
        let notified = ctx.db().notified();
        match move_once(ctx.db(), &args[0], &args[1], from_left, to_left) {
            Ok(Some(val)) => {
                ctx.wal_append(b"LMOVE", &args[..4]);
                return ctx.writer.write_bulk(Some(&val)).await;
            }
            Ok(None) => {}
            Err(e) => return reply_key_error(ctx.writer, e).await,
        }
        if ctx.replaying {
            return ctx.writer.write_null().await;
        }
        match deadline {
            Some(d) => {
                if tokio::time::timeout(d, notified).await.is_err() {
                    return ctx.writer.write_null().await;
                }
            }
            None => notified.await,
        }
    }
}
