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

//! Set commands (§4.6 SET), including the three set-algebra family members
//! (`SUNION`/`SINTER`/`SDIFF`, each with a `*STORE` counterpart routed through [`setop`]).

use super::{parse_i64, reply_key_error, write_bytes_array, CommandContext};
use crate::keyspace::{error::KeyError, memstore::Database, value::Value};
use bytes::Bytes;
use rand::seq::IteratorRandom;
use std::{collections::HashSet, io};
use tokio::io::AsyncWrite;

pub async fn sadd<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let result = ctx.db().mutate_or_create(
        &args[0],
        || Value::Set(HashSet::new()),
        |v| {
            let s = v.as_set_mut()?;
            let mut added = 0i64;
            for member in &args[1..] {
                if s.insert(member.to_vec()) {
                    added += 1;
                }
            }
            Ok(added)
        },
    );
    match result {
        Ok(added) => {
            if added > 0 {
                ctx.wal_append(b"SADD", args);
            }
            ctx.writer.write_integer(added).await
        }
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn srem<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let result = ctx.db().mutate_if_exists(&args[0], |v| {
        let s = v.as_set_mut()?;
        let mut removed = 0i64;
        for member in &args[1..] {
            if s.remove(member.as_ref()) {
                removed += 1;
            }
        }
        Ok(removed)
    });
    match result {
        Ok(Some(removed)) => {
            if removed > 0 {
                ctx.wal_append(b"SREM", args);
            }
            ctx.writer.write_integer(removed).await
        }
        Ok(None) => ctx.writer.write_integer(0).await,
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn sismember<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let result = ctx.db().read(&args[0], |v| v.as_set().map(|s| s.contains(args[1].as_ref())));
    match result {
        Ok(Some(found)) => ctx.writer.write_integer(if found { 1 } else { 0 }).await,
        Ok(None) => ctx.writer.write_integer(0).await,
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn smismember<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let result = ctx.db().read(&args[0], |v| {
        let s = v.as_set()?;
        Ok(args[1..].iter().map(|m| s.contains(m.as_ref())).collect::<Vec<_>>())
    });
    let flags = match result {
        Ok(Some(flags)) => flags,
        Ok(None) => vec![false; args.len() - 1],
        Err(e) => return reply_key_error(ctx.writer, e).await,
    };
    ctx.writer.write_array_header(flags.len() as i64).await?;
    for f in flags {
        ctx.writer.write_integer(if f { 1 } else { 0 }).await?;
    }
    Ok(())
}

pub async fn smembers<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let result = ctx.db().read(&args[0], |v| v.as_set().map(|s| s.iter().cloned().collect::<Vec<_>>()));
    match result {
        Ok(members) => write_bytes_array(ctx.writer, &members.unwrap_or_default()).await,
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn scard<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    match ctx.db().read(&args[0], |v| v.as_set().map(|s| s.len())) {
        Ok(len) => ctx.writer.write_integer(len.unwrap_or(0) as i64).await,
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn spop<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let count = match args.get(1) {
        Some(c) => match parse_i64(c) {
            Ok(n) if n >= 0 => Some(n as usize),
            _ => return reply_key_error(ctx.writer, KeyError::OutOfRange).await,
        },
        None => None,
    };
    let n = count.unwrap_or(1);
    let result = ctx.db().mutate_if_exists(&args[0], |v| {
        let s = v.as_set_mut()?;
        let chosen: Vec<Vec<u8>> = s.iter().cloned().choose_multiple(&mut rand::thread_rng(), n);
        for m in &chosen {
            s.remove(m);
        }
        Ok(chosen)
    });
    match result {
        Ok(Some(popped)) => {
            if !popped.is_empty() {
                let mut wal_args = Vec::with_capacity(popped.len() + 1);
                wal_args.push(args[0].clone());
                wal_args.extend(popped.iter().map(|m| Bytes::copy_from_slice(m)));
                ctx.wal_append(b"SREM", &wal_args);
            }
            if count.is_some() {
                write_bytes_array(ctx.writer, &popped).await
            } else {
                match popped.into_iter().next() {
                    Some(m) => ctx.writer.write_bulk(Some(&m)).await,
                    None => ctx.writer.write_null().await,
                }
            }
        }
        Ok(None) => {
            if count.is_some() {
                write_bytes_array(ctx.writer, &[]).await
            } else {
                ctx.writer.write_null().await
            }
        }
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn srandmember<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let count = match args.get(1) {
        Some(c) => match parse_i64(c) {
            Ok(n) => Some(n),
            Err(e) => return reply_key_error(ctx.writer, e).await,
        },
        None => None,
    };
    let result = ctx.db().read(&args[0], |v| {
        let s = v.as_set()?;
        Ok(match count {
            None => s.iter().choose(&mut rand::thread_rng()).cloned().into_iter().collect::<Vec<_>>(),
            Some(n) if n >= 0 => s.iter().cloned().choose_multiple(&mut rand::thread_rng(), n as usize),
            Some(n) => {
                let want = (-n) as usize;
                let pool: Vec<&Vec<u8>> = s.iter().collect();
                if pool.is_empty() {
                    Vec::new()
                } else {
                    (0..want)
                        .map(|_| (*pool.iter().choose(&mut rand::thread_rng()).unwrap()).clone())
                        .collect()
                }
            }
        })
    });
    match result {
        Ok(Some(members)) => {
            if count.is_some() {
                write_bytes_array(ctx.writer, &members).await
            } else {
                match members.into_iter().next() {
                    Some(m) => ctx.writer.write_bulk(Some(&m)).await,
                    None => ctx.writer.write_null().await,
                }
            }
        }
        Ok(None) => {
            if count.is_some() {
                write_bytes_array(ctx.writer, &[]).await
            } else {
                ctx.writer.write_null().await
            }
        }
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn smove<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let db = ctx.db();
    if let Some(tag) = db.type_of(&args[1]) {
        if tag != crate::keyspace::value::TypeTag::Set {
            return reply_key_error(ctx.writer, KeyError::WrongType).await;
        }
    }
    let removed = db.mutate_if_exists(&args[0], |v| {
        let s = v.as_set_mut()?;
        Ok(s.remove(args[2].as_ref()))
    });
    let removed = match removed {
        Ok(Some(true)) => true,
        Ok(_) => false,
        Err(e) => return reply_key_error(ctx.writer, e).await,
    };
    if !removed {
        return ctx.writer.write_integer(0).await;
    }
    let insert_result = db.mutate_or_create(
        &args[1],
        || Value::Set(HashSet::new()),
        |v| {
            let s = v.as_set_mut()?;
            Ok(s.insert(args[2].to_vec()))
        },
    );
    match insert_result {
        Ok(_) => {
            ctx.wal_append(b"SMOVE", args);
            ctx.writer.write_integer(1).await
        }
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

#[derive(Clone, Copy)]
pub enum SetOp {
    Union,
    Inter,
    Diff,
}

fn read_set(db: &Database, key: &[u8]) -> Result<HashSet<Vec<u8>>, KeyError> {
    Ok(db.read(key, |v| v.as_set().map(|s| s.clone()))?.unwrap_or_default())
}

fn combine(op: SetOp, sets: Vec<HashSet<Vec<u8>>>) -> HashSet<Vec<u8>> {
    let mut iter = sets.into_iter();
    let first = iter.next().unwrap_or_default();
    match op {
        SetOp::Union => iter.fold(first, |acc, s| acc.union(&s).cloned().collect()),
        SetOp::Inter => iter.fold(first, |acc, s| acc.intersection(&s).cloned().collect()),
        SetOp::Diff => iter.fold(first, |acc, s| acc.difference(&s).cloned().collect()),
    }
}

pub async fn setop<W: AsyncWrite + Unpin>(
    ctx: &mut CommandContext<'_, W>,
    args: &[Bytes],
    op: SetOp,
    store: bool,
) -> io::Result<()> {
    let (dest, keys) = if store { (Some(&args[0]), &args[1..]) } else { (None, args) };
    let mut sets = Vec::with_capacity(keys.len());
    for key in keys {
        match read_set(ctx.db(), key) {
            Ok(s) => sets.push(s),
            Err(e) => return reply_key_error(ctx.writer, e).await,
        }
    }
    let result = combine(op, sets);

    match dest {
        None => {
            let members: Vec<Vec<u8>> = result.into_iter().collect();
            write_bytes_array(ctx.writer, &members).await
        }
        Some(dest_key) => {
            let db = ctx.db();
            let len = result.len();
            if result.is_empty() {
                db.del(std::slice::from_ref(&dest_key.to_vec()));
            } else {
                db.set_value(dest_key.to_vec(), Value::Set(result), None);
            }
            ctx.wal_append(
                match op {
                    SetOp::Union => b"SUNIONSTORE",
                    SetOp::Inter => b"SINTERSTORE",
                    SetOp::Diff => b"SDIFFSTORE",
                },
                args,
            );
            ctx.writer.write_integer(len as i64).await
        }
    }
}
