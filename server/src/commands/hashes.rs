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

//! Hash commands (§4.6 HASH).

use super::{parse_f64, parse_i64, reply_key_error, strings::format_float, write_bytes_array, CommandContext};
use crate::keyspace::{error::KeyError, value::Value};
use bytes::Bytes;
use rand::seq::IteratorRandom;
use std::{collections::HashMap, io};
use tokio::io::AsyncWrite;

pub async fn hset<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes], is_hmset: bool) -> io::Result<()> {
    if (args.len() - 1) % 2 != 0 {
        return ctx.writer.write_error("ERR wrong number of arguments for HMSET").await;
    }
    let result = ctx.db().mutate_or_create(
        &args[0],
        || Value::Hash(HashMap::new()),
        |v| {
            let h = v.as_hash_mut()?;
            let mut added = 0i64;
            for pair in args[1..].chunks_exact(2) {
                if h.insert(pair[0].to_vec(), pair[1].to_vec()).is_none() {
                    added += 1;
                }
            }
            Ok(added)
        },
    );
    match result {
        Ok(added) => {
            ctx.wal_append(b"HSET", args);
            if is_hmset {
                ctx.writer.write_simple_string("OK").await
            } else {
                ctx.writer.write_integer(added).await
            }
        }
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn hsetnx<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let result = ctx.db().mutate_or_create(
        &args[0],
        || Value::Hash(HashMap::new()),
        |v| {
            let h = v.as_hash_mut()?;
            if h.contains_key(args[1].as_ref()) {
                Ok(false)
            } else {
                h.insert(args[1].to_vec(), args[2].to_vec());
                Ok(true)
            }
        },
    );
    match result {
        Ok(set) => {
            if set {
                ctx.wal_append(b"HSETNX", args);
            }
            ctx.writer.write_integer(if set { 1 } else { 0 }).await
        }
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn hget<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let result = ctx.db().read(&args[0], |v| v.as_hash().map(|h| h.get(args[1].as_ref()).cloned()));
    match result {
        Ok(Some(Some(value))) => ctx.writer.write_bulk(Some(&value)).await,
        Ok(_) => ctx.writer.write_null().await,
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn hmget<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let result = ctx.db().read(&args[0], |v| {
        let h = v.as_hash()?;
        Ok(args[1..].iter().map(|f| h.get(f.as_ref()).cloned()).collect::<Vec<_>>())
    });
    let values = match result {
        Ok(Some(values)) => values,
        Ok(None) => vec![None; args.len() - 1],
        Err(e) => return reply_key_error(ctx.writer, e).await,
    };
    ctx.writer.write_array_header(values.len() as i64).await?;
    for value in values {
        ctx.writer.write_bulk(value.as_deref()).await?;
    }
    Ok(())
}

pub async fn hdel<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let result = ctx.db().mutate_if_exists(&args[0], |v| {
        let h = v.as_hash_mut()?;
        let mut removed = 0i64;
        for field in &args[1..] {
            if h.remove(field.as_ref()).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    });
    match result {
        Ok(Some(removed)) => {
            if removed > 0 {
                ctx.wal_append(b"HDEL", args);
            }
            ctx.writer.write_integer(removed).await
        }
        Ok(None) => ctx.writer.write_integer(0).await,
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn hlen<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    match ctx.db().read(&args[0], |v| v.as_hash().map(|h| h.len())) {
        Ok(len) => ctx.writer.write_integer(len.unwrap_or(0) as i64).await,
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn hexists<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let result = ctx.db().read(&args[0], |v| v.as_hash().map(|h| h.contains_key(args[1].as_ref())));
    match result {
        Ok(Some(found)) => ctx.writer.write_integer(if found { 1 } else { 0 }).await,
        Ok(None) => ctx.writer.write_integer(0).await,
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn hgetall<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let result = ctx
        .db()
        .read(&args[0], |v| v.as_hash().map(|h| h.iter().map(|(k, v)| (k.clone(), v.clone())).collect::<Vec<_>>()));
    let pairs = match result {
        Ok(pairs) => pairs.unwrap_or_default(),
        Err(e) => return reply_key_error(ctx.writer, e).await,
    };
    ctx.writer.write_map_header(pairs.len()).await?;
    for (field, value) in pairs {
        ctx.writer.write_bulk(Some(&field)).await?;
        ctx.writer.write_bulk(Some(&value)).await?;
    }
    Ok(())
}

pub async fn hkeys<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let result = ctx.db().read(&args[0], |v| v.as_hash().map(|h| h.keys().cloned().collect::<Vec<_>>()));
    match result {
        Ok(keys) => write_bytes_array(ctx.writer, &keys.unwrap_or_default()).await,
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn hvals<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let result = ctx.db().read(&args[0], |v| v.as_hash().map(|h| h.values().cloned().collect::<Vec<_>>()));
    match result {
        Ok(vals) => write_bytes_array(ctx.writer, &vals.unwrap_or_default()).await,
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn hincrby<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let delta = match parse_i64(&args[2]) {
        Ok(n) => n,
        Err(e) => return reply_key_error(ctx.writer, e).await,
    };
    let result = ctx.db().mutate_or_create(
        &args[0],
        || Value::Hash(HashMap::new()),
        |v| {
            let h = v.as_hash_mut()?;
            let current = match h.get(args[1].as_ref()) {
                Some(raw) => parse_i64(raw).map_err(|_| KeyError::NotInteger)?,
                None => 0,
            };
            let updated = current.checked_add(delta).ok_or(KeyError::OutOfRange)?;
            h.insert(args[1].to_vec(), updated.to_string().into_bytes());
            Ok(updated)
        },
    );
    match result {
        Ok(updated) => {
            let wal_args = vec![args[0].clone(), args[1].clone(), Bytes::from(updated.to_string())];
            ctx.wal_append(b"HSET", &wal_args);
            ctx.writer.write_integer(updated).await
        }
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn hincrbyfloat<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let delta = match parse_f64(&args[2]) {
        Ok(n) => n,
        Err(e) => return reply_key_error(ctx.writer, e).await,
    };
    let result = ctx.db().mutate_or_create(
        &args[0],
        || Value::Hash(HashMap::new()),
        |v| {
            let h = v.as_hash_mut()?;
            let current = match h.get(args[1].as_ref()) {
                Some(raw) => parse_f64(raw).map_err(|_| KeyError::NotFloat)?,
                None => 0.0,
            };
            let updated = current + delta;
            if !updated.is_finite() {
                return Err(KeyError::NotFloat);
            }
            let rendered = format_float(updated);
            h.insert(args[1].to_vec(), rendered.clone().into_bytes());
            Ok(rendered)
        },
    );
    match result {
        Ok(rendered) => {
            let wal_args = vec![args[0].clone(), args[1].clone(), Bytes::from(rendered.clone())];
            ctx.wal_append(b"HSET", &wal_args);
            ctx.writer.write_bulk(Some(rendered.as_bytes())).await
        }
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn hrandfield<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let count = match args.get(1) {
        Some(c) => match parse_i64(c) {
            Ok(n) => Some(n),
            Err(e) => return reply_key_error(ctx.writer, e).await,
        },
        None => None,
    };
    let with_values = args.get(2).map(|a| a.eq_ignore_ascii_case(b"WITHVALUES")).unwrap_or(false);
    let result = ctx.db().read(&args[0], |v| {
        let h = v.as_hash()?;
        Ok(match count {
            None => h
                .keys()
                .choose(&mut rand::thread_rng())
                .cloned()
                .into_iter()
                .map(|k| (k, None))
                .collect::<Vec<_>>(),
            Some(n) if n >= 0 => h
                .iter()
                .map(|(k, val)| (k.clone(), Some(val.clone())))
                .collect::<Vec<_>>()
                .into_iter()
                .choose_multiple(&mut rand::thread_rng(), n as usize),
            Some(n) => {
                let want = (-n) as usize;
                let pool: Vec<(&Vec<u8>, &Vec<u8>)> = h.iter().collect();
                if pool.is_empty() {
                    Vec::new()
                } else {
                    (0..want)
                        .map(|_| {
                            let (k, val) = *pool.iter().choose(&mut rand::thread_rng()).unwrap();
                            (k.clone(), Some(val.clone()))
                        })
                        .collect()
                }
            }
        })
    });
    match result {
        Ok(Some(fields)) => {
            if count.is_some() {
                ctx.writer.write_array_header(if with_values { fields.len() as i64 * 2 } else { fields.len() as i64 }).await?;
                for (field, value) in fields {
                    ctx.writer.write_bulk(Some(&field)).await?;
                    if with_values {
                        ctx.writer.write_bulk(value.as_deref()).await?;
                    }
                }
                Ok(())
            } else {
                match fields.into_iter().next() {
                    Some((field, _)) => ctx.writer.write_bulk(Some(&field)).await,
                    None => ctx.writer.write_null().await,
                }
            }
        }
        Ok(None) => {
            if count.is_some() {
                ctx.writer.write_array_header(0).await
            } else {
                ctx.writer.write_null().await
            }
        }
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}
