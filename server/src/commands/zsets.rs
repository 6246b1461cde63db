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

//! Sorted set commands (§4.6 ZSET), including the blocking `BZPOPMIN`/`BZPOPMAX` pair.

use super::{eq_ci, parse_f64, parse_i64, reply_key_error, strings::format_float, CommandContext};
use crate::keyspace::{error::KeyError, value::Value, zset::ZSet};
use bytes::Bytes;
use std::{io, time::Duration};
use tokio::io::AsyncWrite;

async fn write_pairs<W: AsyncWrite + Unpin>(
    ctx: &mut CommandContext<'_, W>,
    pairs: &[(Vec<u8>, f64)],
    with_scores: bool,
) -> io::Result<()> {
    ctx.writer
        .write_array_header(if with_scores { pairs.len() as i64 * 2 } else { pairs.len() as i64 })
        .await?;
    for (member, score) in pairs {
        ctx.writer.write_bulk(Some(member)).await?;
        if with_scores {
            ctx.writer.write_bulk(Some(format_float(*score).as_bytes())).await?;
        }
    }
    Ok(())
}

pub async fn zadd<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let mut i = 1;
    let (mut nx, mut xx, mut gt, mut lt, mut ch, mut incr) = (false, false, false, false, false, false);
    while i < args.len() {
        if eq_ci(&args[i], "NX") {
            nx = true;
        } else if eq_ci(&args[i], "XX") {
            xx = true;
        } else if eq_ci(&args[i], "GT") {
            gt = true;
        } else if eq_ci(&args[i], "LT") {
            lt = true;
        } else if eq_ci(&args[i], "CH") {
            ch = true;
        } else if eq_ci(&args[i], "INCR") {
            incr = true;
        } else {
            break;
        }
        i += 1;
    }
    if nx && (xx || gt || lt) {
        return reply_key_error(ctx.writer, KeyError::SyntaxError).await;
    }
    let pairs = &args[i..];
    if pairs.is_empty() || pairs.len() % 2 != 0 || (incr && pairs.len() != 2) {
        return reply_key_error(ctx.writer, KeyError::SyntaxError).await;
    }

    let result = ctx.db().mutate_or_create(
        &args[0],
        || Value::ZSet(ZSet::new()),
        |v| {
            let z = v.as_zset_mut()?;
            let mut added = 0i64;
            let mut changed = 0i64;
            let mut incr_result = None;
            for pair in pairs.chunks_exact(2) {
                let score = parse_f64(&pair[0])?;
                let member = pair[1].to_vec();
                let existing = z.score(&member);
                if nx && existing.is_some() {
                    if incr {
                        incr_result = Some(None);
                    }
                    continue;
                }
                if xx && existing.is_none() {
                    if incr {
                        incr_result = Some(None);
                    }
                    continue;
                }
                let new_score = if incr {
                    existing.unwrap_or(0.0) + score
                } else {
                    score
                };
                if !new_score.is_finite() {
                    return Err(KeyError::NotFloat);
                }
                if let Some(old) = existing {
                    if (gt && new_score <= old) || (lt && new_score >= old) {
                        if incr {
                            incr_result = Some(None);
                        }
                        continue;
                    }
                    if new_score != old {
                        changed += 1;
                    }
                } else {
                    added += 1;
                    changed += 1;
                }
                z.insert(member, new_score);
                if incr {
                    incr_result = Some(Some(new_score));
                }
            }
            Ok((added, changed, incr_result))
        },
    );
    match result {
        Ok((added, changed, incr_result)) => {
            ctx.wal_append(b"ZADD", args);
            if incr {
                match incr_result.flatten() {
                    Some(score) => ctx.writer.write_bulk(Some(format_float(score).as_bytes())).await,
                    None => ctx.writer.write_null().await,
                }
            } else {
                ctx.writer.write_integer(if ch { changed } else { added }).await
            }
        }
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn zrem<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let result = ctx.db().mutate_if_exists(&args[0], |v| {
        let z = v.as_zset_mut()?;
        let mut removed = 0i64;
        for member in &args[1..] {
            if z.remove(member) {
                removed += 1;
            }
        }
        Ok(removed)
    });
    match result {
        Ok(Some(removed)) => {
            if removed > 0 {
                ctx.wal_append(b"ZREM", args);
            }
            ctx.writer.write_integer(removed).await
        }
        Ok(None) => ctx.writer.write_integer(0).await,
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn zscore<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let result = ctx.db().read(&args[0], |v| v.as_zset().map(|z| z.score(&args[1])));
    match result {
        Ok(Some(Some(score))) => ctx.writer.write_bulk(Some(format_float(score).as_bytes())).await,
        Ok(_) => ctx.writer.write_null().await,
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn zmscore<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let result = ctx.db().read(&args[0], |v| {
        let z = v.as_zset()?;
        Ok(args[1..].iter().map(|m| z.score(m)).collect::<Vec<_>>())
    });
    let scores = match result {
        Ok(Some(scores)) => scores,
        Ok(None) => vec![None; args.len() - 1],
        Err(e) => return reply_key_error(ctx.writer, e).await,
    };
    ctx.writer.write_array_header(scores.len() as i64).await?;
    for score in scores {
        match score {
            Some(s) => ctx.writer.write_bulk(Some(format_float(s).as_bytes())).await?,
            None => ctx.writer.write_null().await?,
        }
    }
    Ok(())
}

pub async fn zcard<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    match ctx.db().read(&args[0], |v| v.as_zset().map(|z| z.len())) {
        Ok(len) => ctx.writer.write_integer(len.unwrap_or(0) as i64).await,
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

fn parse_score_bound(raw: &[u8]) -> Result<(f64, bool), KeyError> {
    if let Some(stripped) = raw.strip_prefix(b"(") {
        Ok((parse_f64(stripped)?, true))
    } else {
        Ok((parse_f64(raw)?, false))
    }
}

pub async fn zcount<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let (min, _) = match parse_score_bound(&args[1]) {
        Ok(v) => v,
        Err(e) => return reply_key_error(ctx.writer, e).await,
    };
    let (max, _) = match parse_score_bound(&args[2]) {
        Ok(v) => v,
        Err(e) => return reply_key_error(ctx.writer, e).await,
    };
    match ctx.db().read(&args[0], |v| v.as_zset().map(|z| z.count_by_score(min, max))) {
        Ok(count) => ctx.writer.write_integer(count.unwrap_or(0) as i64).await,
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn zincrby<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let delta = match parse_f64(&args[1]) {
        Ok(n) => n,
        Err(e) => return reply_key_error(ctx.writer, e).await,
    };
    let result = ctx.db().mutate_or_create(
        &args[0],
        || Value::ZSet(ZSet::new()),
        |v| {
            let z = v.as_zset_mut()?;
            let updated = z.score(&args[2]).unwrap_or(0.0) + delta;
            if !updated.is_finite() {
                return Err(KeyError::NotFloat);
            }
            z.insert(args[2].to_vec(), updated);
            Ok(updated)
        },
    );
    match result {
        Ok(updated) => {
            ctx.wal_append(b"ZADD", args);
            ctx.writer.write_bulk(Some(format_float(updated).as_bytes())).await
        }
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn zrange<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes], rev: bool) -> io::Result<()> {
    let start = match parse_i64(&args[1]) {
        Ok(n) => n,
        Err(e) => return reply_key_error(ctx.writer, e).await,
    };
    let stop = match parse_i64(&args[2]) {
        Ok(n) => n,
        Err(e) => return reply_key_error(ctx.writer, e).await,
    };
    let with_scores = args.get(3).map(|a| eq_ci(a, "WITHSCORES")).unwrap_or(false);
    let result = ctx.db().read(&args[0], |v| v.as_zset().map(|z| z.range_by_rank(start, stop, rev)));
    match result {
        Ok(pairs) => write_pairs(ctx, &pairs.unwrap_or_default(), with_scores).await,
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn zrangebyscore<W: AsyncWrite + Unpin>(
    ctx: &mut CommandContext<'_, W>,
    args: &[Bytes],
    rev: bool,
) -> io::Result<()> {
    let (first, second) = if rev { (&args[2], &args[1]) } else { (&args[1], &args[2]) };
    let (min, min_excl) = match parse_score_bound(first) {
        Ok(v) => v,
        Err(e) => return reply_key_error(ctx.writer, e).await,
    };
    let (max, max_excl) = match parse_score_bound(second) {
        Ok(v) => v,
        Err(e) => return reply_key_error(ctx.writer, e).await,
    };
    let with_scores = args.iter().skip(3).any(|a| eq_ci(a, "WITHSCORES"));
    let limit = args
        .iter()
        .position(|a| eq_ci(a, "LIMIT"))
        .and_then(|i| args.get(i + 1).zip(args.get(i + 2)))
        .and_then(|(off, cnt)| Some((parse_i64(off).ok()?, parse_i64(cnt).ok()?)));

    let result = ctx
        .db()
        .read(&args[0], |v| v.as_zset().map(|z| z.range_by_score(min, max, min_excl, max_excl, rev)));
    match result {
        Ok(pairs) => {
            let mut pairs = pairs.unwrap_or_default();
            if let Some((offset, count)) = limit {
                let offset = offset.max(0) as usize;
                pairs = pairs.into_iter().skip(offset).collect();
                if count >= 0 {
                    pairs.truncate(count as usize);
                }
            }
            write_pairs(ctx, &pairs, with_scores).await
        }
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn zrank<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes], rev: bool) -> io::Result<()> {
    let result = ctx.db().read(&args[0], |v| {
        let z = v.as_zset()?;
        Ok(z.rank(&args[1]).map(|r| if rev { z.len() - 1 - r } else { r }))
    });
    match result {
        Ok(Some(Some(rank))) => ctx.writer.write_integer(rank as i64).await,
        Ok(_) => ctx.writer.write_null().await,
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn zremrangebyrank<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let start = match parse_i64(&args[1]) {
        Ok(n) => n,
        Err(e) => return reply_key_error(ctx.writer, e).await,
    };
    let stop = match parse_i64(&args[2]) {
        Ok(n) => n,
        Err(e) => return reply_key_error(ctx.writer, e).await,
    };
    let result = ctx.db().mutate_if_exists(&args[0], |v| {
        let z = v.as_zset_mut()?;
        Ok(z.remove_range_by_rank(start, stop))
    });
    match result {
        Ok(Some(removed)) => {
            if removed > 0 {
                ctx.wal_append(b"ZREMRANGEBYRANK", args);
            }
            ctx.writer.write_integer(removed as i64).await
        }
        Ok(None) => ctx.writer.write_integer(0).await,
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn zremrangebyscore<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let (min, _) = match parse_score_bound(&args[1]) {
        Ok(v) => v,
        Err(e) => return reply_key_error(ctx.writer, e).await,
    };
    let (max, _) = match parse_score_bound(&args[2]) {
        Ok(v) => v,
        Err(e) => return reply_key_error(ctx.writer, e).await,
    };
    let result = ctx.db().mutate_if_exists(&args[0], |v| {
        let z = v.as_zset_mut()?;
        Ok(z.remove_range_by_score(min, max))
    });
    match result {
        Ok(Some(removed)) => {
            if removed > 0 {
                ctx.wal_append(b"ZREMRANGEBYSCORE", args);
            }
            ctx.writer.write_integer(removed as i64).await
        }
        Ok(None) => ctx.writer.write_integer(0).await,
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

/// Shared body of `BZPOPMIN`/`BZPOPMAX`: `args` is one or more keys followed by a trailing
/// timeout. Mirrors the list family's blocking pattern (`lists::bpop`): register interest
/// before each re-check to avoid a lost wakeup.
pub async fn bzpop<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes], is_min: bool) -> io::Result<()> {
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
                let z = v.as_zset_mut()?;
                Ok(if is_min { z.pop_min() } else { z.pop_max() })
            });
            match result {
                Ok(Some(Some((member, score)))) => {
                    ctx.wal_append(b"ZREM", &[key.clone(), Bytes::copy_from_slice(&member)]);
                    ctx.writer.write_array_header(3).await?;
                    ctx.writer.write_bulk(Some(key)).await?;
                    ctx.writer.write_bulk(Some(&member)).await?;
                    return ctx.writer.write_bulk(Some(format_float(score).as_bytes())).await;
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
