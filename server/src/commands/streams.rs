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

//! Stream commands (§4.5, §4.6 STREAM): `XADD`/`XRANGE`/`XREAD` over the append log, plus the
//! consumer-group surface (`XREADGROUP`/`XACK`/`XCLAIM`/`XPENDING`/`XGROUP`/`XINFO`). Blocking
//! reads reuse the same database-wide `Notify` the list/zset blocking commands wait on (§9
//! allows this coarser granularity; `Stream` carries its own `Notify` too, but nothing outside
//! its own unit tests needs the finer-grained one).

use super::{eq_ci, parse_i64, reply_key_error, wrong_args, CommandContext};
use crate::{
    keyspace::{error::KeyError, value::Value},
    protocol::RespWriter,
    streams::{PendingDetail, Stream, StreamEntry, StreamId, XaddId},
};
use bytes::Bytes;
use std::{io, time::Duration};
use tokio::io::AsyncWrite;

fn parse_id_arg(raw: &[u8]) -> Result<StreamId, KeyError> {
    StreamId::parse(std::str::from_utf8(raw).map_err(|_| KeyError::SyntaxError)?)
}

fn parse_ids(raw: &[Bytes]) -> Result<Vec<StreamId>, KeyError> {
    raw.iter().map(|b| parse_id_arg(b)).collect()
}

/// Parses the `XADD`/`XGROUP CREATE`/`XGROUP SETID` ID grammar: `*`, `<ms>-*`, or `<ms>-<seq>`.
fn parse_xadd_id(raw: &[u8]) -> Result<XaddId, KeyError> {
    if raw == b"*" {
        return Ok(XaddId::Auto);
    }
    let s = std::str::from_utf8(raw).map_err(|_| KeyError::SyntaxError)?;
    match s.split_once('-') {
        Some((ms_part, "*")) => Ok(XaddId::AutoSeq(ms_part.parse().map_err(|_| KeyError::SyntaxError)?)),
        Some((ms_part, seq_part)) => Ok(XaddId::Explicit(StreamId {
            ms: ms_part.parse().map_err(|_| KeyError::SyntaxError)?,
            seq: seq_part.parse().map_err(|_| KeyError::SyntaxError)?,
        })),
        None => Ok(XaddId::Explicit(StreamId {
            ms: s.parse().map_err(|_| KeyError::SyntaxError)?,
            seq: 0,
        })),
    }
}

/// A range bound as written on the wire: `-`/`+` for the open ends, an optional `(` prefix for
/// exclusivity, and a bare `<ms>` filled out to the floor or ceiling sequence depending on
/// which end of the range it's read as (§4.5.3).
fn parse_bound(raw: &[u8], is_start: bool) -> Result<(StreamId, bool), KeyError> {
    let (exclusive, rest) = match raw.first() {
        Some(b'(') => (true, &raw[1..]),
        _ => (false, raw),
    };
    if rest == b"-" {
        return Ok((StreamId::MIN, exclusive));
    }
    if rest == b"+" {
        return Ok((StreamId::MAX, exclusive));
    }
    let s = std::str::from_utf8(rest).map_err(|_| KeyError::SyntaxError)?;
    let id = match s.split_once('-') {
        Some((ms, seq)) => StreamId {
            ms: ms.parse().map_err(|_| KeyError::SyntaxError)?,
            seq: seq.parse().map_err(|_| KeyError::SyntaxError)?,
        },
        None => StreamId {
            ms: s.parse().map_err(|_| KeyError::SyntaxError)?,
            seq: if is_start { 0 } else { u64::MAX },
        },
    };
    Ok((id, exclusive))
}

fn resolve_range(raw_start: &[u8], raw_end: &[u8]) -> Result<(StreamId, StreamId), KeyError> {
    let (start, start_excl) = parse_bound(raw_start, true)?;
    let (end, end_excl) = parse_bound(raw_end, false)?;
    let lower = if start_excl { start.next() } else { start };
    let upper = if end_excl { end.prev() } else { end };
    Ok((lower, upper))
}

struct TrimSpec {
    by_minid: bool,
    threshold: Bytes,
}

/// Parses a `MAXLEN|MINID [~|=] threshold [LIMIT n]` clause, returning the spec and the number
/// of argument slots it consumed.
fn parse_trim_spec(args: &[Bytes]) -> Result<(TrimSpec, usize), KeyError> {
    if args.is_empty() {
        return Err(KeyError::SyntaxError);
    }
    let by_minid = if eq_ci(&args[0], "MAXLEN") {
        false
    } else if eq_ci(&args[0], "MINID") {
        true
    } else {
        return Err(KeyError::SyntaxError);
    };
    let mut i = 1;
    if args.get(i).map(|a| a.as_ref() == b"~" || a.as_ref() == b"=").unwrap_or(false) {
        i += 1;
    }
    let threshold = args.get(i).ok_or(KeyError::SyntaxError)?.clone();
    i += 1;
    // `LIMIT n` is only a bulk-drop hint for approximate trimming; this implementation always
    // trims exactly, so the count is parsed (for arity/syntax fidelity) and otherwise ignored.
    if i + 1 < args.len() && eq_ci(&args[i], "LIMIT") {
        let _ = parse_i64(&args[i + 1]).map_err(|_| KeyError::SyntaxError)?;
        i += 2;
    }
    Ok((TrimSpec { by_minid, threshold }, i))
}

fn apply_trim(s: &mut Stream, spec: &TrimSpec) -> Result<usize, KeyError> {
    if spec.by_minid {
        let id = parse_id_arg(&spec.threshold)?;
        Ok(s.trim_to_minid(id))
    } else {
        let n: usize = std::str::from_utf8(&spec.threshold)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(KeyError::NotInteger)?;
        Ok(s.trim_to_maxlen(n))
    }
}

async fn write_single_entry<W: AsyncWrite + Unpin>(writer: &mut RespWriter<W>, entry: &StreamEntry) -> io::Result<()> {
    writer.write_array_header(2).await?;
    writer.write_bulk(Some(entry.id.to_string().as_bytes())).await?;
    writer.write_array_header(entry.fields.len() as i64 * 2).await?;
    for (field, value) in &entry.fields {
        writer.write_bulk(Some(field)).await?;
        writer.write_bulk(Some(value)).await?;
    }
    Ok(())
}

async fn write_stream_entries<W: AsyncWrite + Unpin>(writer: &mut RespWriter<W>, entries: &[StreamEntry]) -> io::Result<()> {
    writer.write_array_header(entries.len() as i64).await?;
    for entry in entries {
        write_single_entry(writer, entry).await?;
    }
    Ok(())
}

/// `XREAD`/`XREADGROUP`'s top-level reply: a map of stream name to its entries under RESP3, or
/// the equivalent nested `[[name, entries], ...]` array under RESP2 (§4.1's map-degrades-to-
/// flat-array rule does *not* apply here — the RESP2 shape nests one level, it doesn't flatten).
async fn write_xread_reply<W: AsyncWrite + Unpin>(
    writer: &mut RespWriter<W>,
    out: &[(Vec<u8>, Vec<StreamEntry>)],
) -> io::Result<()> {
    if out.is_empty() {
        return writer.write_array_header(-1).await;
    }
    if writer.proto.is_resp3() {
        writer.write_map_header(out.len()).await?;
    } else {
        writer.write_array_header(out.len() as i64).await?;
    }
    for (key, entries) in out {
        if !writer.proto.is_resp3() {
            writer.write_array_header(2).await?;
        }
        writer.write_bulk(Some(key)).await?;
        write_stream_entries(writer, entries).await?;
    }
    Ok(())
}

async fn no_group_error<W: AsyncWrite + Unpin>(writer: &mut RespWriter<W>, key: &[u8], group: &[u8]) -> io::Result<()> {
    writer
        .write_error(&format!(
            "NOGROUP No such key '{}' or consumer group '{}' in XREADGROUP with GROUP option",
            String::from_utf8_lossy(key),
            String::from_utf8_lossy(group)
        ))
        .await
}

pub async fn xadd<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let key = &args[0];
    let mut i = 1;
    let nomkstream = args.get(i).map(|a| eq_ci(a, "NOMKSTREAM")).unwrap_or(false);
    if nomkstream {
        i += 1;
    }
    let trim = if args.get(i).map(|a| eq_ci(a, "MAXLEN") || eq_ci(a, "MINID")).unwrap_or(false) {
        match parse_trim_spec(&args[i..]) {
            Ok((spec, consumed)) => {
                i += consumed;
                Some(spec)
            }
            Err(e) => return reply_key_error(ctx.writer, e).await,
        }
    } else {
        None
    };
    let Some(id_arg) = args.get(i) else {
        return wrong_args(ctx.writer, "XADD").await;
    };
    let requested = match parse_xadd_id(id_arg) {
        Ok(v) => v,
        Err(e) => return reply_key_error(ctx.writer, e).await,
    };
    i += 1;
    let rest = &args[i..];
    if rest.is_empty() || rest.len() % 2 != 0 {
        return wrong_args(ctx.writer, "XADD").await;
    }
    let fields: Vec<(Vec<u8>, Vec<u8>)> = rest.chunks(2).map(|c| (c[0].to_vec(), c[1].to_vec())).collect();

    if nomkstream && ctx.db().type_of(key).is_none() {
        return ctx.writer.write_null().await;
    }

    let result = ctx.db().mutate_or_create(
        key,
        || Value::Stream(Stream::new()),
        |v| {
            let s = v.as_stream_mut()?;
            let id = s.append(requested, fields)?;
            if let Some(spec) = &trim {
                apply_trim(s, spec)?;
            }
            Ok(id)
        },
    );
    match result {
        Ok(id) => {
            ctx.wal_append(b"XADD", args);
            ctx.writer.write_bulk(Some(id.to_string().as_bytes())).await
        }
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn xlen<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    match ctx.db().read(&args[0], |v| v.as_stream().map(|s| s.len())) {
        Ok(len) => ctx.writer.write_integer(len.unwrap_or(0) as i64).await,
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn xrange<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes], rev: bool) -> io::Result<()> {
    let key = &args[0];
    let (raw_start, raw_end) = if rev { (&args[2], &args[1]) } else { (&args[1], &args[2]) };
    let (lower, upper) = match resolve_range(raw_start, raw_end) {
        Ok(v) => v,
        Err(e) => return reply_key_error(ctx.writer, e).await,
    };
    let count = if args.len() > 3 && eq_ci(&args[3], "COUNT") {
        match args.get(4).and_then(|a| parse_i64(a).ok()) {
            Some(n) if n >= 0 => Some(n as usize),
            _ => return reply_key_error(ctx.writer, KeyError::SyntaxError).await,
        }
    } else {
        None
    };
    let result = ctx.db().read(key, |v| {
        let s = v.as_stream()?;
        Ok(if rev {
            s.range_rev(upper, lower, count)
        } else {
            s.range(lower, upper, false, count)
        })
    });
    match result {
        Ok(entries) => write_stream_entries(ctx.writer, &entries.unwrap_or_default()).await,
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn xread<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let mut i = 0;
    let mut count = None;
    let mut block: Option<Duration> = None;
    loop {
        let Some(tok) = args.get(i) else {
            return reply_key_error(ctx.writer, KeyError::SyntaxError).await;
        };
        if eq_ci(tok, "COUNT") {
            count = match args.get(i + 1).and_then(|a| parse_i64(a).ok()) {
                Some(n) if n >= 0 => Some(n as usize),
                _ => return reply_key_error(ctx.writer, KeyError::SyntaxError).await,
            };
            i += 2;
        } else if eq_ci(tok, "BLOCK") {
            let ms = match args.get(i + 1).and_then(|a| parse_i64(a).ok()) {
                Some(n) if n >= 0 => n,
                _ => return reply_key_error(ctx.writer, KeyError::SyntaxError).await,
            };
            block = Some(Duration::from_millis(ms as u64));
            i += 2;
        } else if eq_ci(tok, "STREAMS") {
            i += 1;
            break;
        } else {
            return reply_key_error(ctx.writer, KeyError::SyntaxError).await;
        }
    }
    let remaining = &args[i..];
    if remaining.is_empty() || remaining.len() % 2 != 0 {
        return ctx
            .writer
            .write_error("ERR Unbalanced XREAD list of streams: for each stream key an ID or '$' must be specified.")
            .await;
    }
    let n = remaining.len() / 2;
    let keys = &remaining[..n];
    let id_args = &remaining[n..];

    // `$` resolves to "whatever last_id is right now" once, at call time — a later XADD from
    // another connection always counts as "after" it, matching §4.5.3.
    let mut starts = Vec::with_capacity(n);
    for (key, id_arg) in keys.iter().zip(id_args.iter()) {
        let start = if id_arg.as_ref() == b"$" {
            match ctx.db().read(key, |v| v.as_stream().map(|s| s.last_id)) {
                Ok(last) => last.unwrap_or(StreamId::MIN),
                Err(e) => return reply_key_error(ctx.writer, e).await,
            }
        } else {
            match parse_id_arg(id_arg) {
                Ok(id) => id,
                Err(e) => return reply_key_error(ctx.writer, e).await,
            }
        };
        starts.push(start);
    }

    loop {
        let notified = ctx.db().notified();
        let mut out: Vec<(Vec<u8>, Vec<StreamEntry>)> = Vec::new();
        for (key, start) in keys.iter().zip(starts.iter()) {
            let result = ctx.db().read(key, |v| {
                let s = v.as_stream()?;
                Ok(s.range(*start, StreamId::MAX, true, count))
            });
            match result {
                Ok(Some(entries)) if !entries.is_empty() => out.push((key.to_vec(), entries)),
                Ok(_) => {}
                Err(e) => return reply_key_error(ctx.writer, e).await,
            }
        }
        if !out.is_empty() {
            return write_xread_reply(ctx.writer, &out).await;
        }
        if ctx.replaying {
            return ctx.writer.write_array_header(-1).await;
        }
        match block {
            None => return ctx.writer.write_array_header(-1).await,
            Some(d) if d.is_zero() => notified.await,
            Some(d) => {
                if tokio::time::timeout(d, notified).await.is_err() {
                    return ctx.writer.write_array_header(-1).await;
                }
            }
        }
    }
}

pub async fn xreadgroup<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    if args.len() < 4 || !eq_ci(&args[0], "GROUP") {
        return reply_key_error(ctx.writer, KeyError::SyntaxError).await;
    }
    let group = args[1].to_vec();
    let consumer = args[2].to_vec();
    let mut i = 3;
    let mut count = None;
    let mut block: Option<Duration> = None;
    let mut noack = false;
    loop {
        let Some(tok) = args.get(i) else {
            return reply_key_error(ctx.writer, KeyError::SyntaxError).await;
        };
        if eq_ci(tok, "COUNT") {
            count = match args.get(i + 1).and_then(|a| parse_i64(a).ok()) {
                Some(n) if n >= 0 => Some(n as usize),
                _ => return reply_key_error(ctx.writer, KeyError::SyntaxError).await,
            };
            i += 2;
        } else if eq_ci(tok, "BLOCK") {
            let ms = match args.get(i + 1).and_then(|a| parse_i64(a).ok()) {
                Some(n) if n >= 0 => n,
                _ => return reply_key_error(ctx.writer, KeyError::SyntaxError).await,
            };
            block = Some(Duration::from_millis(ms as u64));
            i += 2;
        } else if eq_ci(tok, "NOACK") {
            noack = true;
            i += 1;
        } else if eq_ci(tok, "STREAMS") {
            i += 1;
            break;
        } else {
            return reply_key_error(ctx.writer, KeyError::SyntaxError).await;
        }
    }
    let remaining = &args[i..];
    if remaining.is_empty() || remaining.len() % 2 != 0 {
        return ctx
            .writer
            .write_error("ERR Unbalanced XREADGROUP list of streams: for each stream key an ID or '>' must be specified.")
            .await;
    }
    let n = remaining.len() / 2;
    let keys = &remaining[..n];
    let id_args = &remaining[n..];
    // Blocking only ever applies to a pure "give me new messages" read; a call that mixes in
    // an explicit (history) ID always resolves on the first pass, matching the practical case
    // (BLOCK is essentially only ever used with `>` for every stream in the call).
    let all_new = id_args.iter().all(|a| a.as_ref() == b">");
    let mut wrote_any = false;

    loop {
        let notified = ctx.db().notified();
        let mut out: Vec<(Vec<u8>, Vec<StreamEntry>)> = Vec::new();
        for (key, id_arg) in keys.iter().zip(id_args.iter()) {
            if id_arg.as_ref() == b">" {
                let result = ctx.db().mutate_if_exists(key, |v| {
                    let s = v.as_stream_mut()?;
                    let entries = s.read_group(&group, consumer.clone(), count)?;
                    if noack {
                        let ids: Vec<StreamId> = entries.iter().map(|e| e.id).collect();
                        s.ack(&group, &ids);
                    }
                    Ok(entries)
                });
                match result {
                    Ok(Some(entries)) => {
                        wrote_any = true;
                        if !entries.is_empty() {
                            out.push((key.to_vec(), entries));
                        }
                    }
                    Ok(None) | Err(KeyError::NoSuchKey) => return no_group_error(ctx.writer, key, &group).await,
                    Err(e) => return reply_key_error(ctx.writer, e).await,
                }
            } else {
                let id = match parse_id_arg(id_arg) {
                    Ok(id) => id,
                    Err(e) => return reply_key_error(ctx.writer, e).await,
                };
                let result = ctx.db().read(key, |v| {
                    let s = v.as_stream()?;
                    s.read_group_history(&group, &consumer, id)
                });
                match result {
                    Ok(Some(entries)) => {
                        wrote_any = true;
                        out.push((key.to_vec(), entries));
                    }
                    Ok(None) | Err(KeyError::NoSuchKey) => return no_group_error(ctx.writer, key, &group).await,
                    Err(e) => return reply_key_error(ctx.writer, e).await,
                }
            }
        }
        if !out.is_empty() || !all_new {
            if wrote_any {
                ctx.wal_append(b"XREADGROUP", args);
            }
            return write_xread_reply(ctx.writer, &out).await;
        }
        if ctx.replaying {
            return ctx.writer.write_array_header(-1).await;
        }
        match block {
            None => return ctx.writer.write_array_header(-1).await,
            Some(d) if d.is_zero() => notified.await,
            Some(d) => {
                if tokio::time::timeout(d, notified).await.is_err() {
                    return ctx.writer.write_array_header(-1).await;
                }
            }
        }
    }
}

pub async fn xack<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let ids = match parse_ids(&args[2..]) {
        Ok(v) => v,
        Err(e) => return reply_key_error(ctx.writer, e).await,
    };
    let result = ctx.db().mutate_if_exists(&args[0], |v| {
        let s = v.as_stream_mut()?;
        Ok(s.ack(&args[1], &ids))
    });
    match result {
        Ok(Some(n)) => {
            if n > 0 {
                ctx.wal_append(b"XACK", args);
            }
            ctx.writer.write_integer(n as i64).await
        }
        Ok(None) => ctx.writer.write_integer(0).await,
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

fn is_xclaim_keyword(b: &[u8]) -> bool {
    ["IDLE", "TIME", "RETRYCOUNT", "FORCE", "JUSTID", "LASTID"]
        .iter()
        .any(|k| eq_ci(b, k))
}

pub async fn xclaim<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let key = &args[0];
    let group = args[1].to_vec();
    let consumer = args[2].to_vec();
    let min_idle_ms = match parse_i64(&args[3]) {
        Ok(n) if n >= 0 => n as u64,
        _ => return reply_key_error(ctx.writer, KeyError::OutOfRange).await,
    };
    let mut i = 4;
    let mut ids = Vec::new();
    while i < args.len() && !is_xclaim_keyword(&args[i]) {
        match parse_id_arg(&args[i]) {
            Ok(id) => ids.push(id),
            Err(e) => return reply_key_error(ctx.writer, e).await,
        }
        i += 1;
    }
    if ids.is_empty() {
        return wrong_args(ctx.writer, "XCLAIM").await;
    }
    let mut justid = false;
    let mut force = false;
    let mut idle_override = None;
    let mut retrycount_override = None;
    while i < args.len() {
        if eq_ci(&args[i], "JUSTID") {
            justid = true;
            i += 1;
        } else if eq_ci(&args[i], "FORCE") {
            force = true;
            i += 1;
        } else if eq_ci(&args[i], "IDLE") {
            let ms = match args.get(i + 1).and_then(|a| parse_i64(a).ok()) {
                Some(n) if n >= 0 => n as u64,
                _ => return reply_key_error(ctx.writer, KeyError::SyntaxError).await,
            };
            idle_override = Some(Duration::from_millis(ms));
            i += 2;
        } else if eq_ci(&args[i], "TIME") {
            // Absolute delivery timestamp override; not modeled separately from IDLE.
            if args.get(i + 1).and_then(|a| parse_i64(a).ok()).is_none() {
                return reply_key_error(ctx.writer, KeyError::SyntaxError).await;
            }
            i += 2;
        } else if eq_ci(&args[i], "RETRYCOUNT") {
            let n = match args.get(i + 1).and_then(|a| parse_i64(a).ok()) {
                Some(n) if n >= 0 => n as u64,
                _ => return reply_key_error(ctx.writer, KeyError::SyntaxError).await,
            };
            retrycount_override = Some(n);
            i += 2;
        } else if eq_ci(&args[i], "LASTID") {
            if args.get(i + 1).is_none() {
                return reply_key_error(ctx.writer, KeyError::SyntaxError).await;
            }
            i += 2;
        } else {
            return reply_key_error(ctx.writer, KeyError::SyntaxError).await;
        }
    }

    let result = ctx.db().mutate_if_exists(key, |v| {
        let s = v.as_stream_mut()?;
        s.claim(
            &group,
            consumer.clone(),
            &ids,
            Duration::from_millis(min_idle_ms),
            force,
            idle_override,
            retrycount_override,
        )
    });
    match result {
        Ok(Some(entries)) => {
            ctx.wal_append(b"XCLAIM", args);
            if justid {
                ctx.writer.write_array_header(entries.len() as i64).await?;
                for entry in &entries {
                    ctx.writer.write_bulk(Some(entry.id.to_string().as_bytes())).await?;
                }
                Ok(())
            } else {
                write_stream_entries(ctx.writer, &entries).await
            }
        }
        Ok(None) => ctx.writer.write_array_header(0).await,
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn xpending<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let key = &args[0];
    let group = args[1].to_vec();
    if args.len() == 2 {
        let summary = ctx.db().read(key, |v| {
            let s = v.as_stream()?;
            s.pending_summary(&group)
        });
        let (count, lo, hi) = match summary {
            Ok(Some(v)) => v,
            Ok(None) | Err(KeyError::NoSuchKey) => return no_group_error(ctx.writer, key, &group).await,
            Err(e) => return reply_key_error(ctx.writer, e).await,
        };
        ctx.writer.write_array_header(4).await?;
        ctx.writer.write_integer(count as i64).await?;
        match lo {
            Some(id) => ctx.writer.write_bulk(Some(id.to_string().as_bytes())).await?,
            None => ctx.writer.write_null().await?,
        }
        match hi {
            Some(id) => ctx.writer.write_bulk(Some(id.to_string().as_bytes())).await?,
            None => ctx.writer.write_null().await?,
        }
        if count == 0 {
            return ctx.writer.write_array_header(-1).await;
        }
        let breakdown = ctx.db().read(key, |v| {
            let s = v.as_stream()?;
            s.pending_by_consumer(&group)
        });
        let list = breakdown.ok().flatten().unwrap_or_default();
        ctx.writer.write_array_header(list.len() as i64).await?;
        for (consumer, n) in list {
            ctx.writer.write_array_header(2).await?;
            ctx.writer.write_bulk(Some(&consumer)).await?;
            ctx.writer.write_bulk(Some(n.to_string().as_bytes())).await?;
        }
        Ok(())
    } else {
        let mut i = 2;
        let mut idle_filter = None;
        if eq_ci(&args[i], "IDLE") {
            let ms = match args.get(i + 1).and_then(|a| parse_i64(a).ok()) {
                Some(n) if n >= 0 => n as u64,
                _ => return reply_key_error(ctx.writer, KeyError::SyntaxError).await,
            };
            idle_filter = Some(Duration::from_millis(ms));
            i += 2;
        }
        if i + 2 >= args.len() {
            return reply_key_error(ctx.writer, KeyError::SyntaxError).await;
        }
        let (lower, upper) = match resolve_range(&args[i], &args[i + 1]) {
            Ok(v) => v,
            Err(e) => return reply_key_error(ctx.writer, e).await,
        };
        let count = match parse_i64(&args[i + 2]) {
            Ok(n) if n >= 0 => n as usize,
            _ => return reply_key_error(ctx.writer, KeyError::OutOfRange).await,
        };
        let consumer_filter = args.get(i + 3).map(|b| b.to_vec());

        let result = ctx.db().read(key, |v| {
            let s = v.as_stream()?;
            s.pending_range(&group, lower, upper, count, consumer_filter.as_deref(), idle_filter)
        });
        let list: Vec<PendingDetail> = match result {
            Ok(Some(v)) => v,
            Ok(None) | Err(KeyError::NoSuchKey) => return no_group_error(ctx.writer, key, &group).await,
            Err(e) => return reply_key_error(ctx.writer, e).await,
        };
        ctx.writer.write_array_header(list.len() as i64).await?;
        for entry in list {
            ctx.writer.write_array_header(4).await?;
            ctx.writer.write_bulk(Some(entry.id.to_string().as_bytes())).await?;
            ctx.writer.write_bulk(Some(&entry.consumer)).await?;
            ctx.writer.write_integer(entry.idle_ms as i64).await?;
            ctx.writer.write_integer(entry.delivery_count as i64).await?;
        }
        Ok(())
    }
}

pub async fn xinfo<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    if eq_ci(&args[0], "STREAM") {
        let Some(key) = args.get(1) else {
            return wrong_args(ctx.writer, "XINFO").await;
        };
        let result = ctx.db().read(key, |v| {
            let s = v.as_stream()?;
            Ok((
                s.len(),
                s.last_id,
                s.max_deleted_id,
                s.entries_added,
                s.group_count(),
                s.first_entry(),
                s.last_entry(),
            ))
        });
        match result {
            Ok(Some((len, last_id, max_deleted, added, groups, first, last))) => {
                ctx.writer.write_map_header(7).await?;
                ctx.writer.write_bulk(Some(b"length")).await?;
                ctx.writer.write_integer(len as i64).await?;
                ctx.writer.write_bulk(Some(b"last-generated-id")).await?;
                ctx.writer.write_bulk(Some(last_id.to_string().as_bytes())).await?;
                ctx.writer.write_bulk(Some(b"max-deleted-entry-id")).await?;
                ctx.writer.write_bulk(Some(max_deleted.to_string().as_bytes())).await?;
                ctx.writer.write_bulk(Some(b"entries-added")).await?;
                ctx.writer.write_integer(added as i64).await?;
                ctx.writer.write_bulk(Some(b"groups")).await?;
                ctx.writer.write_integer(groups as i64).await?;
                ctx.writer.write_bulk(Some(b"first-entry")).await?;
                match first {
                    Some(e) => write_single_entry(ctx.writer, &e).await?,
                    None => ctx.writer.write_null().await?,
                }
                ctx.writer.write_bulk(Some(b"last-entry")).await?;
                match last {
                    Some(e) => write_single_entry(ctx.writer, &e).await?,
                    None => ctx.writer.write_null().await?,
                }
                Ok(())
            }
            Ok(None) => ctx.writer.write_error("ERR no such key").await,
            Err(e) => reply_key_error(ctx.writer, e).await,
        }
    } else if eq_ci(&args[0], "GROUPS") {
        let Some(key) = args.get(1) else {
            return wrong_args(ctx.writer, "XINFO").await;
        };
        let result = ctx.db().read(key, |v| v.as_stream().map(|s| s.group_infos()));
        match result {
            Ok(Some(groups)) => {
                ctx.writer.write_array_header(groups.len() as i64).await?;
                for g in groups {
                    ctx.writer.write_map_header(4).await?;
                    ctx.writer.write_bulk(Some(b"name")).await?;
                    ctx.writer.write_bulk(Some(&g.name)).await?;
                    ctx.writer.write_bulk(Some(b"consumers")).await?;
                    ctx.writer.write_integer(g.consumers as i64).await?;
                    ctx.writer.write_bulk(Some(b"pending")).await?;
                    ctx.writer.write_integer(g.pending as i64).await?;
                    ctx.writer.write_bulk(Some(b"last-delivered-id")).await?;
                    ctx.writer.write_bulk(Some(g.last_delivered.to_string().as_bytes())).await?;
                }
                Ok(())
            }
            Ok(None) => ctx.writer.write_error("ERR no such key").await,
            Err(e) => reply_key_error(ctx.writer, e).await,
        }
    } else if eq_ci(&args[0], "CONSUMERS") {
        let (Some(key), Some(group)) = (args.get(1), args.get(2)) else {
            return wrong_args(ctx.writer, "XINFO").await;
        };
        let result = ctx.db().read(key, |v| {
            let s = v.as_stream()?;
            s.consumer_infos(group)
        });
        match result {
            Ok(Some(consumers)) => {
                ctx.writer.write_array_header(consumers.len() as i64).await?;
                for c in consumers {
                    ctx.writer.write_map_header(3).await?;
                    ctx.writer.write_bulk(Some(b"name")).await?;
                    ctx.writer.write_bulk(Some(&c.name)).await?;
                    ctx.writer.write_bulk(Some(b"pending")).await?;
                    ctx.writer.write_integer(c.pending as i64).await?;
                    ctx.writer.write_bulk(Some(b"idle")).await?;
                    ctx.writer.write_integer(c.idle_ms as i64).await?;
                }
                Ok(())
            }
            Ok(None) | Err(KeyError::NoSuchKey) => no_group_error(ctx.writer, key, group).await,
            Err(e) => reply_key_error(ctx.writer, e).await,
        }
    } else {
        ctx.writer
            .write_error(&format!("ERR unknown XINFO subcommand '{}'", String::from_utf8_lossy(&args[0])))
            .await
    }
}

pub async fn xgroup<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let sub = &args[0];
    if eq_ci(sub, "CREATE") {
        if args.len() < 4 {
            return wrong_args(ctx.writer, "XGROUP").await;
        }
        let key = &args[1];
        let group = args[2].to_vec();
        let mkstream = args[4..].iter().any(|a| eq_ci(a, "MKSTREAM"));
        if !mkstream && ctx.db().type_of(key).is_none() {
            return ctx
                .writer
                .write_error(
                    "ERR The XGROUP subcommand requires the key to exist. Note that for CREATE you may want \
                     to use the MKSTREAM option to create an empty stream automatically.",
                )
                .await;
        }
        let start_after = if args[3].as_ref() == b"$" {
            match ctx.db().read(key, |v| v.as_stream().map(|s| s.last_id)) {
                Ok(last) => last.unwrap_or(StreamId::MIN),
                Err(e) => return reply_key_error(ctx.writer, e).await,
            }
        } else {
            match parse_id_arg(&args[3]) {
                Ok(id) => id,
                Err(e) => return reply_key_error(ctx.writer, e).await,
            }
        };
        let result = ctx.db().mutate_or_create(key, || Value::Stream(Stream::new()), |v| {
            let s = v.as_stream_mut()?;
            s.create_group(group.clone(), start_after)
        });
        match result {
            Ok(()) => {
                ctx.wal_append(b"XGROUP", args);
                ctx.writer.write_simple_string("OK").await
            }
            Err(e) => reply_key_error(ctx.writer, e).await,
        }
    } else if eq_ci(sub, "SETID") {
        if args.len() < 4 {
            return wrong_args(ctx.writer, "XGROUP").await;
        }
        let key = &args[1];
        let group = args[2].to_vec();
        let target = if args[3].as_ref() == b"$" {
            match ctx.db().read(key, |v| v.as_stream().map(|s| s.last_id)) {
                Ok(last) => last.unwrap_or(StreamId::MIN),
                Err(e) => return reply_key_error(ctx.writer, e).await,
            }
        } else {
            match parse_id_arg(&args[3]) {
                Ok(id) => id,
                Err(e) => return reply_key_error(ctx.writer, e).await,
            }
        };
        let result = ctx.db().mutate_if_exists(key, |v| {
            let s = v.as_stream_mut()?;
            s.set_group_cursor(&group, target)
        });
        match result {
            Ok(Some(true)) => {
                ctx.wal_append(b"XGROUP", args);
                ctx.writer.write_simple_string("OK").await
            }
            Ok(Some(false)) | Ok(None) => no_group_error(ctx.writer, key, &group).await,
            Err(e) => reply_key_error(ctx.writer, e).await,
        }
    } else if eq_ci(sub, "DESTROY") {
        if args.len() < 3 {
            return wrong_args(ctx.writer, "XGROUP").await;
        }
        let key = &args[1];
        let result = ctx.db().mutate_if_exists(key, |v| {
            let s = v.as_stream_mut()?;
            Ok(s.destroy_group(&args[2]))
        });
        match result {
            Ok(Some(destroyed)) => {
                if destroyed {
                    ctx.wal_append(b"XGROUP", args);
                }
                ctx.writer.write_integer(destroyed as i64).await
            }
            Ok(None) => ctx.writer.write_integer(0).await,
            Err(e) => reply_key_error(ctx.writer, e).await,
        }
    } else if eq_ci(sub, "CREATECONSUMER") {
        if args.len() < 4 {
            return wrong_args(ctx.writer, "XGROUP").await;
        }
        let key = &args[1];
        let group = args[2].to_vec();
        let consumer = args[3].to_vec();
        let result = ctx.db().mutate_if_exists(key, |v| {
            let s = v.as_stream_mut()?;
            s.create_consumer(&group, consumer.clone())
        });
        match result {
            Ok(Some(created)) => {
                if created {
                    ctx.wal_append(b"XGROUP", args);
                }
                ctx.writer.write_integer(created as i64).await
            }
            Ok(None) | Err(KeyError::NoSuchKey) => no_group_error(ctx.writer, key, &group).await,
            Err(e) => reply_key_error(ctx.writer, e).await,
        }
    } else if eq_ci(sub, "DELCONSUMER") {
        if args.len() < 4 {
            return wrong_args(ctx.writer, "XGROUP").await;
        }
        let key = &args[1];
        let group = args[2].to_vec();
        let result = ctx.db().mutate_if_exists(key, |v| {
            let s = v.as_stream_mut()?;
            s.delete_consumer(&group, &args[3])
        });
        match result {
            Ok(Some(pending)) => {
                ctx.wal_append(b"XGROUP", args);
                ctx.writer.write_integer(pending as i64).await
            }
            Ok(None) | Err(KeyError::NoSuchKey) => no_group_error(ctx.writer, key, &group).await,
            Err(e) => reply_key_error(ctx.writer, e).await,
        }
    } else {
        ctx.writer
            .write_error(&format!("ERR unknown XGROUP subcommand '{}'", String::from_utf8_lossy(sub)))
            .await
    }
}

pub async fn xdel<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let ids = match parse_ids(&args[1..]) {
        Ok(v) => v,
        Err(e) => return reply_key_error(ctx.writer, e).await,
    };
    let result = ctx.db().mutate_if_exists(&args[0], |v| {
        let s = v.as_stream_mut()?;
        Ok(s.delete(&ids))
    });
    match result {
        Ok(Some(n)) => {
            if n > 0 {
                ctx.wal_append(b"XDEL", args);
            }
            ctx.writer.write_integer(n as i64).await
        }
        Ok(None) => ctx.writer.write_integer(0).await,
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn xtrim<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let (spec, _) = match parse_trim_spec(&args[1..]) {
        Ok(v) => v,
        Err(e) => return reply_key_error(ctx.writer, e).await,
    };
    let result = ctx.db().mutate_if_exists(&args[0], |v| {
        let s = v.as_stream_mut()?;
        apply_trim(s, &spec)
    });
    match result {
        Ok(Some(n)) => {
            if n > 0 {
                ctx.wal_append(b"XTRIM", args);
            }
            ctx.writer.write_integer(n as i64).await
        }
        Ok(None) => ctx.writer.write_integer(0).await,
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}
