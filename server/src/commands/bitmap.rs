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

//! Bitmap commands (§4.6 BITMAP). Bitmaps are plain strings (`Value::Str`) addressed bit by
//! bit; `BITFIELD`'s subcommands are applied strictly left to right against the same buffer
//! (see DESIGN.md) rather than being staged and committed atomically as one group.

use super::{eq_ci, parse_i64, reply_key_error, CommandContext};
use crate::keyspace::{error::KeyError, value::Value};
use bytes::Bytes;
use std::io;
use tokio::io::AsyncWrite;

fn get_bit(buf: &[u8], pos: usize) -> u8 {
    let byte = pos / 8;
    if byte >= buf.len() {
        0
    } else {
        (buf[byte] >> (7 - pos % 8)) & 1
    }
}

fn set_bit(buf: &mut Vec<u8>, pos: usize, bit: u8) -> u8 {
    let byte = pos / 8;
    if byte >= buf.len() {
        buf.resize(byte + 1, 0);
    }
    let mask = 1u8 << (7 - pos % 8);
    let old = (buf[byte] & mask != 0) as u8;
    if bit != 0 {
        buf[byte] |= mask;
    } else {
        buf[byte] &= !mask;
    }
    old
}

pub async fn setbit<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let pos = match parse_i64(&args[1]) {
        Ok(n) if n >= 0 => n as usize,
        _ => return reply_key_error(ctx.writer, KeyError::OutOfRange).await,
    };
    let bit = match args[2].as_ref() {
        b"0" => 0u8,
        b"1" => 1u8,
        _ => return reply_key_error(ctx.writer, KeyError::SyntaxError).await,
    };
    let result = ctx.db().mutate_or_create(
        &args[0],
        || Value::Str(Vec::new()),
        |v| {
            let s = v.as_str_mut()?;
            Ok(set_bit(s, pos, bit))
        },
    );
    match result {
        Ok(old) => {
            ctx.wal_append(b"SETBIT", args);
            ctx.writer.write_integer(old as i64).await
        }
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn getbit<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let pos = match parse_i64(&args[1]) {
        Ok(n) if n >= 0 => n as usize,
        _ => return reply_key_error(ctx.writer, KeyError::OutOfRange).await,
    };
    let result = ctx.db().read(&args[0], |v| v.as_str().map(|s| get_bit(s, pos)));
    match result {
        Ok(bit) => ctx.writer.write_integer(bit.unwrap_or(0) as i64).await,
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn bitcount<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let bit_range = args.get(3).map(|a| eq_ci(a, "BIT")).unwrap_or(false);
    let byte_range = match (args.get(1), args.get(2)) {
        (Some(s), Some(e)) => {
            let start = match parse_i64(s) {
                Ok(n) => n,
                Err(e) => return reply_key_error(ctx.writer, e).await,
            };
            let end = match parse_i64(e) {
                Ok(n) => n,
                Err(e) => return reply_key_error(ctx.writer, e).await,
            };
            Some((start, end))
        }
        _ => None,
    };
    let result = ctx.db().read(&args[0], |v| {
        let s = v.as_str()?;
        let total_bits = s.len() * 8;
        let count = match byte_range {
            None => s.iter().map(|b| b.count_ones() as i64).sum(),
            Some((start, end)) => {
                let unit_len = if bit_range { total_bits } else { s.len() };
                let norm = |i: i64| -> i64 {
                    if i < 0 {
                        (unit_len as i64 + i).max(0)
                    } else {
                        i
                    }
                };
                let lo = norm(start).min(unit_len as i64 - 1).max(0);
                let hi = norm(end).min(unit_len as i64 - 1);
                if unit_len == 0 || hi < lo {
                    0
                } else if bit_range {
                    (lo..=hi).map(|p| get_bit(s, p as usize) as i64).sum()
                } else {
                    s[lo as usize..=hi as usize].iter().map(|b| b.count_ones() as i64).sum()
                }
            }
        };
        Ok(count)
    });
    match result {
        Ok(count) => ctx.writer.write_integer(count.unwrap_or(0)).await,
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn bitpos<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let target_bit = match args[1].as_ref() {
        b"0" => 0u8,
        b"1" => 1u8,
        _ => return reply_key_error(ctx.writer, KeyError::SyntaxError).await,
    };
    let bit_range = args.get(4).map(|a| eq_ci(a, "BIT")).unwrap_or(false);
    let start_arg = args.get(2).map(|a| parse_i64(a));
    let end_arg = args.get(3).map(|a| parse_i64(a));
    let (start, end) = match (start_arg.transpose(), end_arg.transpose()) {
        (Ok(s), Ok(e)) => (s, e),
        (Err(e), _) | (_, Err(e)) => return reply_key_error(ctx.writer, e).await,
    };
    let explicit_end = end.is_some();
    let result = ctx.db().read(&args[0], |v| {
        let s = v.as_str()?;
        let total_bits = s.len() * 8;
        let unit_len = if bit_range { total_bits } else { s.len() };
        let norm = |i: i64| -> i64 {
            if i < 0 {
                (unit_len as i64 + i).max(0)
            } else {
                i
            }
        };
        let lo = start.map(norm).unwrap_or(0).min(unit_len as i64 - 1).max(0);
        let hi = end.map(norm).unwrap_or(unit_len as i64 - 1).min(unit_len as i64 - 1);
        if unit_len == 0 || hi < lo {
            return Ok(-1i64);
        }
        let (bit_lo, bit_hi) = if bit_range {
            (lo as usize, hi as usize)
        } else {
            (lo as usize * 8, hi as usize * 8 + 7)
        };
        for pos in bit_lo..=bit_hi.min(total_bits.saturating_sub(1)) {
            if get_bit(s, pos) == target_bit {
                return Ok(pos as i64);
            }
        }
        if target_bit == 0 && !explicit_end {
            Ok(total_bits as i64)
        } else {
            Ok(-1)
        }
    });
    match result {
        Ok(Some(pos)) => ctx.writer.write_integer(pos).await,
        Ok(None) => ctx.writer.write_integer(if target_bit == 0 { 0 } else { -1 }).await,
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}

pub async fn bitop<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let op = &args[0];
    let dest = &args[1];
    let sources = &args[2..];
    if eq_ci(op, "NOT") && sources.len() != 1 {
        return reply_key_error(ctx.writer, KeyError::SyntaxError).await;
    }
    let mut buffers = Vec::with_capacity(sources.len());
    for key in sources {
        match ctx.db().read(key, |v| v.as_str().map(|s| s.clone())) {
            Ok(buf) => buffers.push(buf.unwrap_or_default()),
            Err(e) => return reply_key_error(ctx.writer, e).await,
        }
    }
    let max_len = buffers.iter().map(|b| b.len()).max().unwrap_or(0);
    let result: Vec<u8> = if eq_ci(op, "NOT") {
        buffers[0].iter().map(|b| !b).collect()
    } else {
        (0..max_len)
            .map(|i| {
                let mut acc = *buffers[0].get(i).unwrap_or(&0);
                for buf in &buffers[1..] {
                    let byte = *buf.get(i).unwrap_or(&0);
                    acc = if eq_ci(op, "AND") {
                        acc & byte
                    } else if eq_ci(op, "OR") {
                        acc | byte
                    } else if eq_ci(op, "XOR") {
                        acc ^ byte
                    } else {
                        acc
                    };
                }
                acc
            })
            .collect()
    };
    if !eq_ci(op, "AND") && !eq_ci(op, "OR") && !eq_ci(op, "XOR") && !eq_ci(op, "NOT") {
        return reply_key_error(ctx.writer, KeyError::SyntaxError).await;
    }
    let db = ctx.db();
    let len = result.len();
    if result.is_empty() {
        db.del(std::slice::from_ref(&dest.to_vec()));
    } else {
        db.set_value(dest.to_vec(), Value::Str(result), None);
    }
    ctx.wal_append(b"BITOP", args);
    ctx.writer.write_integer(len as i64).await
}

enum FieldType {
    Signed(u32),
    Unsigned(u32),
}

fn parse_field_type(raw: &[u8]) -> Result<FieldType, KeyError> {
    if raw.is_empty() {
        return Err(KeyError::SyntaxError);
    }
    let width: u32 = std::str::from_utf8(&raw[1..])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(KeyError::SyntaxError)?;
    match raw[0] {
        b'i' if width >= 1 && width <= 64 => Ok(FieldType::Signed(width)),
        b'u' if width >= 1 && width <= 63 => Ok(FieldType::Unsigned(width)),
        _ => Err(KeyError::SyntaxError),
    }
}

fn parse_field_offset(raw: &[u8], width: u32) -> Result<usize, KeyError> {
    if let Some(stripped) = raw.strip_prefix(b"#") {
        let n: u64 = std::str::from_utf8(stripped)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(KeyError::SyntaxError)?;
        Ok(n as usize * width as usize)
    } else {
        let n: u64 = std::str::from_utf8(raw).ok().and_then(|s| s.parse().ok()).ok_or(KeyError::SyntaxError)?;
        Ok(n as usize)
    }
}

fn read_field(buf: &[u8], offset: usize, ty: &FieldType) -> i64 {
    let width = match ty {
        FieldType::Signed(w) | FieldType::Unsigned(w) => *w,
    };
    let mut raw: u64 = 0;
    for i in 0..width {
        raw = (raw << 1) | get_bit(buf, offset + i as usize) as u64;
    }
    match ty {
        FieldType::Unsigned(_) => raw as i64,
        FieldType::Signed(w) => {
            let shift = 64 - w;
            ((raw << shift) as i64) >> shift
        }
    }
}

fn write_field(buf: &mut Vec<u8>, offset: usize, ty: &FieldType, value: i64) {
    let width = match ty {
        FieldType::Signed(w) | FieldType::Unsigned(w) => *w,
    };
    let bits_needed = offset + width as usize;
    if bits_needed > buf.len() * 8 {
        buf.resize((bits_needed + 7) / 8, 0);
    }
    let raw = value as u64;
    for i in 0..width {
        let bit = (raw >> (width - 1 - i)) & 1;
        set_bit(buf, offset + i as usize, bit as u8);
    }
}

fn apply_overflow(value: i128, ty: &FieldType, policy: &[u8]) -> Option<i64> {
    let (min, max): (i128, i128) = match ty {
        FieldType::Unsigned(w) => (0, (1i128 << w) - 1),
        FieldType::Signed(w) => (-(1i128 << (w - 1)), (1i128 << (w - 1)) - 1),
    };
    if value >= min && value <= max {
        return Some(value as i64);
    }
    if policy.eq_ignore_ascii_case(b"FAIL") {
        None
    } else if policy.eq_ignore_ascii_case(b"SAT") {
        Some(if value < min { min as i64 } else { max as i64 })
    } else {
        let range = max - min + 1;
        let wrapped = ((value - min).rem_euclid(range)) + min;
        Some(wrapped as i64)
    }
}

pub async fn bitfield<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let result = ctx.db().mutate_or_create(
        &args[0],
        || Value::Str(Vec::new()),
        |v| {
            let buf = v.as_str_mut()?;
            let mut replies: Vec<Option<i64>> = Vec::new();
            let mut overflow_policy: &[u8] = b"WRAP";
            let mut i = 1;
            while i < args.len() {
                let sub = args[i].as_ref();
                if sub.eq_ignore_ascii_case(b"OVERFLOW") {
                    overflow_policy = &args[i + 1];
                    i += 2;
                } else if sub.eq_ignore_ascii_case(b"GET") {
                    let ty = parse_field_type(&args[i + 1])?;
                    let width = match ty {
                        FieldType::Signed(w) | FieldType::Unsigned(w) => w,
                    };
                    let offset = parse_field_offset(&args[i + 2], width)?;
                    replies.push(Some(read_field(buf, offset, &ty)));
                    i += 3;
                } else if sub.eq_ignore_ascii_case(b"SET") {
                    let ty = parse_field_type(&args[i + 1])?;
                    let width = match ty {
                        FieldType::Signed(w) | FieldType::Unsigned(w) => w,
                    };
                    let offset = parse_field_offset(&args[i + 2], width)?;
                    let new_value = super::parse_i64(&args[i + 3])?;
                    let old = read_field(buf, offset, &ty);
                    match apply_overflow(new_value as i128, &ty, overflow_policy) {
                        Some(clamped) => {
                            write_field(buf, offset, &ty, clamped);
                            replies.push(Some(old));
                        }
                        None => replies.push(None),
                    }
                    i += 4;
                } else if sub.eq_ignore_ascii_case(b"INCRBY") {
                    let ty = parse_field_type(&args[i + 1])?;
                    let width = match ty {
                        FieldType::Signed(w) | FieldType::Unsigned(w) => w,
                    };
                    let offset = parse_field_offset(&args[i + 2], width)?;
                    let delta = super::parse_i64(&args[i + 3])?;
                    let current = read_field(buf, offset, &ty);
                    match apply_overflow(current as i128 + delta as i128, &ty, overflow_policy) {
                        Some(clamped) => {
                            write_field(buf, offset, &ty, clamped);
                            replies.push(Some(clamped));
                        }
                        None => replies.push(None),
                    }
                    i += 4;
                } else {
                    return Err(KeyError::SyntaxError);
                }
            }
            Ok(replies)
        },
    );
    match result {
        Ok(replies) => {
            ctx.wal_append(b"BITFIELD", args);
            ctx.writer.write_array_header(replies.len() as i64).await?;
            for r in replies {
                match r {
                    Some(v) => ctx.writer.write_integer(v).await?,
                    None => ctx.writer.write_null().await?,
                }
            }
            Ok(())
        }
        Err(e) => reply_key_error(ctx.writer, e).await,
    }
}
