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

//! Server introspection (§4.6 SERVER): status text, the command catalog, and time queries.
//! None of these touch the keyspace.

use super::{eq_ci, registry, CommandContext};
use bytes::Bytes;
use std::{
    io,
    time::{SystemTime, UNIX_EPOCH},
};
use tokio::io::AsyncWrite;

pub async fn info<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, _args: &[Bytes]) -> io::Result<()> {
    let uptime = ctx.engine.start_time.elapsed().as_secs();
    let mut sections = String::new();
    sections.push_str("# Server\r\n");
    sections.push_str("redis_version:7.0.0\r\n");
    sections.push_str("skyd_compatible:resp\r\n");
    sections.push_str(&format!("uptime_in_seconds:{uptime}\r\n"));
    sections.push_str("tcp_port:0\r\n");
    sections.push_str("# Keyspace\r\n");
    for i in 0..ctx.engine.store.num_databases() {
        let size = ctx.engine.db(i).size();
        if size > 0 {
            sections.push_str(&format!("db{i}:keys={size},expires=0,avg_ttl=0\r\n"));
        }
    }
    ctx.writer.write_bulk(Some(sections.as_bytes())).await
}

/// `COMMAND`, `COMMAND COUNT`, `COMMAND DOCS [name...]`. Full `COMMAND INFO` detail isn't
/// modeled — the registry only tracks what `dispatch` needs (arity, category, mutates flag).
pub async fn command<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    if let Some(sub) = args.first() {
        if eq_ci(sub, "COUNT") {
            return ctx.writer.write_integer(registry::count() as i64).await;
        }
        if eq_ci(sub, "DOCS") {
            return ctx.writer.write_map_header(0).await;
        }
    }
    let all = registry::all();
    ctx.writer.write_array_header(all.len() as i64).await?;
    for d in all {
        ctx.writer.write_array_header(6).await?;
        ctx.writer.write_bulk(Some(d.name.to_ascii_lowercase().as_bytes())).await?;
        ctx.writer.write_integer(d.min_args + 1).await?;
        ctx.writer.write_array_header(if d.modifies_data { 1 } else { 0 }).await?;
        if d.modifies_data {
            ctx.writer.write_simple_string("write").await?;
        }
        ctx.writer.write_integer(1).await?;
        ctx.writer.write_integer(1).await?;
        ctx.writer.write_integer(1).await?;
    }
    Ok(())
}

pub async fn lastsave<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, _args: &[Bytes]) -> io::Result<()> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
    ctx.writer.write_integer(now as i64).await
}

pub async fn time<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, _args: &[Bytes]) -> io::Result<()> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    ctx.writer.write_array_header(2).await?;
    ctx.writer.write_bulk(Some(now.as_secs().to_string().as_bytes())).await?;
    ctx.writer.write_bulk(Some(now.subsec_micros().to_string().as_bytes())).await
}

/// `WAIT numreplicas timeout`: replication is out of scope (§ Non-goals) so there are never
/// any replicas to wait for — always answers immediately with `0` (see DESIGN.md).
pub async fn wait<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, _args: &[Bytes]) -> io::Result<()> {
    ctx.writer.write_integer(0).await
}
