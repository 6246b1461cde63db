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

//! Per-connection protocol housekeeping (§4.6 CONNECTION): handshake, database selection,
//! client metadata, and session teardown. None of these touch the keyspace, so none of them
//! ever WAL-log.

use super::{eq_ci, parse_i64, CommandContext};
use crate::protocol::ProtocolVersion;
use bytes::Bytes;
use std::io;
use tokio::io::AsyncWrite;

pub async fn ping<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    match args.first() {
        Some(payload) => ctx.writer.write_bulk(Some(payload)).await,
        None => ctx.writer.write_simple_string("PONG").await,
    }
}

pub async fn echo<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    ctx.writer.write_bulk(Some(&args[0])).await
}

pub async fn select<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let n = match parse_i64(&args[0]) {
        Ok(n) => n,
        Err(_) => return ctx.writer.write_error("ERR value is not an integer or out of range").await,
    };
    let num_dbs = ctx.engine.store.num_databases() as i64;
    if n < 0 || n >= num_dbs {
        return ctx.writer.write_error("ERR DB index is out of range").await;
    }
    ctx.state.selected_db = n as usize;
    ctx.writer.write_simple_string("OK").await
}

/// `HELLO [protover] [AUTH user pass] [SETNAME name]`. A bare `HELLO` just reports the current
/// negotiated protocol instead of changing it (§4.1).
pub async fn hello<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let mut i = 0;
    if let Some(first) = args.first() {
        match parse_i64(first) {
            Ok(2) => {
                ctx.state.protocol = ProtocolVersion::Resp2;
                ctx.writer.proto = ProtocolVersion::Resp2;
                i = 1;
            }
            Ok(3) => {
                ctx.state.protocol = ProtocolVersion::Resp3;
                ctx.writer.proto = ProtocolVersion::Resp3;
                i = 1;
            }
            _ => return ctx.writer.write_error("NOPROTO unsupported protocol version").await,
        }
    }
    while i < args.len() {
        if eq_ci(&args[i], "SETNAME") && i + 1 < args.len() {
            ctx.state.client_name = Some(args[i + 1].to_vec());
            i += 2;
        } else if eq_ci(&args[i], "AUTH") && i + 2 < args.len() {
            i += 3;
        } else {
            return ctx.writer.write_error("ERR syntax error in HELLO").await;
        }
    }
    ctx.writer.write_map_header(7).await?;
    ctx.writer.write_bulk(Some(b"server")).await?;
    ctx.writer.write_bulk(Some(b"skyd")).await?;
    ctx.writer.write_bulk(Some(b"version")).await?;
    ctx.writer.write_bulk(Some(b"1.0.0")).await?;
    ctx.writer.write_bulk(Some(b"proto")).await?;
    ctx.writer.write_integer(if ctx.state.protocol.is_resp3() { 3 } else { 2 }).await?;
    ctx.writer.write_bulk(Some(b"id")).await?;
    ctx.writer.write_integer(ctx.state.id as i64).await?;
    ctx.writer.write_bulk(Some(b"mode")).await?;
    ctx.writer.write_bulk(Some(b"standalone")).await?;
    ctx.writer.write_bulk(Some(b"role")).await?;
    ctx.writer.write_bulk(Some(b"master")).await?;
    ctx.writer.write_bulk(Some(b"modules")).await?;
    ctx.writer.write_array_header(0).await
}

/// No authentication provider is configured (§4.6 Non-goals exclude ACLs); `AUTH` always fails
/// exactly the way Redis does against a server with no password set.
pub async fn auth<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, _args: &[Bytes]) -> io::Result<()> {
    ctx.writer
        .write_error("ERR Client sent AUTH, but no password is set. Did you mean AUTH <username> <password>?")
        .await
}

pub async fn client<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let sub = &args[0];
    if eq_ci(sub, "GETNAME") {
        match &ctx.state.client_name {
            Some(name) => ctx.writer.write_bulk(Some(name)).await,
            None => ctx.writer.write_bulk(Some(b"")).await,
        }
    } else if eq_ci(sub, "SETNAME") && args.len() > 1 {
        ctx.state.client_name = Some(args[1].to_vec());
        ctx.writer.write_simple_string("OK").await
    } else if eq_ci(sub, "ID") {
        ctx.writer.write_integer(ctx.state.id as i64).await
    } else if eq_ci(sub, "INFO") {
        ctx.writer
            .write_bulk(Some(format!("id={} db={}", ctx.state.id, ctx.state.selected_db).as_bytes()))
            .await
    } else if eq_ci(sub, "LIST") {
        ctx.writer
            .write_bulk(Some(format!("id={} db={}\n", ctx.state.id, ctx.state.selected_db).as_bytes()))
            .await
    } else if eq_ci(sub, "NO-EVICT") || eq_ci(sub, "NO-TOUCH") || eq_ci(sub, "REPLY") {
        ctx.writer.write_simple_string("OK").await
    } else {
        ctx.writer
            .write_error(&format!("ERR unknown CLIENT subcommand '{}'", String::from_utf8_lossy(sub)))
            .await
    }
}

pub async fn quit<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, _args: &[Bytes]) -> io::Result<()> {
    ctx.state.should_close = true;
    ctx.writer.write_simple_string("OK").await
}

pub async fn reset<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, _args: &[Bytes]) -> io::Result<()> {
    ctx.engine.pubsub.unsubscribe_all(ctx.state.id);
    ctx.state.reset();
    ctx.writer.write_simple_string("RESET").await
}
