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

//! Optimistic transactions (§4.7): `MULTI` begins queueing, `EXEC` replays the queue against a
//! version check of every `WATCH`ed key. Queueing itself happens one level up, in the
//! connection request loop: once `ConnectionState::transaction` is `Queueing`, the loop pushes
//! every command other than these five straight onto the queue instead of calling
//! `commands::dispatch`, mirroring the check `EXEC` itself performs against `WATCH` versions.

use super::{CommandContext, QueuedCommand, TransactionState};
use bytes::Bytes;
use std::io;
use tokio::io::AsyncWrite;

pub async fn multi<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, _args: &[Bytes]) -> io::Result<()> {
    if matches!(ctx.state.transaction, TransactionState::Queueing { .. }) {
        return ctx.writer.write_error("ERR MULTI calls can not be nested").await;
    }
    ctx.state.transaction = TransactionState::Queueing {
        queued: Vec::new(),
        aborted: false,
    };
    ctx.writer.write_simple_string("OK").await
}

pub async fn exec<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, _args: &[Bytes]) -> io::Result<()> {
    let transaction = std::mem::take(&mut ctx.state.transaction);
    let (queued, aborted) = match transaction {
        TransactionState::None => {
            return ctx.writer.write_error("ERR EXEC without MULTI").await;
        }
        TransactionState::Queueing { queued, aborted } => (queued, aborted),
    };

    let watch_ok = ctx
        .state
        .watched
        .iter()
        .all(|(db, key, version)| ctx.engine.db(*db).current_version(key) == *version);
    ctx.state.watched.clear();

    if aborted {
        return ctx
            .writer
            .write_error("EXECABORT Transaction discarded because of previous errors.")
            .await;
    }
    if !watch_ok {
        return ctx.writer.write_array_header(-1).await;
    }

    ctx.writer.write_array_header(queued.len() as i64).await?;
    for QueuedCommand { name, args } in queued {
        super::dispatch(ctx, &name, &args).await?;
    }
    Ok(())
}

pub async fn discard<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, _args: &[Bytes]) -> io::Result<()> {
    if !matches!(ctx.state.transaction, TransactionState::Queueing { .. }) {
        return ctx.writer.write_error("ERR DISCARD without MULTI").await;
    }
    ctx.state.transaction = TransactionState::None;
    ctx.state.watched.clear();
    ctx.writer.write_simple_string("OK").await
}

pub async fn watch<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    if matches!(ctx.state.transaction, TransactionState::Queueing { .. }) {
        return ctx.writer.write_error("ERR WATCH inside MULTI is not allowed").await;
    }
    let db_idx = ctx.state.selected_db;
    for key in args {
        let version = ctx.engine.db(db_idx).current_version(key);
        ctx.state.watched.push((db_idx, key.to_vec(), version));
    }
    ctx.writer.write_simple_string("OK").await
}

pub async fn unwatch<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, _args: &[Bytes]) -> io::Result<()> {
    ctx.state.watched.clear();
    ctx.writer.write_simple_string("OK").await
}
