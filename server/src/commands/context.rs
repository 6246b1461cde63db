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

//! The per-request handler context: the shared engine handle, one connection's mutable
//! state machine (§4.7), and the RESP writer for whatever reply the command produces.

use crate::{
    keyspace::{Database, Memstore},
    protocol::{ProtocolVersion, RespWriter},
    pubsub::{ConnectionId, PubSub},
    wal::{Wal, WalRecord},
};
use bytes::Bytes;
use std::{
    collections::HashSet,
    sync::atomic::{AtomicU64, Ordering},
    time::{Instant, SystemTime, UNIX_EPOCH},
};
use tokio::io::AsyncWrite;

/// The process-wide engine: the typed keyspace, the pub/sub manager, and the write-ahead log.
/// One instance is shared (via `Arc`) by every connection task.
pub struct Engine {
    pub store: Memstore,
    pub pubsub: PubSub,
    pub wal: Option<Wal>,
    pub start_time: Instant,
    next_conn_id: AtomicU64,
}

impl Engine {
    pub fn new(num_databases: usize, wal: Option<Wal>) -> Self {
        Self {
            store: Memstore::new(num_databases),
            pubsub: PubSub::new(),
            wal,
            start_time: Instant::now(),
            next_conn_id: AtomicU64::new(1),
        }
    }

    pub fn next_connection_id(&self) -> ConnectionId {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn db(&self, idx: usize) -> &Database {
        self.store.db(idx)
    }

    /// Appends a durable record of a completed mutation (§4.8). No-op when replay/test contexts
    /// disable the WAL, and always a no-op for read-only commands (callers only call this after
    /// a successful write).
    pub fn wal_append(&self, database: u8, command: &[u8], args: &[Bytes]) {
        let Some(wal) = &self.wal else { return };
        let timestamp_millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        let record = WalRecord {
            timestamp_millis,
            database,
            command: command.to_ascii_uppercase(),
            args: args.iter().map(|a| a.to_vec()).collect(),
        };
        if let Err(e) = wal.append(&record) {
            log::error!("WAL append failed: {e}");
        }
    }
}

#[derive(Debug, Default, Clone)]
pub enum SubscriptionMode {
    #[default]
    Normal,
    Subscribed {
        channels: HashSet<Vec<u8>>,
        patterns: HashSet<Vec<u8>>,
    },
}

impl SubscriptionMode {
    pub fn is_subscribed(&self) -> bool {
        matches!(self, Self::Subscribed { .. })
    }

    pub fn total_subscriptions(&self) -> usize {
        match self {
            Self::Normal => 0,
            Self::Subscribed { channels, patterns } => channels.len() + patterns.len(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueuedCommand {
    pub name: Vec<u8>,
    pub args: Vec<Bytes>,
}

#[derive(Debug, Default)]
pub enum TransactionState {
    #[default]
    None,
    Queueing {
        queued: Vec<QueuedCommand>,
        aborted: bool,
    },
}

/// Per-connection state machine (§4.7). Owned exclusively by that connection's task — no
/// locking needed.
pub struct ConnectionState {
    pub id: ConnectionId,
    pub selected_db: usize,
    pub client_name: Option<Vec<u8>>,
    pub protocol: ProtocolVersion,
    pub subscription: SubscriptionMode,
    pub transaction: TransactionState,
    /// `(database, key, version snapshot at WATCH time)`.
    pub watched: Vec<(usize, Vec<u8>, u64)>,
    pub should_close: bool,
}

impl ConnectionState {
    pub fn new(id: ConnectionId) -> Self {
        Self {
            id,
            selected_db: 0,
            client_name: None,
            protocol: ProtocolVersion::Resp2,
            subscription: SubscriptionMode::Normal,
            transaction: TransactionState::None,
            watched: Vec::new(),
            should_close: false,
        }
    }

    pub fn reset(&mut self) {
        self.selected_db = 0;
        self.client_name = None;
        self.subscription = SubscriptionMode::Normal;
        self.transaction = TransactionState::None;
        self.watched.clear();
    }
}

/// Bundles everything one command invocation needs: the shared engine, this connection's
/// state, and the writer its reply goes to. `replaying` is set during WAL recovery, where
/// handlers must skip re-appending to the WAL and must never actually suspend (a replayed
/// `BLPOP` behaves as a non-blocking attempt, per §4.8).
pub struct CommandContext<'a, W> {
    pub engine: &'a Engine,
    pub state: &'a mut ConnectionState,
    pub writer: &'a mut RespWriter<W>,
    pub replaying: bool,
}

impl<'a, W: AsyncWrite + Unpin> CommandContext<'a, W> {
    pub fn db(&self) -> &Database {
        self.engine.db(self.state.selected_db)
    }

    pub fn wal_append(&self, command: &[u8], args: &[Bytes]) {
        if !self.replaying {
            self.engine.wal_append(self.state.selected_db as u8, command, args);
        }
    }
}
