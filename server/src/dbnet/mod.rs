/*
 * Created on Sun Aug 21 2022
 *
 * This file is a part of Skytable
 * Skytable (formerly known as TerrabaseDB or Skybase) is a free and open-source
 * NoSQL database written by Sayan Nandan ("the Author") with the
 * vision to provide flexibility in data modelling without compromising
 * on performance, queryability or scalability.
 *
 * Copyright (c) 2022, Sayan Nandan <ohsayan@outlook.com>
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

//! The network layer: one `TcpListener` (`tcp`, `listener`), one task per accepted connection
//! running the request loop defined here, and a connection-limiting semaphore shared between
//! them. There is exactly one wire protocol (RESP2/RESP3, negotiated per-connection via
//! `HELLO`) and exactly one transport (plain TCP) — no listener-type matrix is needed.

mod connection;
mod listener;
pub(crate) mod tcp;

pub use listener::{connect, BaseListener};
pub use tcp::Listener;

use crate::{
    commands::{self, CommandContext, ConnectionState, Engine, QueuedCommand, TransactionState},
    protocol::{ProtocolVersion, RespWriter},
    pubsub::PushMessage,
};
use bytes::Bytes;
use connection::Connection;
use std::{cell::Cell, io, sync::Arc, time::Duration};
use tokio::{
    net::TcpStream,
    sync::{broadcast, mpsc, Semaphore},
    time::sleep,
};

/// Exponential backoff for the accept loop (§6A): a transient `accept()` failure (the classic
/// case is the process running out of file descriptors) shouldn't bring the listener down, but
/// a sustained one should eventually give up rather than spin forever.
pub struct NetBackoff {
    current: Cell<u8>,
}

const MAX_BACKOFF: u8 = 64;

impl NetBackoff {
    pub fn new() -> Self {
        Self { current: Cell::new(1) }
    }

    pub async fn spin(&self) {
        sleep(Duration::from_secs(self.current.get() as u64)).await;
        let next = self.current.get().saturating_mul(2);
        self.current.set(next.min(MAX_BACKOFF));
    }

    pub fn should_disconnect(&self) -> bool {
        self.current.get() > MAX_BACKOFF
    }
}

/// Owns one accepted socket for its lifetime: runs the request loop and, on drop, returns its
/// connection-limit permit. The permit is acquired and `forget()`-ten by the accept loop in
/// `tcp::Listener::run`, so this `Drop` impl is the only thing that ever gives it back.
pub struct ConnectionHandler {
    engine: Arc<Engine>,
    stream: TcpStream,
    climit: Arc<Semaphore>,
    shutdown: broadcast::Receiver<()>,
    _shutdown_complete: mpsc::Sender<()>,
}

impl ConnectionHandler {
    pub fn new(
        engine: Arc<Engine>,
        stream: TcpStream,
        climit: Arc<Semaphore>,
        shutdown: broadcast::Receiver<()>,
        shutdown_complete: mpsc::Sender<()>,
    ) -> Self {
        Self {
            engine,
            stream,
            climit,
            shutdown,
            _shutdown_complete: shutdown_complete,
        }
    }

    pub async fn run(&mut self) -> io::Result<()> {
        let conn_id = self.engine.next_connection_id();
        let mut mailbox = self.engine.pubsub.register(conn_id);
        let mut state = ConnectionState::new(conn_id);
        let (rd, wr) = self.stream.split();
        let mut conn = Connection::new(rd);
        let mut writer = RespWriter::new(wr, ProtocolVersion::Resp2);

        let result = drive(&self.engine, &mut self.shutdown, &mut conn, &mut writer, &mut state, &mut mailbox).await;

        self.engine.pubsub.deregister(conn_id);
        result
    }
}

async fn drive<R: tokio::io::AsyncRead + Unpin, W: tokio::io::AsyncWrite + Unpin>(
    engine: &Engine,
    shutdown: &mut broadcast::Receiver<()>,
    conn: &mut Connection<R>,
    writer: &mut RespWriter<W>,
    state: &mut ConnectionState,
    mailbox: &mut mpsc::UnboundedReceiver<PushMessage>,
) -> io::Result<()> {
    loop {
        match conn.next_request() {
            Ok(Some(request)) => {
                handle_request(engine, state, writer, request).await?;
                writer.flush().await?;
                if state.should_close {
                    return Ok(());
                }
                continue;
            }
            Ok(None) => {}
            Err(e) => {
                let _ = writer.write_error(&format!("ERR Protocol error: {e}")).await;
                let _ = writer.flush().await;
                return Ok(());
            }
        }
        tokio::select! {
            biased;
            push = mailbox.recv() => {
                if let Some(msg) = push {
                    write_push(writer, msg).await?;
                    writer.flush().await?;
                }
            }
            filled = conn.fill() => {
                match filled {
                    Ok(true) => {}
                    Ok(false) => return Ok(()),
                    Err(e) => return Err(e),
                }
            }
            _ = shutdown.recv() => return Ok(()),
        }
    }
}

impl Drop for ConnectionHandler {
    fn drop(&mut self) {
        self.climit.add_permits(1);
    }
}

/// One parsed request: queues it if the connection is mid-`MULTI`, otherwise dispatches it
/// immediately. `MULTI`/`EXEC`/`DISCARD`/`WATCH`/`UNWATCH` always dispatch directly — queueing
/// only intercepts everything else, mirroring the version check `EXEC` itself performs.
pub(crate) async fn handle_request<W: tokio::io::AsyncWrite + Unpin>(
    engine: &Engine,
    state: &mut ConnectionState,
    writer: &mut RespWriter<W>,
    mut request: Vec<Bytes>,
) -> io::Result<()> {
    if request.is_empty() {
        return Ok(());
    }
    let name = request.remove(0);

    if state.subscription.is_subscribed() {
        let canonical = commands::registry::lookup(&name).map(|d| d.canonical);
        let allowed = matches!(
            canonical,
            Some("SUBSCRIBE") | Some("UNSUBSCRIBE") | Some("PSUBSCRIBE") | Some("PUNSUBSCRIBE") | Some("PING") | Some("QUIT") | Some("RESET")
        );
        if !allowed {
            return writer
                .write_error(&format!(
                    "ERR Can't execute '{}': only (P|S)SUBSCRIBE / (P|S)UNSUBSCRIBE / PING / QUIT / RESET are allowed in this context",
                    String::from_utf8_lossy(&name).to_ascii_lowercase()
                ))
                .await;
        }
    }

    let is_txn_control = [b"MULTI".as_slice(), b"EXEC", b"DISCARD", b"WATCH", b"UNWATCH"]
        .iter()
        .any(|kw| name.eq_ignore_ascii_case(kw));

    if !is_txn_control && matches!(state.transaction, TransactionState::Queueing { .. }) {
        if commands::registry::lookup(&name).is_none() {
            if let TransactionState::Queueing { aborted, .. } = &mut state.transaction {
                *aborted = true;
            }
            return writer
                .write_error(&format!("ERR unknown command '{}'", String::from_utf8_lossy(&name)))
                .await;
        }
        if let TransactionState::Queueing { queued, .. } = &mut state.transaction {
            queued.push(QueuedCommand { name: name.to_vec(), args: request });
        }
        return writer.write_simple_string("QUEUED").await;
    }

    let mut ctx = CommandContext {
        engine,
        state,
        writer,
        replaying: false,
    };
    commands::dispatch(&mut ctx, &name, &request).await
}

async fn write_push<W: tokio::io::AsyncWrite + Unpin>(
    writer: &mut RespWriter<W>,
    msg: PushMessage,
) -> io::Result<()> {
    match msg {
        PushMessage::Message { channel, payload } => {
            writer.write_push_header(3).await?;
            writer.write_bulk(Some(b"message")).await?;
            writer.write_bulk(Some(&channel)).await?;
            writer.write_bulk(Some(&payload)).await
        }
        PushMessage::PMessage { pattern, channel, payload } => {
            writer.write_push_header(4).await?;
            writer.write_bulk(Some(b"pmessage")).await?;
            writer.write_bulk(Some(&pattern)).await?;
            writer.write_bulk(Some(&channel)).await?;
            writer.write_bulk(Some(&payload)).await
        }
    }
}
