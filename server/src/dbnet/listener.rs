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

//! One `TcpListener` plus the state every accepted connection needs a handle to: the shared
//! engine, the connection-limiting semaphore, and the shutdown broadcast. There used to be a
//! TLS/plaintext, Skyhash-v1/v2 listener matrix here; there's one wire protocol and one
//! transport now, so there's one listener type.

use crate::{commands::Engine, config::Config};
use std::{io, net::SocketAddr, sync::Arc};
use tokio::{
    net::TcpListener,
    sync::{broadcast, mpsc, Semaphore},
};

pub struct BaseListener {
    pub engine: Arc<Engine>,
    pub listener: TcpListener,
    pub climit: Arc<Semaphore>,
    pub signal: broadcast::Sender<()>,
    pub terminate_tx: mpsc::Sender<()>,
    terminate_rx: mpsc::Receiver<()>,
}

impl BaseListener {
    pub async fn init(
        engine: Arc<Engine>,
        bind: SocketAddr,
        climit: Arc<Semaphore>,
        signal: broadcast::Sender<()>,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(bind).await?;
        let (terminate_tx, terminate_rx) = mpsc::channel(1);
        Ok(Self {
            engine,
            listener,
            climit,
            signal,
            terminate_tx,
            terminate_rx,
        })
    }

    /// Drops this listener's own shutdown handles, then waits for every `ConnectionHandler`'s
    /// cloned `terminate_tx` to be dropped in turn — i.e. for every in-flight connection to
    /// finish the request it's currently handling and exit. `recv()` returning `None` is exactly
    /// that: every sender is gone.
    pub async fn release_self(mut self) {
        drop(self.signal);
        drop(self.terminate_tx);
        let _ = self.terminate_rx.recv().await;
    }
}

/// Binds the configured host/port and returns a listener ready for `run_server`.
pub async fn connect(
    config: &Config,
    engine: Arc<Engine>,
    signal: broadcast::Sender<()>,
) -> io::Result<super::tcp::Listener> {
    let climit = Arc::new(Semaphore::new(config.max_clients));
    let bind = SocketAddr::new(config.host, config.port);
    let base = BaseListener::init(engine, bind, climit, signal).await?;
    log::info!("Server started on {bind}");
    Ok(super::tcp::Listener::new(base))
}
