/*
 * Created on Mon Apr 26 2021
 *
 * This file is a part of Skytable
 * Skytable (formerly known as TerrabaseDB or Skybase) is a free and open-source
 * NoSQL database written by Sayan Nandan ("the Author") with the
 * vision to provide flexibility in data modelling without compromising
 * on performance, queryability or scalability.
 *
 * Copyright (c) 2021, Sayan Nandan <ohsayan@outlook.com>
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

//! The accept loop: bind once, then hand every accepted socket off to its own
//! `ConnectionHandler` task, backing off on transient `accept()` errors rather than letting one
//! bad file descriptor bring the whole listener down.

use super::{listener::BaseListener, ConnectionHandler, NetBackoff};
use std::io;
use tokio::net::TcpStream;

pub struct Listener {
    pub base: BaseListener,
}

impl Listener {
    pub fn new(base: BaseListener) -> Self {
        Self { base }
    }

    async fn accept(&self) -> io::Result<TcpStream> {
        let backoff = NetBackoff::new();
        loop {
            match self.base.listener.accept().await {
                Ok((stream, _)) => return Ok(stream),
                Err(e) => {
                    if backoff.should_disconnect() {
                        return Err(e);
                    }
                    log::warn!("Accept error, retrying: {e}");
                }
            }
            backoff.spin().await;
        }
    }

    /// Runs until the accept loop itself fails terminally (backoff exhausted) or the caller
    /// drops the listener future on shutdown. Each connection is refused up front if the
    /// process-wide health registry has been poisoned by a fatal WAL failure.
    pub async fn run(&self) -> io::Result<()> {
        loop {
            // SECURITY: never let a `?` here bubble an accept error out and kill the whole
            // listener before backoff has had a chance to retry; `accept()` already folds that
            // decision in and only returns `Err` once backoff gives up.
            self.base.climit.acquire().await.unwrap().forget();
            let stream = match self.accept().await {
                Ok(stream) => stream,
                Err(e) => {
                    log::error!("Accept loop terminating: {e}");
                    return Err(e);
                }
            };
            if !crate::registry::state_okay() {
                log::warn!("Refusing connection: server registry is poisoned");
                self.base.climit.add_permits(1);
                drop(stream);
                continue;
            }
            let mut handler = ConnectionHandler::new(
                self.base.engine.clone(),
                stream,
                self.base.climit.clone(),
                self.base.signal.subscribe(),
                self.base.terminate_tx.clone(),
            );
            tokio::spawn(async move {
                if let Err(e) = handler.run().await {
                    log::debug!("Connection closed with error: {e}");
                }
            });
        }
    }

    /// Alias kept for symmetry with `arbiter::run`'s `tokio::select!` over this future and the
    /// process signal futures.
    pub async fn run_server(&self) -> io::Result<()> {
        self.run().await
    }

    /// Consumes the listener once a shutdown signal has fired, draining in-flight connections
    /// before returning.
    pub async fn finish_with_termsig(self) {
        self.base.release_self().await;
    }
}
