/*
 * Created on Sat Jun 26 2021
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

//! Process lifetime, once the engine is built and the WAL has been replayed: spawn the
//! background expiration sweeper and the WAL fsync task, start the listener, and race it
//! against a termination signal using a broadcast-channel shutdown shape shared by every
//! background service.

use crate::{
    commands::Engine,
    config::Config,
    dbnet, registry,
    util::error::{Error, SkyResult},
};
use std::{sync::Arc, time::Duration};
use tokio::sync::broadcast;

#[cfg(unix)]
use core::{future::Future, pin::Pin, task::Context, task::Poll};
#[cfg(unix)]
use tokio::signal::unix::{signal as fnsignal, Signal, SignalKind};

#[cfg(unix)]
/// Binds to SIGTERM so a service manager's shutdown request is handled the same way as Ctrl+C.
pub struct UnixTerminationSignal {
    sigterm: Signal,
}

#[cfg(unix)]
impl UnixTerminationSignal {
    pub fn init() -> SkyResult<Self> {
        let sigterm = fnsignal(SignalKind::terminate())
            .map_err(|e| Error::OtherError(format!("failed to bind to SIGTERM: {e}")))?;
        Ok(Self { sigterm })
    }
}

#[cfg(unix)]
impl Future for UnixTerminationSignal {
    type Output = Option<()>;

    fn poll(mut self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Self::Output> {
        self.sigterm.poll_recv(ctx)
    }
}

const SWEEP_INTERVAL: Duration = Duration::from_secs(10);
const SWEEP_SAMPLE: usize = 64;
const FSYNC_INTERVAL: Duration = Duration::from_secs(1);

/// Periodically samples every database for expired keys (§3.3). Advisory only: lazy expiry on
/// access is what actually guarantees no key is observed past its deadline, so this task making
/// no progress at all is a performance problem, never a correctness one.
async fn expiration_sweeper(engine: Arc<Engine>, mut shutdown: broadcast::Receiver<()>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(SWEEP_INTERVAL) => {}
            _ = shutdown.recv() => return,
        }
        for i in 0..engine.store.num_databases() {
            engine.store.db(i).sweep_sample(SWEEP_SAMPLE);
        }
    }
}

/// Periodically fsyncs the WAL so durability doesn't rest entirely on the flush performed at
/// shutdown. A failure here poisons the process-wide registry: `dbnet` refuses new connections
/// once a write-ahead log it can no longer trust to hit disk is the only thing standing between
/// a client and data loss.
async fn wal_fsync_task(engine: Arc<Engine>, mut shutdown: broadcast::Receiver<()>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(FSYNC_INTERVAL) => {}
            _ = shutdown.recv() => return,
        }
        if let Some(wal) = &engine.wal {
            if let Err(e) = wal.fsync() {
                log::error!("WAL fsync failed, poisoning registry: {e}");
                registry::poison();
            }
        }
    }
}

/// Binds the listener, spawns the background tasks, and blocks until a termination signal
/// fires or the listener's own accept loop gives up.
pub async fn run(config: Config, engine: Arc<Engine>) -> SkyResult<()> {
    let (signal, _) = broadcast::channel(1);

    let sweeper_handle = tokio::spawn(expiration_sweeper(engine.clone(), signal.subscribe()));
    let fsync_handle = tokio::spawn(wal_fsync_task(engine.clone(), signal.subscribe()));

    let server = dbnet::connect(&config, engine.clone(), signal.clone()).await?;
    let ctrlc = tokio::signal::ctrl_c();

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = server.run_server() => {}
            _ = ctrlc => {}
        }
    }
    #[cfg(unix)]
    {
        let sigterm = UnixTerminationSignal::init()?;
        tokio::select! {
            _ = server.run_server() => {}
            _ = ctrlc => {}
            _ = sigterm => {}
        }
    }

    log::info!("Signalling all workers to shut down");
    drop(signal);
    server.finish_with_termsig().await;

    let _ = sweeper_handle.await;
    let _ = fsync_handle.await;

    if let Some(wal) = &engine.wal {
        if let Err(e) = wal.fsync() {
            log::error!("Final WAL fsync failed: {e}");
        }
    }
    Ok(())
}
