/*
 * Created on Thu Jul 02 2020
 *
 * This file is a part of Skytable
 * Skytable (formerly known as TerrabaseDB or Skybase) is a free and open-source
 * NoSQL database written by Sayan Nandan ("the Author") with the
 * vision to provide flexibility in data modelling without compromising
 * on performance, queryability or scalability.
 *
 * Copyright (c) 2020, Sayan Nandan <ohsayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! # Skytable
//!
//! The `skyd` crate (or the `server` folder) is Skytable's database server. See the module
//! docs of `commands`, `keyspace`, `protocol`, `pubsub`, `streams`, `wal` and `dbnet` for the
//! respective subsystems; `arbiter` wires them together once this file has a `Config` in hand.

use bytes::Bytes;
use commands::{CommandContext, ConnectionState, Engine};
use libsky::{URL, VERSION};
use libsky::util::terminal;
use protocol::{ProtocolVersion, RespWriter};
use std::io::Write;
use std::path;
use std::{env, fs, process, sync::Arc};
use wal::{Wal, WalRecord};

mod arbiter;
mod commands;
mod config;
mod dbnet;
mod keyspace;
mod protocol;
mod pubsub;
mod registry;
mod streams;
#[cfg(test)]
mod tests;
mod util;
mod wal;

const PID_FILE: &str = ".sky_pid";

#[cfg(not(target_env = "msvc"))]
use jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
/// Jemallocator - this is the default memory allocator for platforms other than msvc
static GLOBAL: Jemalloc = Jemalloc;

/// The terminal art for `!noart` configurations
static TEXT: &str = "\n███████ ██   ██ ██    ██ ████████  █████  ██████  ██      ███████ \n██      ██  ██   ██  ██     ██    ██   ██ ██   ██ ██      ██      \n███████ █████     ████      ██    ███████ ██████  ██      █████   \n     ██ ██  ██     ██       ██    ██   ██ ██   ██ ██      ██      \n███████ ██   ██    ██       ██    ██   ██ ██████  ███████ ███████ \n                                                                  ";

fn main() {
    env_logger::Builder::new()
        .parse_filters(&env::var("SKY_LOG").unwrap_or_else(|_| "info".to_owned()))
        .init();

    let config = check_args_and_get_cfg();
    // check if any other process is using the data directory and lock it if not (else error)
    let pid_file = run_pre_startup_tasks();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("server")
        .enable_all()
        .build()
        .expect("failed to build the async runtime");

    let result = runtime.block_on(async {
        let engine = build_engine(&config).await?;
        arbiter::run(config, engine).await
    });

    // Make sure all background workers terminate before the process exits
    drop(runtime);

    if let Err(e) = result {
        log::error!("Fatal error: {e}");
        process::exit(0x100);
    }

    log::info!("Stopped accepting incoming connections");
    drop(pid_file);
    if let Err(e) = fs::remove_file(PID_FILE) {
        log::error!("Shutdown failure: Failed to remove pid file: {}", e);
        process::exit(0x100);
    }
    let _ = terminal::write_info("Goodbye :)\n");
}

/// Parses `--config`/`-c <path>`, loads the resulting `Config` (falling back to hardcoded
/// defaults plus `SKYD_*` env overrides if no path was given, per `config::load`), prints the
/// startup banner, and exits the process on a malformed configuration.
fn check_args_and_get_cfg() -> config::Config {
    let config_path = parse_config_arg();
    let cfg = match config::load(config_path.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            log::error!("Startup failure: {e}");
            process::exit(0x100);
        }
    };
    if cfg.noart {
        println!("Skytable v{} | {}", VERSION, URL);
    } else {
        println!("Skytable v{} | {}\n{}", VERSION, URL, TEXT);
    }
    if config_path.is_some() {
        log::info!("Using settings from supplied configuration");
    } else {
        log::warn!("No configuration file supplied. Using default settings");
    }
    cfg
}

/// The only CLI surface this core owns: `--config <path>` (or `-c <path>`), pointing at the
/// YAML file `config::load` reads. Everything else is environment-variable overrides (§6A).
fn parse_config_arg() -> Option<String> {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" || arg == "-c" {
            return args.next();
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(path.to_owned());
        }
    }
    None
}

/// Opens (or creates) the WAL at the configured path, replays whatever it already holds
/// against a freshly constructed keyspace, and hands back the engine ready to accept
/// connections. Replay runs every record through the ordinary dispatch path with
/// `replaying: true` (§4.8) — the same handlers clients exercise at runtime, so recovery can
/// never drift from normal command semantics.
async fn build_engine(config: &config::Config) -> util::error::SkyResult<Arc<Engine>> {
    let wal = Wal::open(&config.wal_path)?;
    log::info!("Opened write-ahead log at {}", wal.path().display());

    let records = Wal::replay(&config.wal_path)?;
    let engine = Engine::new(config.num_databases, Some(wal));

    if !records.is_empty() {
        log::info!("Replaying {} record(s) from the write-ahead log", records.len());
        replay_records(&engine, records).await;
    }

    Ok(Arc::new(engine))
}

/// Drives every recovered `WalRecord` through `commands::dispatch` with replies discarded
/// (`tokio::io::sink`) and WAL re-append disabled via `replaying: true`, so recovery cannot
/// double-append what it is replaying.
async fn replay_records(engine: &Engine, records: Vec<WalRecord>) {
    let mut writer = RespWriter::new(tokio::io::sink(), ProtocolVersion::Resp2);
    let mut state = ConnectionState::new(0);
    for record in records {
        state.selected_db = record.database as usize;
        let args: Vec<Bytes> = record.args.into_iter().map(Bytes::from).collect();
        let mut ctx = CommandContext {
            engine,
            state: &mut state,
            writer: &mut writer,
            replaying: true,
        };
        if let Err(e) = commands::dispatch(&mut ctx, &record.command, &args).await {
            log::error!(
                "WAL replay of '{}' failed: {e}",
                String::from_utf8_lossy(&record.command)
            );
        }
    }
}

/// On startup, we attempt to check if a `.sky_pid` file exists. If it does, then this file will
/// contain the OS-assigned process ID of the prior `skyd` process. We read that and log an
/// error complaining that the directory is in active use by another process. If the file
/// doesn't exist we're free to create our own and write our own PID to it, preventing two
/// processes from writing to the same WAL path, which can cause undefined behavior.
fn run_pre_startup_tasks() -> fs::File {
    let path = path::Path::new(PID_FILE);
    if path.exists() {
        let pid = fs::read_to_string(path).unwrap_or_else(|_| "unknown".to_owned());
        log::error!(
            "Startup failure: Another process with parent PID {} is using the data directory",
            pid
        );
        process::exit(0x100);
    }
    let mut file = match fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(PID_FILE)
    {
        Ok(fle) => fle,
        Err(e) => {
            log::error!("Startup failure: Failed to open pid file: {}", e);
            process::exit(0x100);
        }
    };
    if let Err(e) = file.write_all(process::id().to_string().as_bytes()) {
        log::error!("Startup failure: Failed to write to pid file: {}", e);
        process::exit(0x100);
    }
    file
}
