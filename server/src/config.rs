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

//! Startup configuration (§6A): a YAML file (`--config`), overridden by `SKYD_*` environment
//! variables, overridden by nothing else — there's no CLI flag layer here, since the only way
//! to point the server at a config file at all is the `--config` argument itself.

use serde::Deserialize;
use std::{env, fs, net::IpAddr, path::PathBuf};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 6379;
pub const DEFAULT_MAX_CLIENTS: usize = 50_000;
pub const DEFAULT_WAL_PATH: &str = "./sky.wal";

#[derive(Debug, PartialEq)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub num_databases: usize,
    pub wal_path: PathBuf,
    pub max_clients: usize,
    pub noart: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.parse().unwrap(),
            port: DEFAULT_PORT,
            num_databases: crate::keyspace::NUM_DATABASES,
            wal_path: PathBuf::from(DEFAULT_WAL_PATH),
            max_clients: DEFAULT_MAX_CLIENTS,
            noart: false,
        }
    }
}

/// Mirrors the on-disk YAML shape. Every key is optional: absent keys fall through to
/// whatever the environment or the hardcoded default supplies (§6A).
#[derive(Deserialize, Debug, Default, PartialEq)]
struct ConfigFile {
    host: Option<IpAddr>,
    port: Option<u16>,
    num_databases: Option<usize>,
    wal_path: Option<String>,
    max_clients: Option<usize>,
    noart: Option<bool>,
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_yaml::Error),
    BadEnvVar { key: &'static str, value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read configuration file: {e}"),
            Self::Parse(e) => write!(f, "failed to parse configuration file: {e}"),
            Self::BadEnvVar { key, value } => {
                write!(f, "invalid value '{value}' for environment variable {key}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Loads config in ascending precedence: hardcoded defaults, then the YAML file at
/// `path` (if given), then `SKYD_*` environment variables.
pub fn load(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut cfg = Config::default();

    if let Some(path) = path {
        let raw = fs::read_to_string(path).map_err(ConfigError::Io)?;
        let file: ConfigFile = serde_yaml::from_str(&raw).map_err(ConfigError::Parse)?;
        apply_file(&mut cfg, file);
    }

    apply_env(&mut cfg)?;
    Ok(cfg)
}

fn apply_file(cfg: &mut Config, file: ConfigFile) {
    if let Some(host) = file.host {
        cfg.host = host;
    }
    if let Some(port) = file.port {
        cfg.port = port;
    }
    if let Some(n) = file.num_databases {
        cfg.num_databases = n;
    }
    if let Some(p) = file.wal_path {
        cfg.wal_path = PathBuf::from(p);
    }
    if let Some(m) = file.max_clients {
        cfg.max_clients = m;
    }
    if let Some(a) = file.noart {
        cfg.noart = a;
    }
}

fn apply_env(cfg: &mut Config) -> Result<(), ConfigError> {
    if let Ok(v) = env::var("SKYD_HOST") {
        cfg.host = v
            .parse()
            .map_err(|_| ConfigError::BadEnvVar { key: "SKYD_HOST", value: v })?;
    }
    if let Ok(v) = env::var("SKYD_PORT") {
        cfg.port = v
            .parse()
            .map_err(|_| ConfigError::BadEnvVar { key: "SKYD_PORT", value: v })?;
    }
    if let Ok(v) = env::var("SKYD_NUM_DATABASES") {
        cfg.num_databases = v
            .parse()
            .map_err(|_| ConfigError::BadEnvVar { key: "SKYD_NUM_DATABASES", value: v })?;
    }
    if let Ok(v) = env::var("SKYD_WAL_PATH") {
        cfg.wal_path = PathBuf::from(v);
    }
    if let Ok(v) = env::var("SKYD_MAX_CLIENTS") {
        cfg.max_clients = v
            .parse()
            .map_err(|_| ConfigError::BadEnvVar { key: "SKYD_MAX_CLIENTS", value: v })?;
    }
    if let Ok(v) = env::var("SKYD_NOART") {
        cfg.noart = v == "1" || v.eq_ignore_ascii_case("true");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.num_databases, 16);
    }

    #[test]
    fn file_values_override_defaults() {
        let mut cfg = Config::default();
        apply_file(
            &mut cfg,
            ConfigFile {
                port: Some(7000),
                ..Default::default()
            },
        );
        assert_eq!(cfg.port, 7000);
        assert_eq!(cfg.host, Config::default().host);
    }
}
