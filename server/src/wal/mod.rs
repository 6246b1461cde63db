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

//! The write-ahead log: every mutating command is appended here, zstd-compressed, before the
//! in-memory keyspace is allowed to observe it durably. Writers take turns through a single
//! `Mutex<File>` rather than an actor mailbox: take a part, encode it, write it, repeat.

pub mod record;

pub use record::WalRecord;

use crc::{Crc, CRC_32_ISO_HDLC};
use parking_lot::Mutex;
use std::{
    fmt, io,
    fs::{File, OpenOptions},
    io::{BufReader, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);
const ZSTD_LEVEL: i32 = 3;

#[derive(Debug)]
pub enum WalError {
    Io(io::Error),
    Codec(String),
    Corrupt(String),
}

impl fmt::Display for WalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "wal i/o error: {e}"),
            Self::Codec(msg) => write!(f, "wal codec error: {msg}"),
            Self::Corrupt(msg) => write!(f, "wal corruption detected: {msg}"),
        }
    }
}

impl std::error::Error for WalError {}

impl From<io::Error> for WalError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

pub type WalResult<T> = Result<T, WalError>;

/// An append-only, zstd-compressed record log. Each frame on disk is
/// `[u32 compressed_len][u32 crc32_of_compressed_bytes][compressed_bytes]`.
pub struct Wal {
    file: Mutex<File>,
    path: PathBuf,
}

impl Wal {
    pub fn open(path: impl AsRef<Path>) -> WalResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        Ok(Self {
            file: Mutex::new(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `record`, returning once the bytes have been written to the OS buffer. Durable
    /// persistence to disk is the responsibility of the periodic `fsync` task (§4.8, §6A) —
    /// `append` itself only guarantees write-ordering, not durability.
    pub fn append(&self, record: &WalRecord) -> WalResult<()> {
        let encoded = record.encode();
        let compressed =
            zstd::stream::encode_all(encoded.as_slice(), ZSTD_LEVEL).map_err(|e| WalError::Codec(e.to_string()))?;
        let crc = CRC32.checksum(&compressed);
        let mut frame = Vec::with_capacity(8 + compressed.len());
        frame.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
        frame.extend_from_slice(&crc.to_le_bytes());
        frame.extend_from_slice(&compressed);
        let mut file = self.file.lock();
        file.write_all(&frame)?;
        Ok(())
    }

    pub fn fsync(&self) -> WalResult<()> {
        self.file.lock().sync_data()?;
        Ok(())
    }

    /// Truncates the log to empty, used after a successful replay at startup once the engine
    /// has confirmed every record is reflected in the keyspace, and by `FLUSHALL` variants that
    /// opt to reset durability state (§4.8).
    pub fn truncate(&self) -> WalResult<()> {
        let mut file = self.file.lock();
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    /// Replays every well-formed record currently on disk, in append order. A truncated final
    /// frame (a crash mid-write) is treated as the end of the log rather than an error, per the
    /// usual WAL convention — anything before it is still trustworthy.
    pub fn replay(path: impl AsRef<Path>) -> WalResult<Vec<WalRecord>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(vec![]);
        }
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let mut records = Vec::new();
        loop {
            let mut len_buf = [0u8; 4];
            if !read_exact_or_eof(&mut reader, &mut len_buf)? {
                break;
            }
            let mut crc_buf = [0u8; 4];
            if !read_exact_or_eof(&mut reader, &mut crc_buf)? {
                break;
            }
            let len = u32::from_le_bytes(len_buf) as usize;
            let expected_crc = u32::from_le_bytes(crc_buf);
            let mut compressed = vec![0u8; len];
            if !read_exact_or_eof(&mut reader, &mut compressed)? {
                break; // truncated final frame from a crash mid-append
            }
            if CRC32.checksum(&compressed) != expected_crc {
                return Err(WalError::Corrupt(format!(
                    "checksum mismatch at offset in {}",
                    path.display()
                )));
            }
            let decompressed = zstd::stream::decode_all(compressed.as_slice())
                .map_err(|e| WalError::Codec(e.to_string()))?;
            match WalRecord::decode(&decompressed) {
                Some(record) => records.push(record),
                None => return Err(WalError::Corrupt("malformed record frame".to_owned())),
            }
        }
        Ok(records)
    }
}

/// Like `Read::read_exact`, but returns `Ok(false)` instead of erroring when the stream ends
/// with zero bytes read (a clean EOF at a frame boundary rather than mid-frame).
fn read_exact_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => {
                return if filled == 0 {
                    Ok(false)
                } else {
                    Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated wal frame"))
                }
            }
            n => filled += n,
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A throwaway path under the OS temp dir, unique per test run.
    fn unique_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("skyd-wal-test-{name}-{}", std::process::id()))
    }

    #[test]
    fn append_then_replay_round_trips() {
        let path = unique_path("append-replay");
        let _ = std::fs::remove_file(&path);
        let wal = Wal::open(&path).unwrap();
        let record = WalRecord {
            timestamp_millis: 42,
            database: 0,
            command: b"SET".to_vec(),
            args: vec![b"k".to_vec(), b"v".to_vec()],
        };
        wal.append(&record).unwrap();
        wal.fsync().unwrap();
        let replayed = Wal::replay(&path).unwrap();
        assert_eq!(replayed, vec![record]);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn truncate_empties_the_log() {
        let path = unique_path("truncate");
        let _ = std::fs::remove_file(&path);
        let wal = Wal::open(&path).unwrap();
        wal.append(&WalRecord {
            timestamp_millis: 1,
            database: 0,
            command: b"PING".to_vec(),
            args: vec![],
        })
        .unwrap();
        wal.truncate().unwrap();
        assert!(Wal::replay(&path).unwrap().is_empty());
        std::fs::remove_file(&path).unwrap();
    }
}
