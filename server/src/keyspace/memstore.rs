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

//! The typed value store: sixteen independent [`Database`]s, each a key/value table plus an
//! expiration index and a WATCH-version counter. Locking is one `parking_lot::RwLock` per
//! database rather than a lock-free probed map (see DESIGN.md) — coarse per-database locking
//! is fine as long as observable semantics match.

use super::{
    error::{KeyError, KeyResult},
    value::{TypeTag, Value},
};
use parking_lot::RwLock;
use rand::seq::IteratorRandom;
use std::{
    collections::HashMap,
    time::{Duration, Instant, SystemTime},
};
use tokio::sync::Notify;

pub const NUM_DATABASES: usize = 16;

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

#[derive(Default)]
struct DbInner {
    data: HashMap<Vec<u8>, Entry>,
    /// Bumped on every mutation to the key, including deletion; never removed, so a WATCH
    /// snapshot taken before a delete-then-recreate still observes a version bump (§4.7).
    versions: HashMap<Vec<u8>, u64>,
}

/// One of the sixteen logical databases (`SELECT 0..15`).
pub struct Database {
    inner: RwLock<DbInner>,
    /// Fired after every mutating write. Blocking reads (`BLPOP`, `BZPOPMIN`, ...) register
    /// interest in this before re-checking their condition, which is the ordering that avoids
    /// a lost-wakeup race. Granularity is per-database, not per-key: coarser than required,
    /// never less correct — a spurious wakeup just costs a redundant recheck.
    notify: Notify,
}

impl Default for Database {
    fn default() -> Self {
        Self {
            inner: RwLock::new(DbInner::default()),
            notify: Notify::new(),
        }
    }
}

impl Database {
    fn bump(inner: &mut DbInner, key: &[u8]) {
        *inner.versions.entry(key.to_vec()).or_insert(0) += 1;
    }

    /// Lazily expires `key` if its deadline has passed (§4.3). Must be called with the write
    /// lock already held.
    fn reap_if_expired(inner: &mut DbInner, key: &[u8]) {
        let expired = matches!(
            inner.data.get(key),
            Some(Entry { expires_at: Some(d), .. }) if Instant::now() >= *d
        );
        if expired {
            inner.data.remove(key);
            Self::bump(inner, key);
        }
    }

    pub fn current_version(&self, key: &[u8]) -> u64 {
        let mut inner = self.inner.write();
        Self::reap_if_expired(&mut inner, key);
        *inner.versions.get(key).unwrap_or(&0)
    }

    /// Registers interest in the database's write-notification. Callers must create this
    /// *before* re-checking whatever condition they're blocking on, then await it — see the
    /// blocking command handlers in `commands::lists`/`commands::zsets` for the pattern.
    pub fn notified(&self) -> tokio::sync::futures::Notified<'_> {
        self.notify.notified()
    }

    pub async fn wait_for_write(&self, timeout: Option<Duration>) -> bool {
        let notified = self.notify.notified();
        match timeout {
            Some(d) if d.is_zero() => false,
            Some(d) => tokio::time::timeout(d, notified).await.is_ok(),
            None => {
                notified.await;
                true
            }
        }
    }

    pub fn exists(&self, key: &[u8]) -> bool {
        let mut inner = self.inner.write();
        Self::reap_if_expired(&mut inner, key);
        inner.data.contains_key(key)
    }

    pub fn type_of(&self, key: &[u8]) -> Option<TypeTag> {
        let mut inner = self.inner.write();
        Self::reap_if_expired(&mut inner, key);
        inner.data.get(key).map(|e| e.value.type_tag())
    }

    pub fn del(&self, keys: &[Vec<u8>]) -> usize {
        let mut inner = self.inner.write();
        let mut removed = 0;
        for key in keys {
            Self::reap_if_expired(&mut inner, key);
            if inner.data.remove(key).is_some() {
                removed += 1;
            }
            Self::bump(&mut inner, key);
        }
        drop(inner);
        self.notify.notify_waiters();
        removed
    }

    pub fn rename(&self, src: &[u8], dst: &[u8]) -> KeyResult<()> {
        let mut inner = self.inner.write();
        Self::reap_if_expired(&mut inner, src);
        let entry = inner.data.remove(src).ok_or(KeyError::NoSuchKey)?;
        inner.data.insert(dst.to_vec(), entry);
        Self::bump(&mut inner, src);
        Self::bump(&mut inner, dst);
        drop(inner);
        self.notify.notify_waiters();
        Ok(())
    }

    pub fn copy(&self, src: &[u8], dst: &[u8], replace: bool) -> bool {
        let mut inner = self.inner.write();
        Self::reap_if_expired(&mut inner, src);
        Self::reap_if_expired(&mut inner, dst);
        if !replace && inner.data.contains_key(dst) {
            return false;
        }
        let Some(entry) = inner.data.get(src) else {
            return false;
        };
        let cloned = Entry {
            value: entry.value.clone(),
            expires_at: entry.expires_at,
        };
        inner.data.insert(dst.to_vec(), cloned);
        Self::bump(&mut inner, dst);
        true
    }

    pub fn expire_at(&self, key: &[u8], deadline: Instant) -> bool {
        let mut inner = self.inner.write();
        Self::reap_if_expired(&mut inner, key);
        match inner.data.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(deadline);
                Self::bump(&mut inner, key);
                true
            }
            None => false,
        }
    }

    pub fn persist(&self, key: &[u8]) -> bool {
        let mut inner = self.inner.write();
        Self::reap_if_expired(&mut inner, key);
        match inner.data.get_mut(key) {
            Some(entry) if entry.expires_at.is_some() => {
                entry.expires_at = None;
                Self::bump(&mut inner, key);
                true
            }
            _ => false,
        }
    }

    /// `None` = no such key, `Some(None)` = no expiration, `Some(Some(d))` = remaining TTL.
    pub fn ttl(&self, key: &[u8]) -> Option<Option<Duration>> {
        let mut inner = self.inner.write();
        Self::reap_if_expired(&mut inner, key);
        inner
            .data
            .get(key)
            .map(|e| e.expires_at.map(|d| d.saturating_duration_since(Instant::now())))
    }

    pub fn keys_matching(&self, pattern: &[u8]) -> Vec<Vec<u8>> {
        let mut inner = self.inner.write();
        let all_keys: Vec<Vec<u8>> = inner.data.keys().cloned().collect();
        for key in &all_keys {
            Self::reap_if_expired(&mut inner, key);
        }
        inner
            .data
            .keys()
            .filter(|k| crate::pubsub::glob::glob_match(pattern, k))
            .cloned()
            .collect()
    }

    pub fn random_key(&self) -> Option<Vec<u8>> {
        let inner = self.inner.read();
        inner.data.keys().choose(&mut rand::thread_rng()).cloned()
    }

    pub fn flush(&self) {
        let mut inner = self.inner.write();
        inner.data.clear();
        inner.versions.clear();
        drop(inner);
        self.notify.notify_waiters();
    }

    pub fn size(&self) -> u64 {
        self.inner.read().data.len() as u64
    }

    /// Advisory sweep: samples up to `sample` keys and reaps any that have expired. Correctness
    /// never depends on this running — lazy expiry on access is what §3.3's "no orphan
    /// expiration" invariant actually rests on.
    pub fn sweep_sample(&self, sample: usize) -> usize {
        let mut inner = self.inner.write();
        let candidates: Vec<Vec<u8>> = inner
            .data
            .iter()
            .filter(|(_, e)| e.expires_at.is_some())
            .map(|(k, _)| k.clone())
            .take(sample)
            .collect();
        let mut reaped = 0;
        for key in candidates {
            let before = inner.data.len();
            Self::reap_if_expired(&mut inner, &key);
            if inner.data.len() < before {
                reaped += 1;
            }
        }
        reaped
    }

    /// Unconditional whole-value write, used by `SET`/string literal assignment. Overwrites
    /// any existing value regardless of its prior type.
    pub fn set_value(&self, key: Vec<u8>, value: Value, expires_at: Option<Instant>) {
        let mut inner = self.inner.write();
        inner.data.insert(key.clone(), Entry { value, expires_at });
        Self::bump(&mut inner, &key);
        drop(inner);
        self.notify.notify_waiters();
    }

    pub fn get_value_cloned(&self, key: &[u8]) -> Option<Value> {
        let mut inner = self.inner.write();
        Self::reap_if_expired(&mut inner, key);
        inner.data.get(key).map(|e| e.value.clone())
    }

    /// Read-only type-guarded access. `Ok(None)` means the key is absent.
    pub fn read<R>(&self, key: &[u8], f: impl FnOnce(&Value) -> KeyResult<R>) -> KeyResult<Option<R>> {
        let mut inner = self.inner.write();
        Self::reap_if_expired(&mut inner, key);
        match inner.data.get(key) {
            None => Ok(None),
            Some(e) => f(&e.value).map(Some),
        }
    }

    /// Type-guarded mutation against an existing key only. `Ok(None)` means the key is absent
    /// and `f` never ran. Deletes the key afterward if it became an empty collection (§3.3).
    pub fn mutate_if_exists<R>(
        &self,
        key: &[u8],
        f: impl FnOnce(&mut Value) -> KeyResult<R>,
    ) -> KeyResult<Option<R>> {
        let mut inner = self.inner.write();
        Self::reap_if_expired(&mut inner, key);
        if !inner.data.contains_key(key) {
            return Ok(None);
        }
        let result = {
            let entry = inner.data.get_mut(key).unwrap();
            f(&mut entry.value)?
        };
        if inner.data.get(key).unwrap().value.is_empty_collection() {
            inner.data.remove(key);
        }
        Self::bump(&mut inner, key);
        drop(inner);
        self.notify.notify_waiters();
        Ok(Some(result))
    }

    /// Type-guarded mutation that creates the key with `default()` first if absent. If `f`
    /// fails, any just-created default is rolled back so a failed `WRONGTYPE`-adjacent op never
    /// leaves a spurious empty key behind.
    pub fn mutate_or_create<R>(
        &self,
        key: &[u8],
        default: impl FnOnce() -> Value,
        f: impl FnOnce(&mut Value) -> KeyResult<R>,
    ) -> KeyResult<R> {
        let mut inner = self.inner.write();
        Self::reap_if_expired(&mut inner, key);
        let created = !inner.data.contains_key(key);
        if created {
            inner.data.insert(
                key.to_vec(),
                Entry {
                    value: default(),
                    expires_at: None,
                },
            );
        }
        let result = {
            let entry = inner.data.get_mut(key).unwrap();
            f(&mut entry.value)
        };
        match &result {
            Ok(_) => {
                if inner.data.get(key).unwrap().value.is_empty_collection() {
                    inner.data.remove(key);
                }
                Self::bump(&mut inner, key);
                drop(inner);
                self.notify.notify_waiters();
            }
            Err(_) if created => {
                inner.data.remove(key);
            }
            Err(_) => {}
        }
        result
    }
}

/// Converts a wall-clock deadline (as quoted by clients in `EXPIREAT`/`PXAT`/etc.) to the
/// `Instant` the store actually compares against.
pub fn wall_deadline_to_instant(target: SystemTime) -> Instant {
    let now_wall = SystemTime::now();
    match target.duration_since(now_wall) {
        Ok(remaining) => Instant::now() + remaining,
        Err(_) => Instant::now(), // already in the past: expires immediately
    }
}

/// The top-level engine handle: sixteen [`Database`]s, numbered 0..15, all pre-allocated.
/// A "constructed lazily on first reference" database and one that's simply sitting there
/// empty are observably identical for a `HashMap`-backed store, so this allocates all
/// sixteen up front instead of tracking which ones have been touched.
pub struct Memstore {
    dbs: Vec<Database>,
}

impl Memstore {
    pub fn new(num_databases: usize) -> Self {
        let mut dbs = Vec::with_capacity(num_databases);
        dbs.resize_with(num_databases, Database::default);
        Self { dbs }
    }

    pub fn db(&self, idx: usize) -> &Database {
        &self.dbs[idx]
    }

    pub fn num_databases(&self) -> usize {
        self.dbs.len()
    }

    pub fn swap(&self, a: usize, b: usize) {
        // both databases live behind independent locks; taking them in index order avoids
        // a lock-ordering deadlock against a concurrent SWAPDB on the same pair
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        if lo == hi {
            return;
        }
        let mut lo_guard = self.dbs[lo].inner.write();
        let mut hi_guard = self.dbs[hi].inner.write();
        std::mem::swap(&mut *lo_guard, &mut *hi_guard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_collection_is_deleted_on_last_pop() {
        let store = Memstore::new(1);
        let db = store.db(0);
        db.mutate_or_create(
            b"l",
            || Value::List(Default::default()),
            |v| {
                v.as_list_mut().unwrap().push_back(b"a".to_vec());
                Ok(())
            },
        )
        .unwrap();
        assert!(db.exists(b"l"));
        db.mutate_if_exists(b"l", |v| {
            v.as_list_mut().unwrap().pop_front();
            Ok(())
        })
        .unwrap();
        assert!(!db.exists(b"l"));
    }

    #[test]
    fn wrong_type_leaves_keyspace_unchanged() {
        let store = Memstore::new(1);
        let db = store.db(0);
        db.set_value(b"k".to_vec(), Value::Str(b"v".to_vec()), None);
        let err = db.mutate_if_exists(b"k", |v| v.as_list_mut().map(|_| ()));
        assert_eq!(err, Err(KeyError::WrongType));
        assert_eq!(db.type_of(b"k"), Some(TypeTag::String));
    }

    /// A failed `mutate_or_create` (e.g. `LPUSH` against a string key) must not bump the key's
    /// WATCH version — otherwise a command that changed nothing would still abort an unrelated
    /// transaction watching that key.
    #[test]
    fn failed_mutate_or_create_does_not_bump_version() {
        let store = Memstore::new(1);
        let db = store.db(0);
        db.set_value(b"k".to_vec(), Value::Str(b"v".to_vec()), None);
        let before = db.current_version(b"k");
        let err = db.mutate_or_create(b"k", || Value::List(Default::default()), |v| {
            v.as_list_mut().map(|_| ())
        });
        assert_eq!(err, Err(KeyError::WrongType));
        assert_eq!(db.current_version(b"k"), before);
    }

    #[test]
    fn expired_key_is_absent_and_never_orphaned() {
        let store = Memstore::new(1);
        let db = store.db(0);
        db.set_value(b"k".to_vec(), Value::Str(b"v".to_vec()), Some(Instant::now()));
        std::thread::sleep(Duration::from_millis(5));
        assert!(!db.exists(b"k"));
        assert_eq!(db.ttl(b"k"), None);
    }
}
