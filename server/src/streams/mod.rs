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

//! The stream value type (§4.5): an append-only log of field/value entries keyed by a
//! 128-bit, strictly monotonic ID, plus consumer groups with their own per-group cursor and
//! pending-entries list (PEL).

use crate::keyspace::error::{KeyError, KeyResult};
use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    time::{SystemTime, UNIX_EPOCH},
};
use tokio::sync::Notify;

/// `<ms>-<seq>`: milliseconds since epoch plus a per-millisecond sequence counter. Ordering is
/// the derived lexicographic (ms, seq) order, matching wire representation (§4.5.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId {
    pub ms: u64,
    pub seq: u64,
}

impl StreamId {
    pub const MIN: StreamId = StreamId { ms: 0, seq: 0 };
    pub const MAX: StreamId = StreamId {
        ms: u64::MAX,
        seq: u64::MAX,
    };

    pub fn now() -> StreamId {
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        StreamId { ms, seq: 0 }
    }

    /// The smallest ID strictly greater than `self`, used to continue a range after an
    /// exclusive bound.
    pub fn next(self) -> StreamId {
        if self.seq == u64::MAX {
            StreamId {
                ms: self.ms + 1,
                seq: 0,
            }
        } else {
            StreamId {
                ms: self.ms,
                seq: self.seq + 1,
            }
        }
    }

    /// The largest ID strictly smaller than `self`, used to turn an exclusive upper bound
    /// (`XRANGE key (5-1 +`) into the inclusive one `range()` expects.
    pub fn prev(self) -> StreamId {
        if self.seq == 0 {
            StreamId {
                ms: self.ms.saturating_sub(1),
                seq: u64::MAX,
            }
        } else {
            StreamId {
                ms: self.ms,
                seq: self.seq - 1,
            }
        }
    }

    pub fn parse(s: &str) -> KeyResult<StreamId> {
        let (ms_part, seq_part) = match s.split_once('-') {
            Some((m, s)) => (m, Some(s)),
            None => (s, None),
        };
        let ms: u64 = ms_part.parse().map_err(|_| KeyError::SyntaxError)?;
        let seq: u64 = match seq_part {
            Some(s) => s.parse().map_err(|_| KeyError::SyntaxError)?,
            None => 0,
        };
        Ok(StreamId { ms, seq })
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

/// The three forms an `XADD` ID argument can take (§4.5.1).
#[derive(Debug, Clone, Copy)]
pub enum XaddId {
    /// `*`: fully auto-generated.
    Auto,
    /// `<ms>-*`: caller pins the millisecond, the sequence auto-increments within it.
    AutoSeq(u64),
    /// `<ms>-<seq>`: fully explicit, must be strictly greater than `last_id`.
    Explicit(StreamId),
}

#[derive(Debug, Clone)]
pub struct StreamEntry {
    pub id: StreamId,
    pub fields: Vec<(Vec<u8>, Vec<u8>)>,
}

#[derive(Debug, Clone)]
pub struct PendingEntry {
    pub consumer: Vec<u8>,
    pub delivery_time: SystemTime,
    pub delivery_count: u64,
}

/// One row of `XPENDING`'s extended form: `(id, consumer, idle_ms, delivery_count)`.
#[derive(Debug, Clone)]
pub struct PendingDetail {
    pub id: StreamId,
    pub consumer: Vec<u8>,
    pub idle_ms: u64,
    pub delivery_count: u64,
}

#[derive(Debug, Clone)]
pub struct GroupInfo {
    pub name: Vec<u8>,
    pub consumers: usize,
    pub pending: usize,
    pub last_delivered: StreamId,
}

#[derive(Debug, Clone)]
pub struct ConsumerInfo {
    pub name: Vec<u8>,
    pub pending: usize,
    pub idle_ms: u64,
}

#[derive(Debug, Default)]
pub struct ConsumerGroup {
    /// Entries with an ID greater than this have never been delivered to this group via
    /// `XREADGROUP` (the group's cursor, independent of other groups on the same stream).
    pub last_delivered: Option<StreamId>,
    pub pending: BTreeMap<StreamId, PendingEntry>,
    pub consumers: HashMap<Vec<u8>, SystemTime>,
}

/// A stream value. Carries its own `Notify` so `XREAD BLOCK` can wait on exactly this stream
/// rather than the database-wide write notification (§4.5.5 calls for per-stream wait lists).
#[derive(Debug)]
pub struct Stream {
    entries: BTreeMap<StreamId, Vec<(Vec<u8>, Vec<u8>)>>,
    pub last_id: StreamId,
    pub max_deleted_id: StreamId,
    pub entries_added: u64,
    groups: HashMap<Vec<u8>, ConsumerGroup>,
    notify: Notify,
}

impl Clone for Stream {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            last_id: self.last_id,
            max_deleted_id: self.max_deleted_id,
            entries_added: self.entries_added,
            groups: self
                .groups
                .iter()
                .map(|(k, v)| {
                    (
                        k.clone(),
                        ConsumerGroup {
                            last_delivered: v.last_delivered,
                            pending: v.pending.clone(),
                            consumers: v.consumers.clone(),
                        },
                    )
                })
                .collect(),
            notify: Notify::new(),
        }
    }
}

impl Default for Stream {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            last_id: StreamId::MIN,
            max_deleted_id: StreamId::MIN,
            entries_added: 0,
            groups: HashMap::new(),
            notify: Notify::new(),
        }
    }
}

impl Stream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn notified(&self) -> tokio::sync::futures::Notified<'_> {
        self.notify.notified()
    }

    /// Appends a new entry. `Auto` means `XADD key * ...` (current wall clock, bumping the
    /// sequence instead if that would not advance the ID); `AutoSeq(ms)` means `XADD key
    /// <ms>-* ...`; `Explicit(id)` must be strictly greater than `last_id` (§4.5.1, §4.5.2).
    pub fn append(&mut self, requested: XaddId, fields: Vec<(Vec<u8>, Vec<u8>)>) -> KeyResult<StreamId> {
        let id = match requested {
            XaddId::Auto => {
                let candidate = StreamId::now();
                if candidate > self.last_id {
                    candidate
                } else {
                    StreamId {
                        ms: self.last_id.ms,
                        seq: self.last_id.seq + 1,
                    }
                }
            }
            XaddId::AutoSeq(ms) => {
                if ms < self.last_id.ms {
                    return Err(KeyError::StreamIdTooSmall);
                } else if ms == self.last_id.ms {
                    StreamId {
                        ms,
                        seq: self.last_id.seq + 1,
                    }
                } else {
                    StreamId { ms, seq: 0 }
                }
            }
            XaddId::Explicit(id) => {
                if id <= self.last_id {
                    return Err(KeyError::StreamIdTooSmall);
                }
                id
            }
        };
        self.entries.insert(id, fields);
        self.last_id = id;
        self.entries_added += 1;
        self.notify.notify_waiters();
        Ok(id)
    }

    /// `(start, end]` is exclusive of `start` when `after` is true, matching `XREAD`'s "greater
    /// than the last-seen ID" semantics; `XRANGE` passes `after = false` for an inclusive lower
    /// bound.
    pub fn range(&self, start: StreamId, end: StreamId, after: bool, count: Option<usize>) -> Vec<StreamEntry> {
        let lower = if after { start.next() } else { start };
        let iter = self
            .entries
            .range(lower..=end)
            .map(|(id, fields)| StreamEntry {
                id: *id,
                fields: fields.clone(),
            });
        match count {
            Some(n) => iter.take(n).collect(),
            None => iter.collect(),
        }
    }

    pub fn range_rev(&self, start: StreamId, end: StreamId, count: Option<usize>) -> Vec<StreamEntry> {
        let iter = self
            .entries
            .range(end..=start)
            .rev()
            .map(|(id, fields)| StreamEntry {
                id: *id,
                fields: fields.clone(),
            });
        match count {
            Some(n) => iter.take(n).collect(),
            None => iter.collect(),
        }
    }

    pub fn delete(&mut self, ids: &[StreamId]) -> usize {
        let mut removed = 0;
        for id in ids {
            if self.entries.remove(id).is_some() {
                removed += 1;
                if *id > self.max_deleted_id {
                    self.max_deleted_id = *id;
                }
            }
        }
        removed
    }

    /// Trims to at most `max_len` entries, dropping the oldest first. Returns the count
    /// removed.
    pub fn trim_to_maxlen(&mut self, max_len: usize) -> usize {
        let mut removed = 0;
        while self.entries.len() > max_len {
            if let Some((&id, _)) = self.entries.iter().next() {
                self.entries.remove(&id);
                if id > self.max_deleted_id {
                    self.max_deleted_id = id;
                }
                removed += 1;
            } else {
                break;
            }
        }
        removed
    }

    pub fn trim_to_minid(&mut self, min_id: StreamId) -> usize {
        let to_remove: Vec<StreamId> = self.entries.range(..min_id).map(|(id, _)| *id).collect();
        self.delete(&to_remove)
    }

    pub fn create_group(&mut self, name: Vec<u8>, start_after: StreamId) -> KeyResult<()> {
        if self.groups.contains_key(&name) {
            return Err(KeyError::BusyGroup);
        }
        self.groups.insert(
            name,
            ConsumerGroup {
                last_delivered: Some(start_after),
                pending: BTreeMap::new(),
                consumers: HashMap::new(),
            },
        );
        Ok(())
    }

    pub fn destroy_group(&mut self, name: &[u8]) -> bool {
        self.groups.remove(name).is_some()
    }

    /// `XGROUP SETID`: repositions `group_name`'s cursor without touching its PEL.
    pub fn set_group_cursor(&mut self, group_name: &[u8], id: StreamId) -> KeyResult<bool> {
        match self.groups.get_mut(group_name) {
            Some(group) => {
                group.last_delivered = Some(id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// `XGROUP CREATECONSUMER`: returns whether a new, empty consumer was actually added.
    pub fn create_consumer(&mut self, group_name: &[u8], consumer: Vec<u8>) -> KeyResult<bool> {
        let group = self.groups.get_mut(group_name).ok_or(KeyError::NoSuchKey)?;
        Ok(group.consumers.insert(consumer, SystemTime::now()).is_none())
    }

    /// `XGROUP DELCONSUMER`: removes the consumer and drops its pending entries from the PEL,
    /// returning how many were dropped.
    pub fn delete_consumer(&mut self, group_name: &[u8], consumer: &[u8]) -> KeyResult<usize> {
        let group = self.groups.get_mut(group_name).ok_or(KeyError::NoSuchKey)?;
        group.consumers.remove(consumer);
        let to_remove: Vec<StreamId> = group
            .pending
            .iter()
            .filter(|(_, p)| p.consumer == consumer)
            .map(|(id, _)| *id)
            .collect();
        for id in &to_remove {
            group.pending.remove(id);
        }
        Ok(to_remove.len())
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn first_entry(&self) -> Option<StreamEntry> {
        self.entries.iter().next().map(|(&id, fields)| StreamEntry {
            id,
            fields: fields.clone(),
        })
    }

    pub fn last_entry(&self) -> Option<StreamEntry> {
        self.entries.iter().next_back().map(|(&id, fields)| StreamEntry {
            id,
            fields: fields.clone(),
        })
    }

    /// `XINFO GROUPS`.
    pub fn group_infos(&self) -> Vec<GroupInfo> {
        self.groups
            .iter()
            .map(|(name, g)| GroupInfo {
                name: name.clone(),
                consumers: g.consumers.len(),
                pending: g.pending.len(),
                last_delivered: g.last_delivered.unwrap_or(StreamId::MIN),
            })
            .collect()
    }

    /// `XINFO CONSUMERS`.
    pub fn consumer_infos(&self, group_name: &[u8]) -> KeyResult<Vec<ConsumerInfo>> {
        let group = self.groups.get(group_name).ok_or(KeyError::NoSuchKey)?;
        let now = SystemTime::now();
        Ok(group
            .consumers
            .iter()
            .map(|(name, last_seen)| {
                let pending = group.pending.values().filter(|p| &p.consumer == name).count();
                ConsumerInfo {
                    name: name.clone(),
                    pending,
                    idle_ms: now.duration_since(*last_seen).unwrap_or_default().as_millis() as u64,
                }
            })
            .collect())
    }

    pub fn group(&self, name: &[u8]) -> Option<&ConsumerGroup> {
        self.groups.get(name)
    }

    pub fn group_mut(&mut self, name: &[u8]) -> Option<&mut ConsumerGroup> {
        self.groups.get_mut(name)
    }

    /// Delivers up to `count` never-delivered entries to `consumer` in group `group_name`,
    /// advancing the group's cursor and recording each in the PEL (§4.5.4).
    pub fn read_group(
        &mut self,
        group_name: &[u8],
        consumer: Vec<u8>,
        count: Option<usize>,
    ) -> KeyResult<Vec<StreamEntry>> {
        let entries = &self.entries;
        let group = self.groups.get_mut(group_name).ok_or(KeyError::NoSuchKey)?;
        group.consumers.insert(consumer.clone(), SystemTime::now());
        let lower = group.last_delivered.map(StreamId::next).unwrap_or(StreamId::MIN);
        let limit = count.unwrap_or(usize::MAX);
        let mut out = Vec::new();
        for (&id, fields) in entries.range(lower..) {
            if out.len() >= limit {
                break;
            }
            out.push(StreamEntry {
                id,
                fields: fields.clone(),
            });
            group.last_delivered = Some(id);
            group.pending.insert(
                id,
                PendingEntry {
                    consumer: consumer.clone(),
                    delivery_time: SystemTime::now(),
                    delivery_count: 1,
                },
            );
        }
        Ok(out)
    }

    /// Re-reads entries already in `consumer`'s own pending list (`XREADGROUP` with an ID
    /// other than `>`), without touching the group cursor.
    pub fn read_group_history(&self, group_name: &[u8], consumer: &[u8], after: StreamId) -> KeyResult<Vec<StreamEntry>> {
        let group = self.groups.get(group_name).ok_or(KeyError::NoSuchKey)?;
        let mut out = Vec::new();
        for (&id, pending) in group.pending.range(after..) {
            if pending.consumer == consumer {
                if let Some(fields) = self.entries.get(&id) {
                    out.push(StreamEntry {
                        id,
                        fields: fields.clone(),
                    });
                }
            }
        }
        Ok(out)
    }

    pub fn ack(&mut self, group_name: &[u8], ids: &[StreamId]) -> usize {
        let Some(group) = self.groups.get_mut(group_name) else {
            return 0;
        };
        let mut acked = 0;
        for id in ids {
            if group.pending.remove(id).is_some() {
                acked += 1;
            }
        }
        acked
    }

    /// Reassigns pending entries idle for at least `min_idle` to `new_consumer`, bumping their
    /// delivery count (`XCLAIM`, §4.5.4). `force` additionally claims `ids` that exist in the
    /// stream but aren't yet in the PEL at all. `set_idle`/`set_delivery_count` implement the
    /// `IDLE`/`RETRYCOUNT` overrides; `None` means "reset to now" / "increment by one" as usual.
    pub fn claim(
        &mut self,
        group_name: &[u8],
        new_consumer: Vec<u8>,
        ids: &[StreamId],
        min_idle: std::time::Duration,
        force: bool,
        set_idle: Option<std::time::Duration>,
        set_delivery_count: Option<u64>,
    ) -> KeyResult<Vec<StreamEntry>> {
        let entries = &self.entries;
        let group = self.groups.get_mut(group_name).ok_or(KeyError::NoSuchKey)?;
        let now = SystemTime::now();
        let mut claimed = Vec::new();
        for id in ids {
            let eligible = match group.pending.get(id) {
                Some(pending) => now.duration_since(pending.delivery_time).unwrap_or_default() >= min_idle,
                None => force && entries.contains_key(id),
            };
            if !eligible {
                continue;
            }
            let delivery_count = match group.pending.get(id) {
                Some(p) => set_delivery_count.unwrap_or(p.delivery_count + 1),
                None => set_delivery_count.unwrap_or(1),
            };
            let delivery_time = set_idle.and_then(|d| now.checked_sub(d)).unwrap_or(now);
            group.pending.insert(
                *id,
                PendingEntry {
                    consumer: new_consumer.clone(),
                    delivery_time,
                    delivery_count,
                },
            );
            if let Some(fields) = entries.get(id) {
                claimed.push(StreamEntry {
                    id: *id,
                    fields: fields.clone(),
                });
            }
        }
        group.consumers.entry(new_consumer).or_insert(now);
        Ok(claimed)
    }

    pub fn pending_summary(&self, group_name: &[u8]) -> KeyResult<(usize, Option<StreamId>, Option<StreamId>)> {
        let group = self.groups.get(group_name).ok_or(KeyError::NoSuchKey)?;
        let lo = group.pending.keys().next().copied();
        let hi = group.pending.keys().next_back().copied();
        Ok((group.pending.len(), lo, hi))
    }

    /// Per-consumer pending counts, for `XPENDING`'s summary form.
    pub fn pending_by_consumer(&self, group_name: &[u8]) -> KeyResult<Vec<(Vec<u8>, usize)>> {
        let group = self.groups.get(group_name).ok_or(KeyError::NoSuchKey)?;
        let mut counts: HashMap<&[u8], usize> = HashMap::new();
        for pending in group.pending.values() {
            *counts.entry(pending.consumer.as_slice()).or_insert(0) += 1;
        }
        Ok(counts.into_iter().map(|(c, n)| (c.to_vec(), n)).collect())
    }

    /// `XPENDING`'s extended form: entries in `[lower, upper]`, optionally filtered by
    /// `consumer` and by a minimum idle time, capped at `count` rows.
    pub fn pending_range(
        &self,
        group_name: &[u8],
        lower: StreamId,
        upper: StreamId,
        count: usize,
        consumer: Option<&[u8]>,
        min_idle: Option<std::time::Duration>,
    ) -> KeyResult<Vec<PendingDetail>> {
        let group = self.groups.get(group_name).ok_or(KeyError::NoSuchKey)?;
        let now = SystemTime::now();
        let mut out = Vec::new();
        for (&id, pending) in group.pending.range(lower..=upper) {
            if out.len() >= count {
                break;
            }
            if let Some(c) = consumer {
                if pending.consumer != c {
                    continue;
                }
            }
            let idle = now.duration_since(pending.delivery_time).unwrap_or_default();
            if let Some(min) = min_idle {
                if idle < min {
                    continue;
                }
            }
            out.push(PendingDetail {
                id,
                consumer: pending.consumer.clone(),
                idle_ms: idle.as_millis() as u64,
                delivery_count: pending.delivery_count,
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_strictly_monotonic() {
        let mut s = Stream::new();
        let id1 = s.append(XaddId::Auto, vec![(b"f".to_vec(), b"v".to_vec())]).unwrap();
        let id2 = s.append(XaddId::Auto, vec![(b"f".to_vec(), b"v2".to_vec())]).unwrap();
        assert!(id2 > id1);
    }

    #[test]
    fn explicit_id_must_advance() {
        let mut s = Stream::new();
        s.append(XaddId::Explicit(StreamId { ms: 5, seq: 0 }), vec![]).unwrap();
        let err = s.append(XaddId::Explicit(StreamId { ms: 5, seq: 0 }), vec![]);
        assert!(err.is_err());
        let ok = s.append(XaddId::Explicit(StreamId { ms: 5, seq: 1 }), vec![]);
        assert!(ok.is_ok());
    }

    #[test]
    fn group_read_advances_cursor_and_fills_pel() {
        let mut s = Stream::new();
        let id1 = s.append(XaddId::Auto, vec![]).unwrap();
        s.create_group(b"g".to_vec(), StreamId::MIN).unwrap();
        let delivered = s.read_group(b"g", b"c1".to_vec(), None).unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].id, id1);
        let (pending_count, _, _) = s.pending_summary(b"g").unwrap();
        assert_eq!(pending_count, 1);
    }
}
