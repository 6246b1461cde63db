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

//! Publish/subscribe (§4.4): per-connection mailboxes keyed by a connection ID, with reverse
//! indices from channel/pattern to subscriber so `PUBLISH` doesn't need to scan every
//! connection.

pub mod glob;

use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;

pub type ConnectionId = u64;

#[derive(Debug, Clone)]
pub enum PushMessage {
    Message { channel: Bytes, payload: Bytes },
    PMessage {
        pattern: Bytes,
        channel: Bytes,
        payload: Bytes,
    },
}

struct Mailbox {
    sender: mpsc::UnboundedSender<PushMessage>,
}

#[derive(Default)]
struct Inner {
    mailboxes: HashMap<ConnectionId, Mailbox>,
    /// channel -> subscribed connection IDs
    channels: HashMap<Bytes, HashSet<ConnectionId>>,
    /// pattern -> subscribed connection IDs
    patterns: HashMap<Bytes, HashSet<ConnectionId>>,
}

/// The process-wide publish/subscribe manager. One instance is shared by every connection
/// (§4.4) — a single `RwLock` is enough because subscribe/unsubscribe/publish are all O(1) or
/// O(matching patterns), never proportional to total keyspace size.
#[derive(Default)]
pub struct PubSub {
    inner: RwLock<Inner>,
}

impl PubSub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection's mailbox. Must be called once per connection before any
    /// subscribe call; the returned receiver is drained by the connection's write-side task.
    pub fn register(&self, conn: ConnectionId) -> mpsc::UnboundedReceiver<PushMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.write().mailboxes.insert(conn, Mailbox { sender: tx });
        rx
    }

    /// Removes a connection entirely: its mailbox and every channel/pattern subscription.
    pub fn deregister(&self, conn: ConnectionId) {
        let mut inner = self.inner.write();
        inner.mailboxes.remove(&conn);
        Self::drop_subscriptions(&mut inner, conn);
    }

    /// Drops every channel/pattern subscription for `conn` but keeps its mailbox registered
    /// (§4.7 `RESET`: the connection stays open and un-subscribed, not torn down).
    pub fn unsubscribe_all(&self, conn: ConnectionId) {
        Self::drop_subscriptions(&mut self.inner.write(), conn);
    }

    fn drop_subscriptions(inner: &mut Inner, conn: ConnectionId) {
        inner.channels.values_mut().for_each(|s| {
            s.remove(&conn);
        });
        inner.channels.retain(|_, s| !s.is_empty());
        inner.patterns.values_mut().for_each(|s| {
            s.remove(&conn);
        });
        inner.patterns.retain(|_, s| !s.is_empty());
    }

    pub fn subscribe(&self, conn: ConnectionId, channel: Bytes) {
        self.inner
            .write()
            .channels
            .entry(channel)
            .or_default()
            .insert(conn);
    }

    pub fn unsubscribe(&self, conn: ConnectionId, channel: &[u8]) {
        let mut inner = self.inner.write();
        if let Some(set) = inner.channels.get_mut(channel) {
            set.remove(&conn);
            if set.is_empty() {
                inner.channels.remove(channel);
            }
        }
    }

    pub fn psubscribe(&self, conn: ConnectionId, pattern: Bytes) {
        self.inner
            .write()
            .patterns
            .entry(pattern)
            .or_default()
            .insert(conn);
    }

    pub fn punsubscribe(&self, conn: ConnectionId, pattern: &[u8]) {
        let mut inner = self.inner.write();
        if let Some(set) = inner.patterns.get_mut(pattern) {
            set.remove(&conn);
            if set.is_empty() {
                inner.patterns.remove(pattern);
            }
        }
    }

    /// Delivers `payload` on `channel` to every direct subscriber and every matching pattern
    /// subscriber. A connection subscribed both directly and via a matching pattern receives
    /// two pushes (one `message`, one `pmessage`) and is counted twice, matching Redis: the
    /// returned count is the number of deliveries, not the number of distinct connections
    /// reached (§4.4, §8 property 7 only requires the count to be `>= 1`).
    pub fn publish(&self, channel: &[u8], payload: Bytes) -> usize {
        let inner = self.inner.read();
        let mut delivered = 0usize;
        if let Some(subs) = inner.channels.get(channel) {
            for &conn in subs {
                if let Some(mailbox) = inner.mailboxes.get(&conn) {
                    let _ = mailbox.sender.send(PushMessage::Message {
                        channel: Bytes::copy_from_slice(channel),
                        payload: payload.clone(),
                    });
                    delivered += 1;
                }
            }
        }
        for (pattern, subs) in inner.patterns.iter() {
            if !glob::glob_match(pattern, channel) {
                continue;
            }
            for &conn in subs {
                if let Some(mailbox) = inner.mailboxes.get(&conn) {
                    let _ = mailbox.sender.send(PushMessage::PMessage {
                        pattern: pattern.clone(),
                        channel: Bytes::copy_from_slice(channel),
                        payload: payload.clone(),
                    });
                    delivered += 1;
                }
            }
        }
        delivered
    }

    pub fn active_channels(&self, pattern: Option<&[u8]>) -> Vec<Bytes> {
        let inner = self.inner.read();
        inner
            .channels
            .keys()
            .filter(|c| pattern.map(|p| glob::glob_match(p, c)).unwrap_or(true))
            .cloned()
            .collect()
    }

    pub fn channel_subscriber_count(&self, channel: &[u8]) -> usize {
        self.inner
            .read()
            .channels
            .get(channel)
            .map(|s| s.len())
            .unwrap_or(0)
    }

    pub fn pattern_subscription_count(&self) -> usize {
        self.inner.read().patterns.values().map(|s| s.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_and_pattern_subscriber_each_receive_once() {
        let ps = PubSub::new();
        let mut rx = ps.register(1);
        ps.subscribe(1, Bytes::from_static(b"news"));
        ps.psubscribe(1, Bytes::from_static(b"n*"));
        let delivered = ps.publish(b"news", Bytes::from_static(b"hello"));
        // Two deliveries (one direct, one pattern) to the same connection, matching Redis'
        // per-delivery PUBLISH count rather than a per-connection one.
        assert_eq!(delivered, 2);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn deregister_drops_all_subscriptions() {
        let ps = PubSub::new();
        let _rx = ps.register(1);
        ps.subscribe(1, Bytes::from_static(b"a"));
        ps.deregister(1);
        assert_eq!(ps.channel_subscriber_count(b"a"), 0);
    }

    /// `unsubscribe_all` (used by `RESET`, §4.7) drops subscriptions but must leave the
    /// connection's mailbox registered so it can keep receiving non-pub/sub replies.
    #[test]
    fn unsubscribe_all_keeps_mailbox_registered() {
        let ps = PubSub::new();
        let _rx = ps.register(1);
        ps.subscribe(1, Bytes::from_static(b"a"));
        ps.psubscribe(1, Bytes::from_static(b"a*"));
        ps.unsubscribe_all(1);
        assert_eq!(ps.channel_subscriber_count(b"a"), 0);
        assert_eq!(ps.pattern_subscription_count(), 0);
        assert_eq!(ps.publish(b"a", Bytes::from_static(b"x")), 0);
    }
}
