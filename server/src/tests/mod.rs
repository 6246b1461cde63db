/*
 * Created on Mon Jul 20 2026
 *
 * This file is a part of Skytable
 * Skytable (formerly known as TerrabaseDB or Skybase) is a free and open-source
 * NoSQL database written by Sayan Nandan ("the Author") with the
 * vision to provide flexibility in data modelling without compromising
 * on performance, queryability or scalability.
 *
 * Copyright (c) 2026, Sayan Nandan <ohsayan@outlook.com>
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

//! End-to-end command tests: each one drives a request through `dbnet::handle_request`, the
//! same entry point a live connection's task loop calls per parsed command (including the
//! `MULTI`-queueing intercept), asserting on the literal RESP bytes written back. These cover
//! concrete end-to-end scenarios rather than re-testing what the per-module unit tests already
//! do in isolation.

use crate::commands::{ConnectionState, Engine};
use crate::protocol::{ProtocolVersion, RespWriter};
use bytes::Bytes;

fn args(raw: &[&str]) -> Vec<Bytes> {
    raw.iter().map(|a| Bytes::copy_from_slice(a.as_bytes())).collect()
}

/// Sends one request against `state`, clearing `buf` first so it holds exactly that request's
/// reply afterward.
async fn send(engine: &Engine, state: &mut ConnectionState, buf: &mut Vec<u8>, name: &str, raw_args: &[&str]) {
    buf.clear();
    let mut writer = RespWriter::new(&mut *buf, ProtocolVersion::Resp2);
    let mut request = vec![Bytes::copy_from_slice(name.as_bytes())];
    request.extend(args(raw_args));
    crate::dbnet::handle_request(engine, state, &mut writer, request)
        .await
        .expect("handle_request is infallible for these well-formed requests");
    writer.flush().await.unwrap();
}

fn engine() -> Engine {
    Engine::new(16, None)
}

/// S1: `SET`/`GET`/`DEL` round trip, including the null bulk reply once the key is gone.
#[tokio::test]
async fn set_get_del_round_trip() {
    let engine = engine();
    let mut state = ConnectionState::new(1);
    let mut buf = Vec::new();

    send(&engine, &mut state, &mut buf, "SET", &["k", "v"]).await;
    assert_eq!(buf, b"+OK\r\n");

    send(&engine, &mut state, &mut buf, "GET", &["k"]).await;
    assert_eq!(buf, b"$1\r\nv\r\n");

    send(&engine, &mut state, &mut buf, "DEL", &["k"]).await;
    assert_eq!(buf, b":1\r\n");

    send(&engine, &mut state, &mut buf, "GET", &["k"]).await;
    assert_eq!(buf, b"$-1\r\n");
}

/// S2: list push/range/pop, and the empty-collection invariant (§3.3) once the last element
/// is popped: the key must stop existing rather than linger as an empty list.
#[tokio::test]
async fn list_push_range_pop_and_empty_collection_invariant() {
    let engine = engine();
    let mut state = ConnectionState::new(1);
    let mut buf = Vec::new();

    send(&engine, &mut state, &mut buf, "RPUSH", &["L", "a", "b", "c"]).await;
    assert_eq!(buf, b":3\r\n");

    send(&engine, &mut state, &mut buf, "LRANGE", &["L", "0", "-1"]).await;
    assert_eq!(buf, b"*3\r\n$1\r\na\r\n$1\r\nb\r\n$1\r\nc\r\n");

    send(&engine, &mut state, &mut buf, "LPOP", &["L"]).await;
    assert_eq!(buf, b"$1\r\na\r\n");

    send(&engine, &mut state, &mut buf, "EXISTS", &["L"]).await;
    assert_eq!(buf, b":1\r\n");

    send(&engine, &mut state, &mut buf, "LPOP", &["L", "5"]).await;
    assert_eq!(buf, b"*2\r\n$1\r\nb\r\n$1\r\nc\r\n");

    send(&engine, &mut state, &mut buf, "EXISTS", &["L"]).await;
    assert_eq!(buf, b":0\r\n");
    send(&engine, &mut state, &mut buf, "TYPE", &["L"]).await;
    assert_eq!(buf, b"+none\r\n");
}

/// S3: `ZRANGE ... WITHSCORES` orders by score then lexicographically on a tie.
#[tokio::test]
async fn zset_range_withscores_ties_break_lexicographically() {
    let engine = engine();
    let mut state = ConnectionState::new(1);
    let mut buf = Vec::new();

    send(&engine, &mut state, &mut buf, "ZADD", &["Z", "1", "a", "2", "b", "1", "c"]).await;
    assert_eq!(buf, b":3\r\n");

    send(&engine, &mut state, &mut buf, "ZRANGE", &["Z", "0", "-1", "WITHSCORES"]).await;
    assert_eq!(
        buf,
        b"*6\r\n$1\r\na\r\n$1\r\n1\r\n$1\r\nc\r\n$1\r\n1\r\n$1\r\nb\r\n$1\r\n2\r\n"
    );
}

/// Type safety (§8 property 2): a command requiring one type on a key of another fails
/// `WRONGTYPE` and leaves the keyspace untouched.
#[tokio::test]
async fn wrongtype_guard_rejects_mismatched_command() {
    let engine = engine();
    let mut state = ConnectionState::new(1);
    let mut buf = Vec::new();

    send(&engine, &mut state, &mut buf, "RPUSH", &["k", "a"]).await;
    send(&engine, &mut state, &mut buf, "GET", &["k"]).await;
    assert_eq!(buf, b"-WRONGTYPE Operation against a key holding the wrong kind of value\r\n");

    send(&engine, &mut state, &mut buf, "LRANGE", &["k", "0", "-1"]).await;
    assert_eq!(buf, b"*1\r\n$1\r\na\r\n");
}

/// S6: successive `XADD` calls on the same stream yield strictly increasing IDs, and `XLEN`
/// reflects both appends.
#[tokio::test]
async fn stream_ids_are_strictly_monotonic() {
    let engine = engine();
    let mut state = ConnectionState::new(1);
    let mut buf = Vec::new();

    send(&engine, &mut state, &mut buf, "XADD", &["s", "*", "f", "v"]).await;
    let first = String::from_utf8(buf.clone()).unwrap();

    send(&engine, &mut state, &mut buf, "XADD", &["s", "*", "f", "v2"]).await;
    let second = String::from_utf8(buf.clone()).unwrap();

    let parse_id = |reply: &str| -> (u64, u64) {
        let body = reply.strip_prefix('$').unwrap();
        let (_, rest) = body.split_once("\r\n").unwrap();
        let id = rest.trim_end_matches("\r\n");
        let (ms, seq) = id.split_once('-').unwrap();
        (ms.parse().unwrap(), seq.parse().unwrap())
    };
    let (ms1, seq1) = parse_id(&first);
    let (ms2, seq2) = parse_id(&second);
    assert!((ms2, seq2) > (ms1, seq1));

    send(&engine, &mut state, &mut buf, "XLEN", &["s"]).await;
    assert_eq!(buf, b":2\r\n");
}

/// S7: a `WATCH`ed key modified by another connection between `WATCH` and `EXEC` aborts the
/// transaction with a null-array reply and leaves its queued effects unapplied (§8 property 8).
#[tokio::test]
async fn watch_contention_aborts_transaction_with_no_effects() {
    let engine = engine();
    let mut conn_a = ConnectionState::new(1);
    let mut conn_b = ConnectionState::new(2);
    let mut buf = Vec::new();

    send(&engine, &mut conn_a, &mut buf, "WATCH", &["k"]).await;
    assert_eq!(buf, b"+OK\r\n");

    send(&engine, &mut conn_a, &mut buf, "MULTI", &[]).await;
    assert_eq!(buf, b"+OK\r\n");

    send(&engine, &mut conn_a, &mut buf, "SET", &["k", "a"]).await;
    assert_eq!(buf, b"+QUEUED\r\n");

    // a concurrent connection writes the watched key before EXEC
    send(&engine, &mut conn_b, &mut buf, "SET", &["k", "b"]).await;
    assert_eq!(buf, b"+OK\r\n");

    send(&engine, &mut conn_a, &mut buf, "EXEC", &[]).await;
    assert_eq!(buf, b"*-1\r\n");

    send(&engine, &mut conn_a, &mut buf, "GET", &["k"]).await;
    assert_eq!(buf, b"$1\r\nb\r\n");
}

/// A `MULTI`/`EXEC` whose `WATCH` is uncontended applies every queued command in order and
/// collects each one's own reply inside the surrounding array (§8 property 8, happy path).
#[tokio::test]
async fn multi_exec_applies_queued_commands_in_order() {
    let engine = engine();
    let mut state = ConnectionState::new(1);
    let mut buf = Vec::new();

    send(&engine, &mut state, &mut buf, "MULTI", &[]).await;
    assert_eq!(buf, b"+OK\r\n");
    send(&engine, &mut state, &mut buf, "SET", &["k", "1"]).await;
    assert_eq!(buf, b"+QUEUED\r\n");
    send(&engine, &mut state, &mut buf, "INCR", &["k"]).await;
    assert_eq!(buf, b"+QUEUED\r\n");

    send(&engine, &mut state, &mut buf, "EXEC", &[]).await;
    assert_eq!(buf, b"*2\r\n+OK\r\n:2\r\n");
}

/// An unknown command queued mid-`MULTI` aborts the whole transaction (§4.7, §7): the bad
/// command gets its own error immediately, and `EXEC` returns `-EXECABORT` without running any
/// of the commands that were queued successfully. This is distinct from a failed `WATCH`, which
/// returns a null array instead (§7 "Transaction abort" vs "Transaction contention").
#[tokio::test]
async fn multi_aborts_on_unrecognized_queued_command() {
    let engine = engine();
    let mut state = ConnectionState::new(1);
    let mut buf = Vec::new();

    send(&engine, &mut state, &mut buf, "MULTI", &[]).await;
    send(&engine, &mut state, &mut buf, "SET", &["k", "1"]).await;
    assert_eq!(buf, b"+QUEUED\r\n");

    send(&engine, &mut state, &mut buf, "NOTACOMMAND", &[]).await;
    assert_eq!(buf, b"-ERR unknown command 'NOTACOMMAND'\r\n");

    send(&engine, &mut state, &mut buf, "EXEC", &[]).await;
    assert_eq!(buf, b"-EXECABORT Transaction discarded because of previous errors.\r\n");

    send(&engine, &mut state, &mut buf, "GET", &["k"]).await;
    assert_eq!(buf, b"$-1\r\n");
}

/// S5: pub/sub delivery is mailbox-based, not wire-based, so this drives it directly through
/// the engine rather than through a socket — `SUBSCRIBE` only manages the subscription tables;
/// `dbnet` is what registers the mailbox `PUBLISH` delivers into (§4.4).
#[tokio::test]
async fn publish_delivers_to_subscriber_mailbox() {
    let engine = engine();
    let mut subscriber = ConnectionState::new(1);
    let mut publisher = ConnectionState::new(2);
    let mut buf = Vec::new();

    let mut mailbox = engine.pubsub.register(subscriber.id);
    send(&engine, &mut subscriber, &mut buf, "SUBSCRIBE", &["ch"]).await;
    assert_eq!(buf, b"*3\r\n$9\r\nsubscribe\r\n$2\r\nch\r\n:1\r\n");

    send(&engine, &mut publisher, &mut buf, "PUBLISH", &["ch", "hello"]).await;
    assert_eq!(buf, b":1\r\n");

    let msg = mailbox.try_recv().expect("subscriber should have a pending push");
    match msg {
        crate::pubsub::PushMessage::Message { channel, payload } => {
            assert_eq!(&channel[..], b"ch");
            assert_eq!(&payload[..], b"hello");
        }
        other => panic!("expected a direct channel message, got {other:?}"),
    }
}

/// §4.4: while a connection is in subscribe mode, only the pub/sub management commands and the
/// small allow-list (`PING`, `QUIT`, `RESET`) are accepted; everything else is rejected without
/// leaving subscribe mode or touching the keyspace.
#[tokio::test]
async fn subscribe_mode_rejects_non_pubsub_commands() {
    let engine = engine();
    let mut state = ConnectionState::new(1);
    let mut buf = Vec::new();
    let _mailbox = engine.pubsub.register(state.id);

    send(&engine, &mut state, &mut buf, "SUBSCRIBE", &["ch"]).await;
    assert_eq!(buf, b"*3\r\n$9\r\nsubscribe\r\n$2\r\nch\r\n:1\r\n");

    send(&engine, &mut state, &mut buf, "SET", &["k", "v"]).await;
    assert!(buf.starts_with(b"-ERR"), "expected rejection, got {:?}", String::from_utf8_lossy(&buf));

    send(&engine, &mut state, &mut buf, "GET", &["k"]).await;
    assert_eq!(buf, b"$-1\r\n", "the rejected SET must not have taken effect");

    send(&engine, &mut state, &mut buf, "PING", &[]).await;
    assert_eq!(buf, b"+PONG\r\n");
}

/// §4.7 `RESET`: drops subscriptions both locally and in the engine's pub/sub tables, so a
/// later `PUBLISH` on a channel this connection used to follow no longer reaches it.
#[tokio::test]
async fn reset_drops_engine_side_subscriptions() {
    let engine = engine();
    let mut state = ConnectionState::new(1);
    let mut other = ConnectionState::new(2);
    let mut buf = Vec::new();
    let mut mailbox = engine.pubsub.register(state.id);

    send(&engine, &mut state, &mut buf, "SUBSCRIBE", &["ch"]).await;
    send(&engine, &mut state, &mut buf, "RESET", &[]).await;
    assert_eq!(buf, b"+RESET\r\n");
    assert!(!state.subscription.is_subscribed());

    send(&engine, &mut other, &mut buf, "PUBLISH", &["ch", "hello"]).await;
    assert_eq!(buf, b":0\r\n", "no subscriber should remain after RESET");
    assert!(mailbox.try_recv().is_err());
}

/// `EXPIRE ... LT` treats a persistent key as having a `+inf` TTL (Redis semantics): any finite
/// expiry is "less than" that, so `LT` must always apply to a key with no existing TTL.
#[tokio::test]
async fn expire_lt_applies_to_persistent_key() {
    let engine = engine();
    let mut state = ConnectionState::new(1);
    let mut buf = Vec::new();

    send(&engine, &mut state, &mut buf, "SET", &["k", "v"]).await;
    assert_eq!(buf, b"+OK\r\n");

    send(&engine, &mut state, &mut buf, "EXPIRE", &["k", "100", "LT"]).await;
    assert_eq!(buf, b":1\r\n");
    send(&engine, &mut state, &mut buf, "TTL", &["k"]).await;
    assert_eq!(buf, b":100\r\n");
}

/// Expiration monotonicity (§8 property 4): once `TTL` reports a key absent, it stays absent
/// without an intervening write.
#[tokio::test]
async fn expired_key_is_observed_absent_on_access() {
    let engine = engine();
    let mut state = ConnectionState::new(1);
    let mut buf = Vec::new();

    send(&engine, &mut state, &mut buf, "SET", &["k", "v", "PX", "1"]).await;
    assert_eq!(buf, b"+OK\r\n");

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    send(&engine, &mut state, &mut buf, "TTL", &["k"]).await;
    assert_eq!(buf, b":-2\r\n");
    send(&engine, &mut state, &mut buf, "GET", &["k"]).await;
    assert_eq!(buf, b"$-1\r\n");
    send(&engine, &mut state, &mut buf, "EXISTS", &["k"]).await;
    assert_eq!(buf, b":0\r\n");
}
