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

//! Publish/subscribe commands (§4.4, §4.6 PUB/SUB). These only touch `engine.pubsub` and this
//! connection's `SubscriptionMode` — never the keyspace, so never the WAL. Actual message
//! delivery to a subscribed connection happens out-of-band through the mailbox `engine.pubsub`
//! handed back at `register` time; the writer here only ever emits the subscribe/unsubscribe
//! acknowledgement push.

use super::{eq_ci, CommandContext, SubscriptionMode};
use bytes::Bytes;
use std::collections::HashSet;
use std::io;
use tokio::io::AsyncWrite;

fn ensure_subscribed(state: &mut super::ConnectionState) -> (&mut HashSet<Vec<u8>>, &mut HashSet<Vec<u8>>) {
    if !matches!(state.subscription, SubscriptionMode::Subscribed { .. }) {
        state.subscription = SubscriptionMode::Subscribed {
            channels: HashSet::new(),
            patterns: HashSet::new(),
        };
    }
    match &mut state.subscription {
        SubscriptionMode::Subscribed { channels, patterns } => (channels, patterns),
        SubscriptionMode::Normal => unreachable!(),
    }
}

pub async fn subscribe<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    for channel in args {
        ctx.engine.pubsub.subscribe(ctx.state.id, channel.clone());
        let (channels, _) = ensure_subscribed(ctx.state);
        channels.insert(channel.to_vec());
        let total = ctx.state.subscription.total_subscriptions();
        ctx.writer.write_push_header(3).await?;
        ctx.writer.write_bulk(Some(b"subscribe")).await?;
        ctx.writer.write_bulk(Some(channel)).await?;
        ctx.writer.write_integer(total as i64).await?;
    }
    Ok(())
}

pub async fn unsubscribe<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let targets: Vec<Vec<u8>> = if args.is_empty() {
        match &ctx.state.subscription {
            SubscriptionMode::Subscribed { channels, .. } => channels.iter().cloned().collect(),
            SubscriptionMode::Normal => Vec::new(),
        }
    } else {
        args.iter().map(|a| a.to_vec()).collect()
    };
    if targets.is_empty() {
        let total = ctx.state.subscription.total_subscriptions();
        ctx.writer.write_push_header(3).await?;
        ctx.writer.write_bulk(Some(b"unsubscribe")).await?;
        ctx.writer.write_null().await?;
        return ctx.writer.write_integer(total as i64).await;
    }
    for channel in targets {
        ctx.engine.pubsub.unsubscribe(ctx.state.id, &channel);
        if let SubscriptionMode::Subscribed { channels, .. } = &mut ctx.state.subscription {
            channels.remove(&channel);
        }
        let total = ctx.state.subscription.total_subscriptions();
        ctx.writer.write_push_header(3).await?;
        ctx.writer.write_bulk(Some(b"unsubscribe")).await?;
        ctx.writer.write_bulk(Some(&channel)).await?;
        ctx.writer.write_integer(total as i64).await?;
    }
    Ok(())
}

pub async fn psubscribe<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    for pattern in args {
        ctx.engine.pubsub.psubscribe(ctx.state.id, pattern.clone());
        let (_, patterns) = ensure_subscribed(ctx.state);
        patterns.insert(pattern.to_vec());
        let total = ctx.state.subscription.total_subscriptions();
        ctx.writer.write_push_header(3).await?;
        ctx.writer.write_bulk(Some(b"psubscribe")).await?;
        ctx.writer.write_bulk(Some(pattern)).await?;
        ctx.writer.write_integer(total as i64).await?;
    }
    Ok(())
}

pub async fn punsubscribe<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let targets: Vec<Vec<u8>> = if args.is_empty() {
        match &ctx.state.subscription {
            SubscriptionMode::Subscribed { patterns, .. } => patterns.iter().cloned().collect(),
            SubscriptionMode::Normal => Vec::new(),
        }
    } else {
        args.iter().map(|a| a.to_vec()).collect()
    };
    if targets.is_empty() {
        let total = ctx.state.subscription.total_subscriptions();
        ctx.writer.write_push_header(3).await?;
        ctx.writer.write_bulk(Some(b"punsubscribe")).await?;
        ctx.writer.write_null().await?;
        return ctx.writer.write_integer(total as i64).await;
    }
    for pattern in targets {
        ctx.engine.pubsub.punsubscribe(ctx.state.id, &pattern);
        if let SubscriptionMode::Subscribed { patterns, .. } = &mut ctx.state.subscription {
            patterns.remove(&pattern);
        }
        let total = ctx.state.subscription.total_subscriptions();
        ctx.writer.write_push_header(3).await?;
        ctx.writer.write_bulk(Some(b"punsubscribe")).await?;
        ctx.writer.write_bulk(Some(&pattern)).await?;
        ctx.writer.write_integer(total as i64).await?;
    }
    Ok(())
}

pub async fn publish<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let delivered = ctx.engine.pubsub.publish(&args[0], args[1].clone());
    ctx.writer.write_integer(delivered as i64).await
}

pub async fn pubsub<W: AsyncWrite + Unpin>(ctx: &mut CommandContext<'_, W>, args: &[Bytes]) -> io::Result<()> {
    let sub = &args[0];
    if eq_ci(sub, "CHANNELS") {
        let pattern = args.get(1).map(|b| b.as_ref());
        let channels = ctx.engine.pubsub.active_channels(pattern);
        ctx.writer.write_array_header(channels.len() as i64).await?;
        for c in channels {
            ctx.writer.write_bulk(Some(&c)).await?;
        }
        Ok(())
    } else if eq_ci(sub, "NUMSUB") {
        ctx.writer.write_array_header(args.len() as i64 - 1).await?;
        for channel in &args[1..] {
            ctx.writer.write_bulk(Some(channel)).await?;
            ctx.writer
                .write_integer(ctx.engine.pubsub.channel_subscriber_count(channel) as i64)
                .await?;
        }
        Ok(())
    } else if eq_ci(sub, "NUMPAT") {
        ctx.writer.write_integer(ctx.engine.pubsub.pattern_subscription_count() as i64).await
    } else {
        ctx.writer
            .write_error(&format!("ERR unknown PUBSUB subcommand '{}'", String::from_utf8_lossy(sub)))
            .await
    }
}
