// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Relay Contributors
//
// This file is part of Relay.
//
// Relay is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// Relay is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with Relay. If not, see <https://www.gnu.org/licenses/>.

//! Consumer-side subscription: an abortable poll loop.
//!
//! `unsubscribe` cancels a pending wait with a distinguished stop signal the
//! loop treats as a clean exit; every other failure reaches the subscriber's
//! error callback. Without auto-ack, a delivery is acked after the handler
//! succeeds and nacked (with requeue) when it fails.

use crate::error::{BrokerError, BrokerResult};
use crate::message::MessageMetadata;
use crate::topic::Topic;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::debug;

/// Behavior of a subscription poll loop.
#[derive(Debug, Clone)]
pub struct SubscriptionOptions {
    /// Ack on delivery instead of after the handler.
    pub auto_ack: bool,
    /// Idle sleep between polls of an empty queue.
    pub poll_interval_ms: u64,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            auto_ack: false,
            poll_interval_ms: 50,
        }
    }
}

/// Handle to a running poll loop.
pub struct Subscription {
    consumer_id: u32,
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl Subscription {
    /// The subscribed consumer.
    pub fn consumer_id(&self) -> u32 {
        self.consumer_id
    }

    /// Stop the loop and wait for it to wind down.
    pub async fn unsubscribe(self) {
        // notify_one leaves a permit, so a loop busy in a handler still
        // observes the stop on its next select
        self.shutdown.notify_one();
        let _ = self.handle.await;
    }
}

pub(crate) fn spawn<F, Fut, E>(
    topic: Arc<Topic>,
    consumer_id: u32,
    options: SubscriptionOptions,
    mut handler: F,
    on_error: E,
) -> Subscription
where
    F: FnMut(Value, MessageMetadata) -> Fut + Send + 'static,
    Fut: Future<Output = BrokerResult<()>> + Send,
    E: Fn(BrokerError) + Send + Sync + 'static,
{
    let shutdown = Arc::new(Notify::new());
    let stop = Arc::clone(&shutdown);
    let poll_interval = Duration::from_millis(options.poll_interval_ms.max(1));
    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = stop.notified() => break,
                consumed = topic.consume(consumer_id, options.auto_ack) => {
                    match consumed {
                        Ok(Some(message)) => {
                            let id = message.metadata.id;
                            match handler(message.payload, message.metadata).await {
                                Ok(()) => {
                                    if !options.auto_ack {
                                        let _ = topic.ack(consumer_id, Some(id)).await;
                                    }
                                }
                                Err(e) => {
                                    on_error(e);
                                    if !options.auto_ack {
                                        let _ = topic.nack(consumer_id, Some(id), true).await;
                                    }
                                }
                            }
                        }
                        Ok(None) => tokio::time::sleep(poll_interval).await,
                        Err(BrokerError::Aborted) => break,
                        Err(e) => {
                            on_error(e);
                            tokio::time::sleep(poll_interval).await;
                        }
                    }
                }
            }
        }
        debug!(consumer = consumer_id, "subscription stopped");
    });
    Subscription {
        consumer_id,
        shutdown,
        handle,
    }
}
