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

//! Acknowledgement tracking.
//!
//! ## State
//! - `pending[consumer][id]` — delivery timestamp of every in-flight,
//!   unacked delivery
//! - `awaited[id]` — acks still required before the message is complete
//! - `fanout[id]` — the original fan-out, kept for metadata reads
//!
//! A periodic worker nacks (with requeue) any pending delivery older than
//! the ack timeout. Nacks reuse the ack path so the awaited counters stay
//! consistent; a non-requeue nack stamps the unbounded-attempts sentinel so
//! the pipeline's attempts check dead-letters the message on its next pass.

use crate::error::BrokerResult;
use crate::message::{now_millis, MetaField, MetadataPatch, ATTEMPTS_UNBOUNDED};
use crate::metrics::MetricsCollector;
use crate::pipeline::MessagePipeline;
use crate::queue::QueueManager;
use crate::storage::MessageStorage;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, OnceLock, Weak};
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Tracks pending deliveries, awaited-ack counts and the ack-timeout nacker.
pub struct AckManager {
    pending: RwLock<HashMap<u32, HashMap<u32, u64>>>,
    awaited: RwLock<HashMap<u32, u32>>,
    fanout: RwLock<HashMap<u32, u32>>,
    storage: Arc<MessageStorage>,
    queues: Arc<QueueManager>,
    metrics: Arc<MetricsCollector>,
    // Bound after construction: the pipeline's delay stage needs the router,
    // which exists before this manager, while nack needs the pipeline. Weak,
    // or the delayed queue's back-reference here would cycle and leak.
    pipeline: OnceLock<Weak<MessagePipeline>>,
    ack_timeout_ms: u64,
    worker: StdMutex<Option<JoinHandle<()>>>,
    shutdown: Arc<Notify>,
}

impl AckManager {
    /// Create the manager for one topic.
    pub fn new(
        storage: Arc<MessageStorage>,
        queues: Arc<QueueManager>,
        metrics: Arc<MetricsCollector>,
        ack_timeout_ms: u64,
    ) -> Self {
        Self {
            pending: RwLock::new(HashMap::new()),
            awaited: RwLock::new(HashMap::new()),
            fanout: RwLock::new(HashMap::new()),
            storage,
            queues,
            metrics,
            pipeline: OnceLock::new(),
            ack_timeout_ms,
            worker: StdMutex::new(None),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Late-bind the pipeline used by the nack path.
    pub fn bind_pipeline(&self, pipeline: &Arc<MessagePipeline>) {
        let _ = self.pipeline.set(Arc::downgrade(pipeline));
    }

    /// Start the periodic ack-timeout nacker.
    pub fn start(self: &Arc<Self>) {
        let period = Duration::from_millis((self.ack_timeout_ms / 2).max(1_000));
        let manager = Arc::clone(self);
        let shutdown = Arc::clone(&self.shutdown);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(period) => manager.nack_expired().await,
                    _ = shutdown.notified() => break,
                }
            }
        });
        if let Ok(mut guard) = self.worker.lock() {
            *guard = Some(handle);
        }
    }

    async fn nack_expired(&self) {
        let now = now_millis();
        let expired: Vec<(u32, u32)> = {
            let pending = self.pending.read().await;
            pending
                .iter()
                .flat_map(|(consumer, entries)| {
                    entries
                        .iter()
                        .filter(|(_, delivered_at)| {
                            now.saturating_sub(**delivered_at) > self.ack_timeout_ms
                        })
                        .map(|(id, _)| (*consumer, *id))
                })
                .collect()
        };
        for (consumer, id) in expired {
            warn!(consumer, id, "ack timeout, nacking with requeue");
            if let Err(e) = self.nack(consumer, Some(id), true).await {
                warn!(consumer, id, error = %e, "timeout nack failed");
            }
        }
    }

    /// Record the fan-out a message was routed with.
    pub async fn set_awaited_acks_count(&self, id: u32, count: u32) {
        if count == 0 {
            return;
        }
        self.awaited.write().await.insert(id, count);
        self.fanout.write().await.insert(id, count);
    }

    /// Record an in-flight delivery awaiting its ack.
    pub async fn add_pending(&self, consumer_id: u32, id: u32) {
        self.pending
            .write()
            .await
            .entry(consumer_id)
            .or_default()
            .insert(id, now_millis());
    }

    /// Decrement a message's awaited count; at zero, stamp `consumed_at`
    /// and record the completion latency.
    pub async fn decrement_awaited_acks(&self, id: u32) -> BrokerResult<()> {
        let completed = {
            let mut awaited = self.awaited.write().await;
            match awaited.get_mut(&id) {
                None => false,
                Some(count) => {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        awaited.remove(&id);
                        true
                    } else {
                        false
                    }
                }
            }
        };
        if completed {
            let now = now_millis();
            self.storage
                .update_metadata(id, &MetadataPatch::consumed_at(now))
                .await?;
            if let Some(meta) = self
                .storage
                .read_metadata(id, Some(&[MetaField::Ts]))
                .await?
            {
                self.metrics
                    .record_dequeue(now.saturating_sub(meta.ts) as f64)
                    .await;
            }
            debug!(id, "message fully acked");
        }
        Ok(())
    }

    /// Acknowledge one pending delivery, or all of a consumer's when `id`
    /// is `None`. Unknown and duplicate acks are silent no-ops.
    ///
    /// Returns the ids actually released.
    pub async fn ack(&self, consumer_id: u32, id: Option<u32>) -> BrokerResult<Vec<u32>> {
        let ids: Vec<u32> = {
            let mut pending = self.pending.write().await;
            match pending.get_mut(&consumer_id) {
                None => Vec::new(),
                Some(entries) => match id {
                    Some(id) => {
                        if entries.remove(&id).is_some() {
                            vec![id]
                        } else {
                            Vec::new()
                        }
                    }
                    None => entries.drain().map(|(id, _)| id).collect(),
                },
            }
        };
        for id in &ids {
            self.decrement_awaited_acks(*id).await?;
        }
        Ok(ids)
    }

    /// Negative-acknowledge: release pending state, then either requeue
    /// (bumping attempts) or stamp the no-requeue sentinel. Each released
    /// message takes a pipeline pass, which may divert it to the DLQ or the
    /// delayed queue; otherwise it re-enters the same consumer's queue.
    pub async fn nack(
        &self,
        consumer_id: u32,
        id: Option<u32>,
        requeue: bool,
    ) -> BrokerResult<Vec<u32>> {
        let ids = self.ack(consumer_id, id).await?;
        for &message_id in &ids {
            let Some(mut meta) = self.storage.read_metadata(message_id, None).await? else {
                continue;
            };
            let attempts = if requeue {
                meta.attempts.saturating_add(1)
            } else {
                ATTEMPTS_UNBOUNDED
            };
            meta.attempts = attempts;
            meta.consumed_at = None;
            self.storage
                .update_metadata(
                    message_id,
                    &MetadataPatch {
                        attempts: Some(attempts),
                        consumed_at: Some(None),
                    },
                )
                .await?;

            let handled = match self.pipeline.get().and_then(Weak::upgrade) {
                Some(pipeline) => pipeline.process(&meta).await?,
                None => false,
            };
            if !handled && self.queues.enqueue(consumer_id, &meta).await {
                // The redelivery is one more routed copy to await
                {
                    let mut awaited = self.awaited.write().await;
                    *awaited.entry(message_id).or_insert(0) += 1;
                }
                self.metrics.update_queue_depth(1).await;
            }
        }
        Ok(ids)
    }

    /// Original fan-out recorded for a message.
    pub async fn need_acks(&self, id: u32) -> u32 {
        self.fanout.read().await.get(&id).copied().unwrap_or(0)
    }

    /// Acks still awaited for a message.
    pub async fn awaited_count(&self, id: u32) -> u32 {
        self.awaited.read().await.get(&id).copied().unwrap_or(0)
    }

    /// In-flight deliveries for one consumer.
    pub async fn pending_count(&self, consumer_id: u32) -> usize {
        self.pending
            .read()
            .await
            .get(&consumer_id)
            .map(|entries| entries.len())
            .unwrap_or(0)
    }

    /// In-flight deliveries across all consumers.
    pub async fn pending_total(&self) -> usize {
        self.pending
            .read()
            .await
            .values()
            .map(|entries| entries.len())
            .sum()
    }

    /// Forget a removed consumer's pending deliveries.
    pub async fn drop_consumer(&self, consumer_id: u32) {
        self.pending.write().await.remove(&consumer_id);
    }

    /// Drop all awaited-ack state for a message that became terminal
    /// (dead-lettered) without completing.
    pub async fn forget(&self, id: u32) {
        self.awaited.write().await.remove(&id);
        self.fanout.write().await.remove(&id);
    }

    /// Stop the ack-timeout worker.
    pub fn stop(&self) {
        self.shutdown.notify_waiters();
        if let Ok(mut guard) = self.worker.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}
