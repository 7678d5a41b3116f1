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

//! Delayed delivery queue.
//!
//! A single min-heap orders `(id, ready_ts)` pairs by readiness; one timer
//! task sleeps until the head is due. Inserting an entry that becomes ready
//! earlier than the armed deadline rearms the timer. When the timer fires,
//! every due entry is drained, its metadata fetched, and the message routed
//! as if freshly published. Scheduling is a no-op while a drain is running.

use crate::ack::AckManager;
use crate::message::now_millis;
use crate::metrics::MetricsCollector;
use crate::router::Router;
use crate::storage::MessageStorage;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DelayedEntry {
    ready_ts: u64,
    id: u32,
}

impl PartialOrd for DelayedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DelayedEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Inverted: BinaryHeap is a max-heap, the earliest readiness must
        // surface first
        other
            .ready_ts
            .cmp(&self.ready_ts)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// Time-ordered heap of delayed messages, driven by one timer.
pub struct DelayedQueueManager {
    heap: RwLock<BinaryHeap<DelayedEntry>>,
    armed_deadline: StdMutex<Option<u64>>,
    timer: StdMutex<Option<JoinHandle<()>>>,
    is_processing: AtomicBool,
    shutdown: AtomicBool,
    storage: Arc<MessageStorage>,
    router: Arc<Router>,
    ack: Arc<AckManager>,
    metrics: Arc<MetricsCollector>,
}

impl DelayedQueueManager {
    /// Create the delayed queue for one topic.
    pub fn new(
        storage: Arc<MessageStorage>,
        router: Arc<Router>,
        ack: Arc<AckManager>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            heap: RwLock::new(BinaryHeap::new()),
            armed_deadline: StdMutex::new(None),
            timer: StdMutex::new(None),
            is_processing: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            storage,
            router,
            ack,
            metrics,
        }
    }

    /// Hold a message until `ready_ts` (epoch millis).
    pub async fn insert(self: &Arc<Self>, id: u32, ready_ts: u64) {
        {
            self.heap.write().await.push(DelayedEntry { ready_ts, id });
        }
        debug!(id, ready_ts, "message delayed");
        self.schedule_processing().await;
    }

    /// Arm (or rearm) the timer for the heap's head. No-op while a drain is
    /// in flight or when the armed deadline is already at or before the head.
    // Boxed: mutually recursive with `process_due`, so the auto-trait solver
    // cannot otherwise prove this future is `Send` without an explicit cycle
    // break.
    fn schedule_processing<'a>(
        self: &'a Arc<Self>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            if self.shutdown.load(AtomicOrdering::Relaxed)
                || self.is_processing.load(AtomicOrdering::SeqCst)
            {
                return;
            }
            let Some(head_ts) = self.heap.read().await.peek().map(|e| e.ready_ts) else {
                return;
            };
            {
                let Ok(mut armed) = self.armed_deadline.lock() else {
                    return;
                };
                if armed.is_some_and(|deadline| deadline <= head_ts) {
                    return;
                }
                *armed = Some(head_ts);
            }
            if let Ok(mut guard) = self.timer.lock() {
                if let Some(handle) = guard.take() {
                    handle.abort();
                }
            }
            let manager = Arc::clone(self);
            // Boxed: the drain rearms the timer, so the spawned future would
            // otherwise name its own type
            let task: Pin<Box<dyn Future<Output = ()> + Send>> = Box::pin(async move {
                let delay = head_ts.saturating_sub(now_millis());
                tokio::time::sleep(Duration::from_millis(delay)).await;
                manager.process_due().await;
            });
            let handle = tokio::spawn(task);
            if let Ok(mut guard) = self.timer.lock() {
                *guard = Some(handle);
            }
        })
    }

    /// Drain all due entries and route them.
    async fn process_due(self: &Arc<Self>) {
        if self.is_processing.swap(true, AtomicOrdering::SeqCst) {
            return;
        }
        if let Ok(mut armed) = self.armed_deadline.lock() {
            *armed = None;
        }

        let now = now_millis();
        loop {
            let entry = {
                let mut heap = self.heap.write().await;
                let due = heap.peek().is_some_and(|entry| entry.ready_ts <= now);
                if due {
                    heap.pop()
                } else {
                    None
                }
            };
            let Some(entry) = entry else {
                break;
            };
            match self.storage.read_metadata(entry.id, None).await {
                Ok(Some(meta)) => {
                    let routed = self.router.route(&meta).await;
                    if routed > 0 {
                        self.ack
                            .set_awaited_acks_count(entry.id, routed as u32)
                            .await;
                        self.metrics.update_queue_depth(routed as i64).await;
                    }
                    debug!(id = entry.id, routed, "delayed message released");
                }
                Ok(None) => {
                    // Metadata vanished; abort only this message
                    debug!(id = entry.id, "delayed message missing from storage, dropped");
                }
                Err(e) => {
                    warn!(id = entry.id, error = %e, "delayed release failed");
                }
            }
        }

        self.is_processing.store(false, AtomicOrdering::SeqCst);
        self.schedule_processing().await;
    }

    /// Entries currently held.
    pub async fn depth(&self) -> usize {
        self.heap.read().await.len()
    }

    /// Cancel the timer and refuse new schedules.
    pub fn shutdown(&self) {
        self.shutdown.store(true, AtomicOrdering::Relaxed);
        if let Ok(mut guard) = self.timer.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}
