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

//! Per-topic metrics: counters plus an exponential moving average of queue
//! latency.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Smoothing factor of the latency EMA. Fixed; the observable shape of the
/// average is part of the broker's contract.
const EMA_ALPHA: f64 = 0.1;

/// Point-in-time copy of a topic's metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    /// Messages accepted by `publish`.
    pub messages_published: u64,
    /// Cumulative encoded payload bytes accepted.
    pub bytes_published: u64,
    /// Messages currently sitting in consumer queues (fan-out copies).
    pub queue_depth: u64,
    /// Enqueue operations observed.
    pub enqueue_count: u64,
    /// Fully-acked completions observed.
    pub dequeue_count: u64,
    /// EMA of creation-to-observation latency, ms.
    pub avg_queue_latency_ms: f64,
}

/// Collects counters and the latency EMA for one topic.
#[derive(Default)]
pub struct MetricsCollector {
    inner: Arc<RwLock<MetricsSnapshot>>,
}

impl MetricsCollector {
    /// Create a collector with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    fn ema(avg: f64, sample: f64) -> f64 {
        (1.0 - EMA_ALPHA) * avg + EMA_ALPHA * sample
    }

    /// Record an accepted publish.
    pub async fn record_enqueue(&self, bytes: u64, latency_ms: f64) {
        let mut inner = self.inner.write().await;
        inner.messages_published = inner.messages_published.saturating_add(1);
        inner.bytes_published = inner.bytes_published.saturating_add(bytes);
        inner.enqueue_count = inner.enqueue_count.saturating_add(1);
        inner.avg_queue_latency_ms = Self::ema(inner.avg_queue_latency_ms, latency_ms);
    }

    /// Record a fully-acked completion.
    pub async fn record_dequeue(&self, latency_ms: f64) {
        let mut inner = self.inner.write().await;
        inner.dequeue_count = inner.dequeue_count.saturating_add(1);
        inner.avg_queue_latency_ms = Self::ema(inner.avg_queue_latency_ms, latency_ms);
    }

    /// Adjust the fan-out queue depth after routing (+n) or consume (-1).
    pub async fn update_queue_depth(&self, delta: i64) {
        let mut inner = self.inner.write().await;
        inner.queue_depth = if delta.is_negative() {
            inner.queue_depth.saturating_sub(delta.unsigned_abs())
        } else {
            inner.queue_depth.saturating_add(delta as u64)
        };
    }

    /// Current metrics.
    pub async fn snapshot(&self) -> MetricsSnapshot {
        self.inner.read().await.clone()
    }
}
