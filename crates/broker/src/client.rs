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

//! Client registry: producers, consumers and dlq-consumers with activity
//! stats.
//!
//! Membership in `active_consumers` decides eligibility for fan-out routing
//! without a correlation id. A consumer leaves the set when it reports
//! `lagging`, when its average processing time or pending balance crosses
//! the configured thresholds, or when the periodic sweep finds it inactive.

use crate::error::{BrokerError, BrokerResult};
use crate::message::now_millis;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use std::time::Duration;
use tracing::{debug, info};

/// Role a client holds against a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientType {
    /// May publish.
    Producer,
    /// May consume, ack and nack.
    Consumer,
    /// May read and replay the DLQ.
    DlqConsumer,
}

/// Reported health of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientStatus {
    /// Processing normally.
    Active,
    /// Registered but quiet.
    Idle,
    /// Falling behind; dropped from fan-out routing.
    Lagging,
}

/// Registered client state and rolled-up activity counters.
#[derive(Debug, Clone, Serialize)]
pub struct ClientInfo {
    /// Client id, unique within the topic.
    pub id: u32,
    /// Role.
    pub client_type: ClientType,
    /// Registration time, epoch millis.
    pub registered_at: u64,
    /// Last recorded activity, epoch millis.
    pub last_active_at: u64,
    /// Reported status.
    pub status: ClientStatus,
    /// Messages handled (monotonic).
    pub message_count: u64,
    /// Running balance of unacked deliveries (non-negative).
    pub pending_messages: u64,
    /// Total processing time reported, ms (monotonic).
    pub processing_time: u64,
    /// `processing_time / message_count`, ms.
    pub avg_processing_time: f64,
}

/// Partial activity report. Numeric fields are additive deltas; `status`
/// replaces.
#[derive(Debug, Clone, Default)]
pub struct ClientActivity {
    /// Replace the reported status.
    pub status: Option<ClientStatus>,
    /// Messages handled since the last report.
    pub message_count: Option<u64>,
    /// Signed change to the pending balance.
    pub pending_delta: Option<i64>,
    /// Processing time accrued since the last report, ms.
    pub processing_time: Option<u64>,
}

/// Registry of all clients attached to one topic.
pub struct ClientManager {
    clients: RwLock<HashMap<u32, ClientInfo>>,
    active_consumers: RwLock<HashSet<u32>>,
    next_id: AtomicU32,
    processing_time_threshold_ms: Option<u64>,
    pending_threshold: Option<u64>,
    inactivity_threshold_ms: u64,
    sweep_task: StdMutex<Option<JoinHandle<()>>>,
    shutdown: Arc<Notify>,
}

impl ClientManager {
    /// Create a registry with the topic's eviction thresholds.
    pub fn new(
        processing_time_threshold_ms: Option<u64>,
        pending_threshold: Option<u64>,
        inactivity_threshold_ms: u64,
    ) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            active_consumers: RwLock::new(HashSet::new()),
            next_id: AtomicU32::new(1),
            processing_time_threshold_ms,
            pending_threshold,
            inactivity_threshold_ms,
            sweep_task: StdMutex::new(None),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Register a new client and return its id.
    pub async fn register(&self, client_type: ClientType) -> u32 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let now = now_millis();
        let info = ClientInfo {
            id,
            client_type,
            registered_at: now,
            last_active_at: now,
            status: ClientStatus::Active,
            message_count: 0,
            pending_messages: 0,
            processing_time: 0,
            avg_processing_time: 0.0,
        };
        self.clients.write().await.insert(id, info);
        if client_type == ClientType::Consumer {
            self.active_consumers.write().await.insert(id);
        }
        debug!(client = id, ?client_type, "client registered");
        id
    }

    /// Remove a client, returning its final state.
    pub async fn remove(&self, id: u32) -> Option<ClientInfo> {
        let removed = self.clients.write().await.remove(&id);
        if removed.is_some() {
            self.active_consumers.write().await.remove(&id);
        }
        removed
    }

    /// Look up a client.
    pub async fn get(&self, id: u32) -> Option<ClientInfo> {
        self.clients.read().await.get(&id).cloned()
    }

    /// The role a client id holds, if registered.
    pub async fn client_type(&self, id: u32) -> Option<ClientType> {
        self.clients.read().await.get(&id).map(|c| c.client_type)
    }

    /// Verify a client exists and holds the expected role.
    pub async fn expect_type(&self, id: u32, expected: ClientType) -> BrokerResult<()> {
        match self.client_type(id).await {
            None => Err(BrokerError::NotFound(format!("client {}", id))),
            Some(actual) if actual != expected => Err(BrokerError::TypeMismatch(format!(
                "client {} is {:?}, expected {:?}",
                id, actual, expected
            ))),
            Some(_) => Ok(()),
        }
    }

    /// Roll an activity report into a client's counters.
    ///
    /// Numeric fields accumulate, `status` replaces, and the derived average
    /// is refreshed. The report also re-evaluates the client's fan-out
    /// eligibility.
    pub async fn record_activity(&self, id: u32, activity: ClientActivity) -> BrokerResult<()> {
        let (is_consumer, evict) = {
            let mut clients = self.clients.write().await;
            let info = clients
                .get_mut(&id)
                .ok_or_else(|| BrokerError::NotFound(format!("client {}", id)))?;
            info.last_active_at = now_millis();
            if let Some(status) = activity.status {
                info.status = status;
            }
            if let Some(delta) = activity.message_count {
                info.message_count = info.message_count.saturating_add(delta);
            }
            if let Some(delta) = activity.pending_delta {
                info.pending_messages = info.pending_messages.saturating_add_signed(delta);
            }
            if let Some(delta) = activity.processing_time {
                info.processing_time = info.processing_time.saturating_add(delta);
            }
            if info.message_count > 0 {
                info.avg_processing_time =
                    info.processing_time as f64 / info.message_count as f64;
            }
            let evict = info.status == ClientStatus::Lagging
                || self
                    .processing_time_threshold_ms
                    .is_some_and(|t| info.avg_processing_time > t as f64)
                || self
                    .pending_threshold
                    .is_some_and(|t| info.pending_messages > t);
            (info.client_type == ClientType::Consumer, evict)
        };

        if is_consumer {
            let mut active = self.active_consumers.write().await;
            if evict {
                if active.remove(&id) {
                    info!(consumer = id, "consumer dropped from fan-out set");
                }
            } else {
                active.insert(id);
            }
        }
        Ok(())
    }

    /// Ids of consumers eligible for fan-out routing, in ascending order.
    pub async fn active_consumers(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.active_consumers.read().await.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of registered consumers (any status).
    pub async fn consumer_count(&self) -> usize {
        self.clients
            .read()
            .await
            .values()
            .filter(|c| c.client_type == ClientType::Consumer)
            .count()
    }

    /// Total registered clients.
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Start the periodic inactivity sweep.
    pub fn start_inactivity_sweep(self: &Arc<Self>) {
        let period = Duration::from_millis((self.inactivity_threshold_ms / 2).max(1_000));
        let manager = Arc::clone(self);
        let shutdown = Arc::clone(&self.shutdown);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(period) => manager.sweep_inactive().await,
                    _ = shutdown.notified() => break,
                }
            }
        });
        if let Ok(mut guard) = self.sweep_task.lock() {
            *guard = Some(handle);
        }
    }

    async fn sweep_inactive(&self) {
        let now = now_millis();
        let stale: Vec<u32> = {
            let clients = self.clients.read().await;
            clients
                .values()
                .filter(|c| {
                    c.client_type == ClientType::Consumer
                        && now.saturating_sub(c.last_active_at) > self.inactivity_threshold_ms
                })
                .map(|c| c.id)
                .collect()
        };
        if stale.is_empty() {
            return;
        }
        let mut active = self.active_consumers.write().await;
        for id in stale {
            if active.remove(&id) {
                info!(consumer = id, "inactive consumer dropped from fan-out set");
            }
        }
    }

    /// Stop the inactivity sweep.
    pub fn stop(&self) {
        self.shutdown.notify_waiters();
        if let Ok(mut guard) = self.sweep_task.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}
