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

//! Buffered write-through message storage.
//!
//! ## Purpose
//! Payloads and metadata live in separate in-memory maps (metadata is
//! rewritten on every delivery-state change, payloads are write-once) and
//! drain to the persistent key/value store in chunks. Both maps hold
//! *encoded* bytes so partial metadata reads never pay for a full decode.
//!
//! ## Scheduling
//! `write_all` arms one deferred flush, coalesced over the persist window:
//! scheduling while a flush is pending is a no-op. The flush drains at most
//! `chunk_size` entries per tick and reschedules itself while the buffer is
//! non-empty. A failed flush leaves the buffer intact and retries on the
//! next tick.

use crate::error::BrokerResult;
use crate::message::{now_millis, MessageMetadata, MetaField, MetadataPatch};
use relay_codec::{MessageCodec, PersistedMessage};
use relay_keyvalue::{KVError, KeyValueStore};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Outcome of one retention sweep over the persisted store.
#[derive(Debug, Default)]
pub struct RetentionSweep {
    /// Consumed entries removed from the store.
    pub removed: usize,
    /// Unconsumed entries past retention; the caller dead-letters these.
    pub expired: Vec<u32>,
}

/// Buffered write-through store for message payloads and metadata.
pub struct MessageStorage {
    topic: String,
    codec: Arc<dyn MessageCodec>,
    store: Arc<dyn KeyValueStore>,
    payloads: RwLock<HashMap<u32, Vec<u8>>>,
    metadata: RwLock<HashMap<u32, Vec<u8>>>,
    // Serializes read-modify-write cycles on one id's encoded metadata
    update_lock: Mutex<()>,
    flush_scheduled: AtomicBool,
    flush_task: StdMutex<Option<JoinHandle<()>>>,
    persist: bool,
    persist_threshold: Duration,
    chunk_size: usize,
    total_bytes: AtomicU64,
    shutdown: AtomicBool,
}

impl MessageStorage {
    /// Create storage for one topic.
    pub fn new(
        topic: impl Into<String>,
        codec: Arc<dyn MessageCodec>,
        store: Arc<dyn KeyValueStore>,
        persist: bool,
        persist_threshold_ms: u64,
        chunk_size: usize,
    ) -> Self {
        Self {
            topic: topic.into(),
            codec,
            store,
            payloads: RwLock::new(HashMap::new()),
            metadata: RwLock::new(HashMap::new()),
            update_lock: Mutex::new(()),
            flush_scheduled: AtomicBool::new(false),
            flush_task: StdMutex::new(None),
            persist,
            persist_threshold: Duration::from_millis(persist_threshold_ms),
            chunk_size: chunk_size.max(1),
            total_bytes: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
        }
    }

    fn message_key(&self, id: u32) -> String {
        format!("{}/{}", self.topic, id)
    }

    fn metadata_key(&self, id: u32) -> String {
        format!("{}/meta/{}", self.topic, id)
    }

    /// Store payload and metadata, returning the in-buffer entry count.
    pub async fn write_all(
        self: &Arc<Self>,
        payload: Vec<u8>,
        meta: &MessageMetadata,
    ) -> BrokerResult<usize> {
        let encoded_meta = self.codec.encode_metadata(meta)?;
        self.total_bytes
            .fetch_add(payload.len() as u64, Ordering::Relaxed);
        {
            self.payloads.write().await.insert(meta.id, payload);
        }
        let count = {
            let mut metadata = self.metadata.write().await;
            metadata.insert(meta.id, encoded_meta);
            metadata.len()
        };
        self.schedule_flush();
        Ok(count)
    }

    /// Arm the deferred flush. A second schedule while one is pending is a
    /// no-op.
    fn schedule_flush(self: &Arc<Self>) {
        if !self.persist || self.shutdown.load(Ordering::Relaxed) {
            return;
        }
        if self.flush_scheduled.swap(true, Ordering::SeqCst) {
            return;
        }
        let storage = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(storage.persist_threshold).await;
            storage.flush_scheduled.store(false, Ordering::SeqCst);
            match storage.flush().await {
                Ok(flushed) if flushed > 0 => {
                    debug!(topic = %storage.topic, flushed, "storage flush");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(topic = %storage.topic, error = %e, "storage flush failed, retrying");
                }
            }
            if storage.buffered_count().await > 0 {
                storage.schedule_flush();
            }
        });
        if let Ok(mut guard) = self.flush_task.lock() {
            *guard = Some(handle);
        }
    }

    /// Drain at most `chunk_size` buffered entries to the persistent store.
    ///
    /// Entries leave the buffer only after both their keys land; failures
    /// keep them buffered for the next tick.
    pub async fn flush(&self) -> BrokerResult<usize> {
        let ids: Vec<u32> = {
            let metadata = self.metadata.read().await;
            metadata.keys().take(self.chunk_size).copied().collect()
        };
        if ids.is_empty() {
            return Ok(0);
        }

        let mut writes = Vec::with_capacity(ids.len());
        for id in ids {
            let payload = { self.payloads.read().await.get(&id).cloned() };
            let encoded_meta = { self.metadata.read().await.get(&id).cloned() };
            let Some(encoded_meta) = encoded_meta else {
                continue;
            };
            let meta = self.codec.decode_metadata(&encoded_meta, None)?;
            let envelope = PersistedMessage::new(payload.unwrap_or_default(), &meta).to_bytes();
            let store = Arc::clone(&self.store);
            let message_key = self.message_key(id);
            let metadata_key = self.metadata_key(id);
            writes.push(async move {
                let result = async {
                    store.put(&message_key, envelope).await?;
                    store.put(&metadata_key, encoded_meta.clone()).await?;
                    Ok::<(), KVError>(())
                }
                .await;
                (id, encoded_meta, result)
            });
        }

        let results = futures::future::join_all(writes).await;
        let mut flushed = 0;
        let mut first_err: Option<KVError> = None;
        for (id, written_meta, result) in results {
            match result {
                Ok(()) => {
                    self.payloads.write().await.remove(&id);
                    // A patch may have landed on the buffered bytes while the
                    // put was in flight; keep such an entry for the next tick
                    let mut metadata = self.metadata.write().await;
                    if metadata.get(&id) == Some(&written_meta) {
                        metadata.remove(&id);
                    }
                    flushed += 1;
                }
                Err(e) => {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }
        match first_err {
            Some(e) if flushed == 0 => Err(e.into()),
            _ => Ok(flushed),
        }
    }

    /// Read decoded payload and metadata; a missing id yields `(None, None)`.
    pub async fn read_all(
        &self,
        id: u32,
    ) -> BrokerResult<(Option<Value>, Option<MessageMetadata>)> {
        let buffered_payload = { self.payloads.read().await.get(&id).cloned() };
        let buffered_meta = { self.metadata.read().await.get(&id).cloned() };

        // Buffer and store can each hold one half (a patched metadata entry
        // outlives its flushed payload), so fall back per component
        let payload_bytes = match buffered_payload {
            Some(bytes) => Some(bytes),
            None => match self.store.get(&self.message_key(id)).await? {
                Some(bytes) => Some(PersistedMessage::from_bytes(&bytes)?.data),
                None => None,
            },
        };
        let meta_bytes = match buffered_meta {
            Some(bytes) => Some(bytes),
            None => self.store.get(&self.metadata_key(id)).await?,
        };

        let payload = match &payload_bytes {
            Some(bytes) => Some(self.codec.decode(bytes)?),
            None => None,
        };
        let meta = match meta_bytes {
            Some(bytes) => {
                let mut meta = self.codec.decode_metadata(&bytes, None)?;
                if let Some(ref bytes) = payload_bytes {
                    meta.size = bytes.len() as u32;
                }
                Some(meta)
            }
            None => None,
        };
        Ok((payload, meta))
    }

    /// Read only the decoded payload.
    pub async fn read_message(&self, id: u32) -> BrokerResult<Option<Value>> {
        let buffered = { self.payloads.read().await.get(&id).cloned() };
        let bytes = match buffered {
            Some(bytes) => Some(bytes),
            None => self
                .store
                .get(&self.message_key(id))
                .await?
                .map(|b| PersistedMessage::from_bytes(&b).map(|e| e.data))
                .transpose()?,
        };
        match bytes {
            Some(bytes) => Ok(Some(self.codec.decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Read metadata, optionally restricted to a field subset.
    pub async fn read_metadata(
        &self,
        id: u32,
        fields: Option<&[MetaField]>,
    ) -> BrokerResult<Option<MessageMetadata>> {
        let buffered = { self.metadata.read().await.get(&id).cloned() };
        let bytes = match buffered {
            Some(bytes) => Some(bytes),
            None => self.store.get(&self.metadata_key(id)).await?,
        };
        match bytes {
            Some(bytes) => Ok(Some(self.codec.decode_metadata(&bytes, fields)?)),
            None => Ok(None),
        }
    }

    /// Apply a partial update to an id's encoded metadata.
    ///
    /// Atomic with respect to other updates to the same id; returns `false`
    /// when the id is unknown.
    pub async fn update_metadata(&self, id: u32, patch: &MetadataPatch) -> BrokerResult<bool> {
        let _guard = self.update_lock.lock().await;
        {
            let mut metadata = self.metadata.write().await;
            if let Some(bytes) = metadata.get_mut(&id) {
                *bytes = self.codec.update_metadata(bytes, patch)?;
                return Ok(true);
            }
        }
        let key = self.metadata_key(id);
        match self.store.get(&key).await? {
            Some(bytes) => {
                let updated = self.codec.update_metadata(&bytes, patch)?;
                self.store.put(&key, updated).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Drop an id from the buffer and the persistent store.
    pub async fn delete(&self, id: u32) -> BrokerResult<()> {
        self.payloads.write().await.remove(&id);
        self.metadata.write().await.remove(&id);
        self.store.delete(&self.message_key(id)).await?;
        self.store.delete(&self.metadata_key(id)).await?;
        Ok(())
    }

    /// Remove consumed persisted entries; report unconsumed entries older
    /// than `retention_ms` for dead-lettering.
    pub async fn sweep_retention(&self, retention_ms: u64) -> BrokerResult<RetentionSweep> {
        let now = now_millis();
        let prefix = format!("{}/meta/", self.topic);
        let entries = self.store.scan_prefix(&prefix).await?;
        let mut sweep = RetentionSweep::default();
        for (key, bytes) in entries {
            let Some(id) = key
                .strip_prefix(&prefix)
                .and_then(|s| s.parse::<u32>().ok())
            else {
                continue;
            };
            let Ok(meta) = self
                .codec
                .decode_metadata(&bytes, Some(&[MetaField::Ts, MetaField::ConsumedAt]))
            else {
                continue;
            };
            if meta.consumed_at.is_some() {
                self.store.delete(&self.message_key(id)).await?;
                self.store.delete(&key).await?;
                sweep.removed += 1;
            } else if meta.ts + retention_ms <= now {
                sweep.expired.push(id);
            }
        }
        Ok(sweep)
    }

    /// Entries currently buffered in memory.
    pub async fn buffered_count(&self) -> usize {
        self.metadata.read().await.len()
    }

    /// Cumulative payload bytes accepted over the topic's lifetime.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }

    /// Cancel the pending flush and refuse new schedules.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Ok(mut guard) = self.flush_task.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}
