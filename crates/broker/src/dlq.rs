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

//! Dead-letter queue: terminal holding area for undeliverable messages.

use crate::error::BrokerResult;
use crate::message::MessageMetadata;
use crate::storage::MessageStorage;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Why a message was dead-lettered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DlqReason {
    /// No eligible consumer existed at routing time.
    NoConsumers,
    /// TTL elapsed before delivery.
    Expired,
    /// Delivery attempts exceeded the configured limit.
    MaxAttempts,
    /// Schema rejected the payload.
    Validation,
    /// A consumer-side handler failed terminally.
    ProcessingError,
}

impl fmt::Display for DlqReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DlqReason::NoConsumers => "no_consumers",
            DlqReason::Expired => "expired",
            DlqReason::MaxAttempts => "max_attempts",
            DlqReason::Validation => "validation",
            DlqReason::ProcessingError => "processing_error",
        };
        f.write_str(s)
    }
}

/// A dead-lettered message as yielded by a [`DlqReader`].
#[derive(Debug, Clone)]
pub struct DlqMessage {
    /// Decoded payload.
    pub payload: Value,
    /// Message metadata.
    pub metadata: MessageMetadata,
    /// Why the message is here.
    pub reason: DlqReason,
}

/// In-memory DLQ index plus its reader/replayer.
pub struct DlqManager {
    // BTreeMap: ids are monotonic, so iteration follows dead-letter order
    entries: RwLock<BTreeMap<u32, DlqReason>>,
    total_processed: AtomicU64,
    readers: RwLock<HashMap<u32, Arc<DlqReader>>>,
    storage: Arc<MessageStorage>,
}

impl DlqManager {
    /// Create a DLQ backed by the topic's storage.
    pub fn new(storage: Arc<MessageStorage>) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            total_processed: AtomicU64::new(0),
            readers: RwLock::new(HashMap::new()),
            storage,
        }
    }

    /// Record a message as dead-lettered.
    pub async fn publish(&self, meta: &MessageMetadata, reason: DlqReason) {
        let mut entries = self.entries.write().await;
        entries.insert(meta.id, reason);
        self.total_processed.fetch_add(1, Ordering::Relaxed);
        debug!(id = meta.id, %reason, topic = %meta.topic, "message dead-lettered");
    }

    /// Whether an id is currently dead-lettered.
    pub async fn contains(&self, id: u32) -> bool {
        self.entries.read().await.contains_key(&id)
    }

    /// The recorded reason for an id.
    pub async fn reason(&self, id: u32) -> Option<DlqReason> {
        self.entries.read().await.get(&id).copied()
    }

    /// Entries currently held.
    pub async fn depth(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Messages dead-lettered over the topic's lifetime (monotonic).
    pub fn total_messages_processed(&self) -> u64 {
        self.total_processed.load(Ordering::Relaxed)
    }

    /// Create (or share) the lazy reader for a dlq-consumer.
    ///
    /// One reader exists per consumer: a second call returns the same cursor.
    pub async fn create_reader(&self, consumer_id: u32) -> Arc<DlqReader> {
        if let Some(reader) = self.readers.read().await.get(&consumer_id) {
            return Arc::clone(reader);
        }
        let snapshot: Vec<(u32, DlqReason)> = self
            .entries
            .read()
            .await
            .iter()
            .map(|(id, reason)| (*id, *reason))
            .collect();
        let mut readers = self.readers.write().await;
        Arc::clone(
            readers
                .entry(consumer_id)
                .or_insert_with(|| Arc::new(DlqReader::new(snapshot, Arc::clone(&self.storage)))),
        )
    }

    /// Drop a dlq-consumer's reader.
    pub async fn drop_reader(&self, consumer_id: u32) {
        self.readers.write().await.remove(&consumer_id);
    }

    /// Replay entries through a handler, removing each entry the handler
    /// completes without failing. Returns how many were replayed.
    pub async fn replay_messages<F, Fut, P>(
        &self,
        mut handler: F,
        filter: Option<P>,
    ) -> BrokerResult<usize>
    where
        F: FnMut(Value, MessageMetadata) -> Fut,
        Fut: Future<Output = BrokerResult<()>>,
        P: Fn(&MessageMetadata, DlqReason) -> bool,
    {
        let snapshot: Vec<(u32, DlqReason)> = self
            .entries
            .read()
            .await
            .iter()
            .map(|(id, reason)| (*id, *reason))
            .collect();

        let mut replayed = 0;
        for (id, reason) in snapshot {
            let (payload, meta) = match self.storage.read_all(id).await {
                Ok((Some(payload), Some(meta))) => (payload, meta),
                _ => continue,
            };
            if let Some(ref passes) = filter {
                if !passes(&meta, reason) {
                    continue;
                }
            }
            match handler(payload, meta).await {
                Ok(()) => {
                    self.entries.write().await.remove(&id);
                    replayed += 1;
                }
                Err(e) => {
                    warn!(id, error = %e, "DLQ replay handler failed, entry kept");
                }
            }
        }
        Ok(replayed)
    }
}

/// Lazy single-pass cursor over a DLQ snapshot.
///
/// Entries whose payload or metadata cannot be read back from storage are
/// skipped silently.
pub struct DlqReader {
    entries: Vec<(u32, DlqReason)>,
    cursor: AtomicUsize,
    storage: Arc<MessageStorage>,
}

impl DlqReader {
    fn new(entries: Vec<(u32, DlqReason)>, storage: Arc<MessageStorage>) -> Self {
        Self {
            entries,
            cursor: AtomicUsize::new(0),
            storage,
        }
    }

    /// Yield the next readable entry, or `None` once exhausted.
    pub async fn next(&self) -> Option<DlqMessage> {
        loop {
            let index = self.cursor.fetch_add(1, Ordering::SeqCst);
            let (id, reason) = *self.entries.get(index)?;
            match self.storage.read_all(id).await {
                Ok((Some(payload), Some(metadata))) => {
                    return Some(DlqMessage {
                        payload,
                        metadata,
                        reason,
                    });
                }
                _ => continue,
            }
        }
    }

    /// Exhaust the cursor; subsequent `next` calls return `None`.
    pub fn close(&self) {
        self.cursor.store(self.entries.len(), Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::now_millis;
    use relay_codec::BinaryCodec;
    use relay_keyvalue::InMemoryKVStore;
    use serde_json::json;

    async fn setup() -> (Arc<MessageStorage>, DlqManager) {
        let storage = Arc::new(MessageStorage::new(
            "t",
            Arc::new(BinaryCodec::new()),
            Arc::new(InMemoryKVStore::new()),
            false,
            100,
            64,
        ));
        let dlq = DlqManager::new(Arc::clone(&storage));
        (storage, dlq)
    }

    async fn seed(storage: &Arc<MessageStorage>, id: u32) -> MessageMetadata {
        let meta = MessageMetadata::new(id, 1, "t", now_millis());
        let payload = serde_json::to_vec(&json!({ "id": id })).unwrap();
        storage.write_all(payload, &meta).await.unwrap();
        meta
    }

    #[tokio::test]
    async fn test_publish_and_reader() {
        let (storage, dlq) = setup().await;
        for id in 1..=3 {
            let meta = seed(&storage, id).await;
            dlq.publish(&meta, DlqReason::Expired).await;
        }
        assert_eq!(dlq.depth().await, 3);
        assert_eq!(dlq.total_messages_processed(), 3);

        let reader = dlq.create_reader(10).await;
        let first = reader.next().await.unwrap();
        assert_eq!(first.metadata.id, 1);
        assert_eq!(first.reason, DlqReason::Expired);
        assert_eq!(first.payload, json!({ "id": 1 }));

        // Same consumer shares the cursor
        let same = dlq.create_reader(10).await;
        let second = same.next().await.unwrap();
        assert_eq!(second.metadata.id, 2);

        assert!(reader.next().await.is_some());
        assert!(reader.next().await.is_none());
    }

    #[tokio::test]
    async fn test_reader_skips_unreadable_entries() {
        let (storage, dlq) = setup().await;
        let ghost = MessageMetadata::new(7, 1, "t", now_millis());
        dlq.publish(&ghost, DlqReason::NoConsumers).await;
        let real = seed(&storage, 8).await;
        dlq.publish(&real, DlqReason::MaxAttempts).await;

        let reader = dlq.create_reader(1).await;
        let msg = reader.next().await.unwrap();
        assert_eq!(msg.metadata.id, 8);
        assert!(reader.next().await.is_none());
    }

    #[tokio::test]
    async fn test_replay_removes_successes_and_keeps_failures() {
        let (storage, dlq) = setup().await;
        for id in 1..=4 {
            let meta = seed(&storage, id).await;
            dlq.publish(&meta, DlqReason::MaxAttempts).await;
        }

        // Handler fails on even ids
        let replayed = dlq
            .replay_messages(
                |_payload, meta| async move {
                    if meta.id % 2 == 0 {
                        Err(crate::error::BrokerError::Internal("boom".to_string()))
                    } else {
                        Ok(())
                    }
                },
                None::<fn(&MessageMetadata, DlqReason) -> bool>,
            )
            .await
            .unwrap();

        assert_eq!(replayed, 2);
        assert_eq!(dlq.depth().await, 2);
        assert!(dlq.contains(2).await);
        assert!(dlq.contains(4).await);
    }

    #[tokio::test]
    async fn test_replay_filter() {
        let (storage, dlq) = setup().await;
        for id in 1..=3 {
            let meta = seed(&storage, id).await;
            dlq.publish(&meta, DlqReason::Expired).await;
        }

        let replayed = dlq
            .replay_messages(
                |_payload, _meta| async move { Ok(()) },
                Some(|meta: &MessageMetadata, _reason: DlqReason| meta.id == 2),
            )
            .await
            .unwrap();

        assert_eq!(replayed, 1);
        assert_eq!(dlq.depth().await, 2);
        assert!(!dlq.contains(2).await);
    }
}
