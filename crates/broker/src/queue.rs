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

//! Per-consumer priority queues.
//!
//! Each live consumer owns one binary heap of message ids keyed on
//! `(priority desc, insertion seq asc)`: higher priority dequeues first,
//! equal priorities preserve FIFO. A membership set alongside the heap keeps
//! a message from entering the same queue twice across nack/requeue cycles.

use crate::message::MessageMetadata;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QueuedEntry {
    priority: u8,
    seq: u64,
    id: u32,
}

impl PartialOrd for QueuedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority wins; within a priority class the lower
        // sequence number (earlier enqueue) must pop first.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Default)]
struct ConsumerQueue {
    heap: BinaryHeap<QueuedEntry>,
    members: HashSet<u32>,
}

/// Owns one priority queue per live consumer, keyed by message id.
#[derive(Default)]
pub struct QueueManager {
    queues: RwLock<HashMap<u32, ConsumerQueue>>,
    seq: AtomicU64,
    total_queued: AtomicU64,
}

impl QueueManager {
    /// Create an empty queue manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the queue for a newly registered consumer.
    pub async fn add_consumer_queue(&self, consumer_id: u32) {
        let mut queues = self.queues.write().await;
        queues.entry(consumer_id).or_default();
    }

    /// Drop a consumer's queue, returning how many ids it still held.
    pub async fn remove_consumer_queue(&self, consumer_id: u32) -> usize {
        let mut queues = self.queues.write().await;
        let drained = queues
            .remove(&consumer_id)
            .map(|q| q.members.len())
            .unwrap_or(0);
        self.total_queued
            .fetch_sub(drained as u64, AtomicOrdering::Relaxed);
        drained
    }

    /// Enqueue a message id for one consumer.
    ///
    /// Returns `false` when the consumer has no queue or already holds the id.
    pub async fn enqueue(&self, consumer_id: u32, meta: &MessageMetadata) -> bool {
        let mut queues = self.queues.write().await;
        let Some(queue) = queues.get_mut(&consumer_id) else {
            return false;
        };
        if !queue.members.insert(meta.id) {
            return false;
        }
        queue.heap.push(QueuedEntry {
            priority: meta.priority.unwrap_or(0),
            seq: self.seq.fetch_add(1, AtomicOrdering::Relaxed),
            id: meta.id,
        });
        self.total_queued.fetch_add(1, AtomicOrdering::Relaxed);
        true
    }

    /// Pop the highest-priority id from a consumer's queue.
    pub async fn dequeue(&self, consumer_id: u32) -> Option<u32> {
        let mut queues = self.queues.write().await;
        let queue = queues.get_mut(&consumer_id)?;
        let entry = queue.heap.pop()?;
        queue.members.remove(&entry.id);
        self.total_queued.fetch_sub(1, AtomicOrdering::Relaxed);
        Some(entry.id)
    }

    /// Queue depth for one consumer.
    pub async fn depth(&self, consumer_id: u32) -> usize {
        let queues = self.queues.read().await;
        queues.get(&consumer_id).map(|q| q.heap.len()).unwrap_or(0)
    }

    /// Whether a consumer's queue currently holds the id.
    pub async fn contains(&self, consumer_id: u32, id: u32) -> bool {
        let queues = self.queues.read().await;
        queues
            .get(&consumer_id)
            .map(|q| q.members.contains(&id))
            .unwrap_or(false)
    }

    /// Total ids across all consumer queues.
    pub fn total_queued_messages(&self) -> u64 {
        self.total_queued.load(AtomicOrdering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(id: u32, priority: Option<u8>) -> MessageMetadata {
        let mut m = MessageMetadata::new(id, 1, "t", 1_000);
        m.priority = priority;
        m
    }

    #[tokio::test]
    async fn test_priority_order_with_fifo_ties() {
        let queues = QueueManager::new();
        queues.add_consumer_queue(1).await;

        assert!(queues.enqueue(1, &meta(10, Some(1))).await);
        assert!(queues.enqueue(1, &meta(11, Some(5))).await);
        assert!(queues.enqueue(1, &meta(12, Some(1))).await);
        assert!(queues.enqueue(1, &meta(13, None)).await);

        assert_eq!(queues.dequeue(1).await, Some(11));
        assert_eq!(queues.dequeue(1).await, Some(10));
        assert_eq!(queues.dequeue(1).await, Some(12));
        assert_eq!(queues.dequeue(1).await, Some(13));
        assert_eq!(queues.dequeue(1).await, None);
    }

    #[tokio::test]
    async fn test_duplicate_enqueue_is_rejected() {
        let queues = QueueManager::new();
        queues.add_consumer_queue(1).await;

        assert!(queues.enqueue(1, &meta(7, None)).await);
        assert!(!queues.enqueue(1, &meta(7, None)).await);
        assert_eq!(queues.depth(1).await, 1);

        // Once dequeued, the id may be requeued
        assert_eq!(queues.dequeue(1).await, Some(7));
        assert!(queues.enqueue(1, &meta(7, None)).await);
    }

    #[tokio::test]
    async fn test_unknown_consumer_enqueue_fails() {
        let queues = QueueManager::new();
        assert!(!queues.enqueue(99, &meta(1, None)).await);
        assert_eq!(queues.dequeue(99).await, None);
    }

    #[tokio::test]
    async fn test_total_counter_tracks_all_queues() {
        let queues = QueueManager::new();
        queues.add_consumer_queue(1).await;
        queues.add_consumer_queue(2).await;

        queues.enqueue(1, &meta(1, None)).await;
        queues.enqueue(2, &meta(1, None)).await;
        queues.enqueue(2, &meta(2, None)).await;
        assert_eq!(queues.total_queued_messages(), 3);

        queues.dequeue(2).await;
        assert_eq!(queues.total_queued_messages(), 2);

        queues.remove_consumer_queue(2).await;
        assert_eq!(queues.total_queued_messages(), 1);
    }
}
