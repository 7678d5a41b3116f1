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

//! Message pipeline: the ordered chain deciding expiration, delay and
//! attempt outcomes before a message reaches the router.
//!
//! A processor returning `true` has *handled* (diverted) the message and the
//! caller must stop normal routing. The canonical order is
//! Expiration → Delay → Attempts: expiration dominates delay, and attempts
//! are checked only for still-eligible messages.

use crate::delayed::DelayedQueueManager;
use crate::dlq::{DlqManager, DlqReason};
use crate::error::BrokerResult;
use crate::message::{now_millis, MessageMetadata};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// One stage of the pipeline.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Stage name, for logs.
    fn name(&self) -> &'static str;

    /// Inspect a message; `true` means it was diverted and routing stops.
    async fn process(&self, meta: &MessageMetadata) -> BrokerResult<bool>;
}

/// Dead-letters messages whose TTL has elapsed, or whose delay would
/// outlive it.
pub struct ExpirationProcessor {
    dlq: Arc<DlqManager>,
}

impl ExpirationProcessor {
    /// Create the expiration stage.
    pub fn new(dlq: Arc<DlqManager>) -> Self {
        Self { dlq }
    }
}

#[async_trait]
impl Processor for ExpirationProcessor {
    fn name(&self) -> &'static str {
        "expiration"
    }

    async fn process(&self, meta: &MessageMetadata) -> BrokerResult<bool> {
        let Some(ttl) = meta.ttl else {
            return Ok(false);
        };
        let dead_on_arrival = meta.ttd.is_some_and(|ttd| ttd >= ttl);
        if dead_on_arrival || meta.is_expired(now_millis()) {
            self.dlq.publish(meta, DlqReason::Expired).await;
            return Ok(true);
        }
        Ok(false)
    }
}

/// Parks messages whose delivery time has not arrived.
pub struct DelayProcessor {
    delayed: Arc<DelayedQueueManager>,
}

impl DelayProcessor {
    /// Create the delay stage.
    pub fn new(delayed: Arc<DelayedQueueManager>) -> Self {
        Self { delayed }
    }
}

#[async_trait]
impl Processor for DelayProcessor {
    fn name(&self) -> &'static str {
        "delay"
    }

    async fn process(&self, meta: &MessageMetadata) -> BrokerResult<bool> {
        let Some(ready_ts) = meta.ready_ts() else {
            return Ok(false);
        };
        if ready_ts > now_millis() {
            self.delayed.insert(meta.id, ready_ts).await;
            return Ok(true);
        }
        Ok(false)
    }
}

/// Dead-letters messages delivered more times than the topic allows.
pub struct AttemptsProcessor {
    dlq: Arc<DlqManager>,
    max_attempts: u8,
}

impl AttemptsProcessor {
    /// Create the attempts stage; present only when the topic configures a
    /// delivery-attempt limit.
    pub fn new(dlq: Arc<DlqManager>, max_attempts: u8) -> Self {
        Self { dlq, max_attempts }
    }
}

#[async_trait]
impl Processor for AttemptsProcessor {
    fn name(&self) -> &'static str {
        "attempts"
    }

    async fn process(&self, meta: &MessageMetadata) -> BrokerResult<bool> {
        if meta.attempts > self.max_attempts {
            self.dlq.publish(meta, DlqReason::MaxAttempts).await;
            return Ok(true);
        }
        Ok(false)
    }
}

/// Ordered chain of processors.
pub struct MessagePipeline {
    processors: Vec<Arc<dyn Processor>>,
}

impl MessagePipeline {
    /// Build a pipeline from its stages, in order.
    pub fn new(processors: Vec<Arc<dyn Processor>>) -> Self {
        Self { processors }
    }

    /// Run the chain; `true` as soon as one stage diverts the message.
    pub async fn process(&self, meta: &MessageMetadata) -> BrokerResult<bool> {
        for processor in &self.processors {
            if processor.process(meta).await? {
                debug!(id = meta.id, stage = processor.name(), "message diverted");
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ATTEMPTS_UNBOUNDED;
    use crate::storage::MessageStorage;
    use relay_codec::BinaryCodec;
    use relay_keyvalue::InMemoryKVStore;

    fn dlq() -> Arc<DlqManager> {
        let storage = Arc::new(MessageStorage::new(
            "t",
            Arc::new(BinaryCodec::new()),
            Arc::new(InMemoryKVStore::new()),
            false,
            100,
            64,
        ));
        Arc::new(DlqManager::new(storage))
    }

    #[tokio::test]
    async fn test_expiration_elapsed_ttl() {
        let dlq = dlq();
        let stage = ExpirationProcessor::new(Arc::clone(&dlq));

        let live = MessageMetadata::new(1, 1, "t", now_millis()).with_ttl(60_000);
        assert!(!stage.process(&live).await.unwrap());

        let expired = MessageMetadata::new(2, 1, "t", now_millis() - 100).with_ttl(50);
        assert!(stage.process(&expired).await.unwrap());
        assert_eq!(dlq.reason(2).await, Some(DlqReason::Expired));
    }

    #[tokio::test]
    async fn test_expiration_when_delay_outlives_ttl() {
        let dlq = dlq();
        let stage = ExpirationProcessor::new(Arc::clone(&dlq));

        // ttd >= ttl: the message would expire while parked
        let meta = MessageMetadata::new(3, 1, "t", now_millis())
            .with_ttl(1_000)
            .with_ttd(1_000);
        assert!(stage.process(&meta).await.unwrap());
        assert_eq!(dlq.reason(3).await, Some(DlqReason::Expired));
    }

    #[tokio::test]
    async fn test_no_ttl_never_expires() {
        let stage = ExpirationProcessor::new(dlq());
        let meta = MessageMetadata::new(4, 1, "t", 0).with_ttd(10);
        assert!(!stage.process(&meta).await.unwrap());
    }

    #[tokio::test]
    async fn test_attempts_limit() {
        let dlq = dlq();
        let stage = AttemptsProcessor::new(Arc::clone(&dlq), 2);

        let mut meta = MessageMetadata::new(5, 1, "t", now_millis());
        meta.attempts = 2;
        assert!(!stage.process(&meta).await.unwrap());

        meta.attempts = 3;
        assert!(stage.process(&meta).await.unwrap());
        assert_eq!(dlq.reason(5).await, Some(DlqReason::MaxAttempts));
    }

    #[tokio::test]
    async fn test_unbounded_sentinel_always_exceeds() {
        let dlq = dlq();
        let stage = AttemptsProcessor::new(Arc::clone(&dlq), u8::MAX - 1);
        let mut meta = MessageMetadata::new(6, 1, "t", now_millis());
        meta.attempts = ATTEMPTS_UNBOUNDED;
        assert!(stage.process(&meta).await.unwrap());
    }
}
