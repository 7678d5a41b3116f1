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

//! Topic façade: the single-topic public API and its client factories.
//!
//! ## Composition
//! A topic wires storage, the pipeline, the router, per-consumer queues, the
//! delayed queue, the DLQ and the ack manager together, and owns their
//! background workers. Producers, consumers and dlq-consumers hold capability
//! handles exposing only their slice of the surface.
//!
//! ## Data flow
//! `publish` → storage → pipeline → router → consumer queues →
//! `consume` → ack/nack → requeue, DLQ, or completion.

use crate::ack::AckManager;
use crate::client::{ClientActivity, ClientInfo, ClientManager, ClientType};
use crate::config::TopicConfig;
use crate::delayed::DelayedQueueManager;
use crate::dlq::{DlqManager, DlqReader, DlqReason};
use crate::error::{BrokerError, BrokerResult};
use crate::logging::{LogLevel, LogService, TracingSink};
use crate::message::{now_millis, validate_topic_name, MessageMetadata};
use crate::metrics::{MetricsCollector, MetricsSnapshot};
use crate::pipeline::{
    AttemptsProcessor, DelayProcessor, ExpirationProcessor, MessagePipeline, Processor,
};
use crate::queue::QueueManager;
use crate::router::Router;
use crate::routing::RoutingStrategy;
use crate::schema::{SchemaRegistry, SchemaValidator};
use crate::storage::MessageStorage;
use crate::subscription::{self, Subscription, SubscriptionOptions};
use relay_codec::{BinaryCodec, MessageCodec};
use relay_keyvalue::KeyValueStore;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Per-publish delivery options, applied to every payload in the call.
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    /// Dequeue priority, higher first.
    pub priority: Option<u8>,
    /// Time-to-live, ms.
    pub ttl_ms: Option<u32>,
    /// Time-to-delivery, ms.
    pub ttd_ms: Option<u32>,
    /// Pin delivery to a stable consumer.
    pub correlation_id: Option<String>,
    /// Restrict delivery to subscribers of this key.
    pub routing_key: Option<String>,
}

impl PublishOptions {
    /// Options with every field unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set dequeue priority.
    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Set time-to-live.
    pub fn ttl_ms(mut self, ttl_ms: u32) -> Self {
        self.ttl_ms = Some(ttl_ms);
        self
    }

    /// Set time-to-delivery.
    pub fn ttd_ms(mut self, ttd_ms: u32) -> Self {
        self.ttd_ms = Some(ttd_ms);
        self
    }

    /// Set the correlation id.
    pub fn correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Set the routing key.
    pub fn routing_key(mut self, routing_key: impl Into<String>) -> Self {
        self.routing_key = Some(routing_key.into());
        self
    }
}

/// Options for registering a consumer.
#[derive(Debug, Clone, Default)]
pub struct ConsumerOptions {
    /// Routing keys to subscribe to; `None` receives all traffic.
    pub routing_keys: Option<Vec<String>>,
}

/// A delivered message.
#[derive(Debug, Clone)]
pub struct ConsumedMessage {
    /// Decoded payload.
    pub payload: Value,
    /// Metadata, with `need_acks` filled from the ack manager.
    pub metadata: MessageMetadata,
}

/// Point-in-time view of a topic.
#[derive(Debug, Clone)]
pub struct TopicStats {
    /// Topic name.
    pub name: String,
    /// Counter and latency snapshot.
    pub metrics: MetricsSnapshot,
    /// Ids across all consumer queues.
    pub queued_messages: u64,
    /// Messages parked in the delayed queue.
    pub delayed_messages: usize,
    /// Entries in the DLQ.
    pub dlq_messages: usize,
    /// In-flight unacked deliveries.
    pub pending_acks: usize,
    /// Registered clients of any role.
    pub clients: usize,
}

/// A named topic: the composition root of the broker's subsystems.
pub struct Topic {
    name: String,
    config: TopicConfig,
    codec: Arc<dyn MessageCodec>,
    storage: Arc<MessageStorage>,
    metrics: Arc<MetricsCollector>,
    clients: Arc<ClientManager>,
    queues: Arc<QueueManager>,
    strategy: Arc<RoutingStrategy>,
    router: Arc<Router>,
    dlq: Arc<DlqManager>,
    delayed: Arc<DelayedQueueManager>,
    pipeline: Arc<MessagePipeline>,
    ack: Arc<AckManager>,
    logs: Arc<LogService>,
    validator: Option<Arc<dyn SchemaValidator>>,
    next_message_id: AtomicU32,
    next_batch_id: AtomicU32,
    retention_task: StdMutex<Option<JoinHandle<()>>>,
    shutdown: Arc<Notify>,
}

impl Topic {
    /// Create a topic over a key/value store, resolving its schema through
    /// the registry, and start its background workers.
    pub async fn new(
        name: impl Into<String>,
        config: TopicConfig,
        store: Arc<dyn KeyValueStore>,
        schemas: &SchemaRegistry,
    ) -> BrokerResult<Arc<Self>> {
        let name = name.into();
        validate_topic_name(&name)?;

        let validator = match config.schema.as_deref() {
            Some(schema_name) => Some(schemas.get(schema_name).await.ok_or_else(|| {
                BrokerError::InvalidArgument(format!("unknown schema '{}'", schema_name))
            })?),
            None => None,
        };

        let codec: Arc<dyn MessageCodec> = Arc::new(BinaryCodec::new());
        let storage = Arc::new(MessageStorage::new(
            name.clone(),
            Arc::clone(&codec),
            store,
            config.persist,
            config.persist_threshold_ms,
            config.chunk_size,
        ));
        let metrics = Arc::new(MetricsCollector::new());
        let clients = Arc::new(ClientManager::new(
            config.consumer_processing_time_threshold_ms,
            config.consumer_pending_threshold,
            config.consumer_inactivity_threshold_ms,
        ));
        let queues = Arc::new(QueueManager::new());
        let strategy = Arc::new(RoutingStrategy::new(config.ring_replicas));
        let dlq = Arc::new(DlqManager::new(Arc::clone(&storage)));
        let router = Arc::new(Router::new(
            Arc::clone(&strategy),
            Arc::clone(&queues),
            Arc::clone(&dlq),
            Arc::clone(&clients),
        ));
        let ack = Arc::new(AckManager::new(
            Arc::clone(&storage),
            Arc::clone(&queues),
            Arc::clone(&metrics),
            config.ack_timeout_ms,
        ));
        let delayed = Arc::new(DelayedQueueManager::new(
            Arc::clone(&storage),
            Arc::clone(&router),
            Arc::clone(&ack),
            Arc::clone(&metrics),
        ));

        let mut processors: Vec<Arc<dyn Processor>> = vec![
            Arc::new(ExpirationProcessor::new(Arc::clone(&dlq))),
            Arc::new(DelayProcessor::new(Arc::clone(&delayed))),
        ];
        if let Some(max_attempts) = config.max_delivery_attempts {
            processors.push(Arc::new(AttemptsProcessor::new(
                Arc::clone(&dlq),
                max_attempts,
            )));
        }
        let pipeline = Arc::new(MessagePipeline::new(processors));
        ack.bind_pipeline(&pipeline);

        let logs = Arc::new(LogService::new(Arc::new(TracingSink), 32, 50));

        let topic = Arc::new(Self {
            name: name.clone(),
            config,
            codec,
            storage,
            metrics,
            clients,
            queues,
            strategy,
            router,
            dlq,
            delayed,
            pipeline,
            ack,
            logs,
            validator,
            next_message_id: AtomicU32::new(1),
            next_batch_id: AtomicU32::new(1),
            retention_task: StdMutex::new(None),
            shutdown: Arc::new(Notify::new()),
        });

        topic.ack.start();
        topic.clients.start_inactivity_sweep();
        topic.start_retention_sweep();

        info!(topic = %name, "topic created");
        Ok(topic)
    }

    /// Topic name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Topic configuration.
    pub fn config(&self) -> &TopicConfig {
        &self.config
    }

    fn alloc_message_id(&self) -> u32 {
        self.next_message_id.fetch_add(1, Ordering::Relaxed)
    }

    fn base_meta(
        &self,
        id: u32,
        producer_id: u32,
        opts: &PublishOptions,
        batch: Option<(u32, u16, u16)>,
    ) -> MessageMetadata {
        let mut meta = MessageMetadata::new(id, producer_id, self.name.clone(), now_millis());
        meta.priority = opts.priority;
        meta.ttl = opts.ttl_ms;
        meta.ttd = opts.ttd_ms;
        meta.correlation_id = opts.correlation_id.clone();
        meta.routing_key = opts.routing_key.clone();
        if let Some((batch_id, batch_idx, batch_size)) = batch {
            meta = meta.with_batch(batch_id, batch_idx, batch_size);
        }
        meta
    }

    /// Publish one or more payloads.
    ///
    /// Per-message failures are partial: the returned vector carries one
    /// result per payload and one failure never aborts the batch.
    pub async fn publish(
        &self,
        producer_id: u32,
        payloads: Vec<Value>,
        opts: &PublishOptions,
    ) -> BrokerResult<Vec<BrokerResult<u32>>> {
        self.clients
            .expect_type(producer_id, ClientType::Producer)
            .await?;

        let batch_id = if payloads.len() > 1 {
            Some(self.next_batch_id.fetch_add(1, Ordering::Relaxed))
        } else {
            None
        };
        let batch_size = payloads.len() as u16;

        let mut results = Vec::with_capacity(payloads.len());
        let mut published = 0u64;
        for (idx, payload) in payloads.iter().enumerate() {
            let batch = batch_id.map(|id| (id, idx as u16, batch_size));
            let result = self.publish_one(producer_id, payload, opts, batch).await;
            match &result {
                Ok(_) => published += 1,
                Err(e) => {
                    self.logs
                        .collect(
                            LogLevel::Warn,
                            "topic",
                            format!("publish failed on {}: {}", self.name, e),
                        )
                        .await;
                }
            }
            results.push(result);
        }
        if published > 0 {
            self.clients
                .record_activity(
                    producer_id,
                    ClientActivity {
                        message_count: Some(published),
                        ..Default::default()
                    },
                )
                .await?;
        }
        Ok(results)
    }

    async fn publish_one(
        &self,
        producer_id: u32,
        payload: &Value,
        opts: &PublishOptions,
        batch: Option<(u32, u16, u16)>,
    ) -> BrokerResult<u32> {
        if let Some(validator) = &self.validator {
            if !validator.validate(payload) {
                // Keep the rejected payload inspectable through the DLQ
                if let Ok(bytes) = self.codec.encode(payload) {
                    let id = self.alloc_message_id();
                    let mut meta = self.base_meta(id, producer_id, opts, batch);
                    meta.size = bytes.len() as u32;
                    if self.storage.write_all(bytes, &meta).await.is_ok() {
                        self.dlq.publish(&meta, DlqReason::Validation).await;
                    }
                }
                return Err(BrokerError::Validation(format!(
                    "schema '{}' rejected payload",
                    self.config.schema.as_deref().unwrap_or_default()
                )));
            }
        }

        let bytes = self.codec.encode(payload)?;
        if let Some(max) = self.config.max_message_size {
            if bytes.len() > max {
                return Err(BrokerError::InvalidArgument(format!(
                    "message of {} bytes exceeds max_message_size {}",
                    bytes.len(),
                    max
                )));
            }
        }
        if let Some(cap) = self.config.max_size_bytes {
            if self.storage.total_bytes() + bytes.len() as u64 > cap {
                return Err(BrokerError::InvalidArgument(format!(
                    "topic {} capacity exhausted",
                    self.name
                )));
            }
        }

        let id = self.alloc_message_id();
        let mut meta = self.base_meta(id, producer_id, opts, batch);
        meta.size = bytes.len() as u32;
        let size = bytes.len() as u64;

        self.storage.write_all(bytes, &meta).await?;
        self.metrics
            .record_enqueue(size, now_millis().saturating_sub(meta.ts) as f64)
            .await;

        let handled = self.pipeline.process(&meta).await?;
        if !handled {
            let routed = self.router.route(&meta).await;
            self.ack.set_awaited_acks_count(id, routed as u32).await;
            if routed > 0 {
                self.metrics.update_queue_depth(routed as i64).await;
            }
        }
        debug!(topic = %self.name, id, handled, "message published");
        Ok(id)
    }

    /// Dequeue one message for a consumer.
    ///
    /// With `auto_ack` the awaited count is decremented immediately;
    /// otherwise the delivery goes pending until `ack`/`nack`.
    pub async fn consume(
        &self,
        consumer_id: u32,
        auto_ack: bool,
    ) -> BrokerResult<Option<ConsumedMessage>> {
        self.clients
            .expect_type(consumer_id, ClientType::Consumer)
            .await?;

        let (id, payload, mut meta) = loop {
            let Some(id) = self.queues.dequeue(consumer_id).await else {
                return Ok(None);
            };
            self.metrics.update_queue_depth(-1).await;

            // A message another path dead-lettered is terminal: never
            // deliver it
            if self.dlq.contains(id).await {
                continue;
            }
            let (payload, meta) = self.storage.read_all(id).await?;
            let (Some(payload), Some(meta)) = (payload, meta) else {
                warn!(topic = %self.name, id, "queued message missing from storage");
                continue;
            };
            // TTL can lapse while the message sits queued
            if meta.is_expired(now_millis()) {
                self.dlq.publish(&meta, DlqReason::Expired).await;
                self.ack.forget(id).await;
                continue;
            }
            break (id, payload, meta);
        };
        meta.need_acks = self.ack.need_acks(id).await;

        if auto_ack {
            self.ack.decrement_awaited_acks(id).await?;
        } else {
            self.ack.add_pending(consumer_id, id).await;
        }
        self.clients
            .record_activity(
                consumer_id,
                ClientActivity {
                    message_count: Some(1),
                    pending_delta: (!auto_ack).then_some(1),
                    ..Default::default()
                },
            )
            .await?;
        Ok(Some(ConsumedMessage {
            payload,
            metadata: meta,
        }))
    }

    /// Acknowledge one pending delivery, or all of the consumer's when `id`
    /// is `None`. Returns the released ids.
    pub async fn ack(&self, consumer_id: u32, id: Option<u32>) -> BrokerResult<Vec<u32>> {
        self.clients
            .expect_type(consumer_id, ClientType::Consumer)
            .await?;
        let ids = self.ack.ack(consumer_id, id).await?;
        self.settle_pending(consumer_id, ids.len()).await?;
        Ok(ids)
    }

    /// Negative-acknowledge pending deliveries; `requeue=false` forces the
    /// message toward the DLQ on its next pipeline pass.
    pub async fn nack(
        &self,
        consumer_id: u32,
        id: Option<u32>,
        requeue: bool,
    ) -> BrokerResult<Vec<u32>> {
        self.clients
            .expect_type(consumer_id, ClientType::Consumer)
            .await?;
        let ids = self.ack.nack(consumer_id, id, requeue).await?;
        self.settle_pending(consumer_id, ids.len()).await?;
        Ok(ids)
    }

    async fn settle_pending(&self, consumer_id: u32, released: usize) -> BrokerResult<()> {
        if released == 0 {
            return Ok(());
        }
        self.clients
            .record_activity(
                consumer_id,
                ClientActivity {
                    pending_delta: Some(-(released as i64)),
                    ..Default::default()
                },
            )
            .await
    }

    /// Register a producer and return its capability handle.
    pub async fn create_producer(self: &Arc<Self>) -> Producer {
        let id = self.clients.register(ClientType::Producer).await;
        Producer {
            topic: Arc::clone(self),
            id,
        }
    }

    /// Register a consumer, its queue and its routing subscriptions.
    pub async fn create_consumer(self: &Arc<Self>, options: ConsumerOptions) -> Consumer {
        let id = self.clients.register(ClientType::Consumer).await;
        self.queues.add_consumer_queue(id).await;
        self.strategy.add_entry(id, options.routing_keys).await;
        Consumer {
            topic: Arc::clone(self),
            id,
        }
    }

    /// Register a dlq-consumer and return its capability handle.
    pub async fn create_dlq_consumer(self: &Arc<Self>) -> DlqConsumer {
        let id = self.clients.register(ClientType::DlqConsumer).await;
        DlqConsumer {
            topic: Arc::clone(self),
            id,
        }
    }

    /// Deregister any client and tear down its routing state.
    pub async fn delete_client(&self, id: u32) -> BrokerResult<()> {
        let Some(info) = self.clients.remove(id).await else {
            return Err(BrokerError::NotFound(format!("client {}", id)));
        };
        match info.client_type {
            ClientType::Consumer => {
                let drained = self.queues.remove_consumer_queue(id).await;
                if drained > 0 {
                    self.metrics.update_queue_depth(-(drained as i64)).await;
                }
                self.strategy.remove_entry(id).await;
                self.ack.drop_consumer(id).await;
            }
            ClientType::DlqConsumer => {
                self.dlq.drop_reader(id).await;
            }
            ClientType::Producer => {}
        }
        self.logs
            .collect(
                LogLevel::Info,
                "topic",
                format!("client {} removed from {}", id, self.name),
            )
            .await;
        Ok(())
    }

    /// Roll an activity report into a client's stats.
    pub async fn record_client_activity(
        &self,
        id: u32,
        activity: ClientActivity,
    ) -> BrokerResult<()> {
        self.clients.record_activity(id, activity).await
    }

    /// Look up a client's current state.
    pub async fn client_info(&self, id: u32) -> Option<ClientInfo> {
        self.clients.get(id).await
    }

    /// Read a message's metadata, with `need_acks` and `size` filled in.
    pub async fn get_metadata(&self, id: u32) -> BrokerResult<Option<MessageMetadata>> {
        let (_, meta) = self.storage.read_all(id).await?;
        match meta {
            Some(mut meta) => {
                meta.need_acks = self.ack.need_acks(id).await;
                Ok(Some(meta))
            }
            None => Ok(None),
        }
    }

    /// Create (or share) the DLQ reader for a dlq-consumer.
    pub async fn create_dlq_reader(&self, consumer_id: u32) -> BrokerResult<Arc<DlqReader>> {
        self.clients
            .expect_type(consumer_id, ClientType::DlqConsumer)
            .await?;
        Ok(self.dlq.create_reader(consumer_id).await)
    }

    /// Replay DLQ entries through a handler; successfully handled entries
    /// leave the DLQ. Returns how many replayed.
    pub async fn replay_dlq<F, Fut, P>(
        &self,
        consumer_id: u32,
        handler: F,
        filter: Option<P>,
    ) -> BrokerResult<usize>
    where
        F: FnMut(Value, MessageMetadata) -> Fut,
        Fut: Future<Output = BrokerResult<()>>,
        P: Fn(&MessageMetadata, DlqReason) -> bool,
    {
        self.clients
            .expect_type(consumer_id, ClientType::DlqConsumer)
            .await?;
        self.dlq.replay_messages(handler, filter).await
    }

    /// Snapshot the topic's state.
    pub async fn stats(&self) -> TopicStats {
        TopicStats {
            name: self.name.clone(),
            metrics: self.metrics.snapshot().await,
            queued_messages: self.queues.total_queued_messages(),
            delayed_messages: self.delayed.depth().await,
            dlq_messages: self.dlq.depth().await,
            pending_acks: self.ack.pending_total().await,
            clients: self.clients.client_count().await,
        }
    }

    fn start_retention_sweep(self: &Arc<Self>) {
        let period = Duration::from_millis(self.config.archival_threshold_ms.max(1_000));
        let topic = Arc::clone(self);
        let shutdown = Arc::clone(&self.shutdown);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(period) => topic.sweep_retention().await,
                    _ = shutdown.notified() => break,
                }
            }
        });
        if let Ok(mut guard) = self.retention_task.lock() {
            *guard = Some(handle);
        }
    }

    async fn sweep_retention(&self) {
        match self.storage.sweep_retention(self.config.retention_ms).await {
            Ok(sweep) => {
                if sweep.removed > 0 {
                    debug!(topic = %self.name, removed = sweep.removed, "retention sweep");
                }
                for id in sweep.expired {
                    if self.dlq.contains(id).await {
                        continue;
                    }
                    match self.storage.read_metadata(id, None).await {
                        Ok(Some(meta)) => {
                            self.dlq.publish(&meta, DlqReason::Expired).await;
                        }
                        _ => continue,
                    }
                }
            }
            Err(e) => {
                warn!(topic = %self.name, error = %e, "retention sweep failed");
            }
        }
    }

    /// Cancel every background worker. Called by the registry on deletion.
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
        self.storage.shutdown();
        self.ack.stop();
        self.clients.stop();
        self.delayed.shutdown();
        self.logs.shutdown();
        if let Ok(mut guard) = self.retention_task.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
        info!(topic = %self.name, "topic shut down");
    }
}

/// Capability handle: may publish.
pub struct Producer {
    topic: Arc<Topic>,
    id: u32,
}

impl Producer {
    /// The producer's client id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Publish payloads with per-message results.
    pub async fn publish(
        &self,
        payloads: Vec<Value>,
        opts: &PublishOptions,
    ) -> BrokerResult<Vec<BrokerResult<u32>>> {
        self.topic.publish(self.id, payloads, opts).await
    }
}

/// Capability handle: may consume, ack and nack.
pub struct Consumer {
    topic: Arc<Topic>,
    id: u32,
}

impl Consumer {
    /// The consumer's client id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Dequeue one message.
    pub async fn consume(&self, auto_ack: bool) -> BrokerResult<Option<ConsumedMessage>> {
        self.topic.consume(self.id, auto_ack).await
    }

    /// Acknowledge one delivery, or all pending when `id` is `None`.
    pub async fn ack(&self, id: Option<u32>) -> BrokerResult<Vec<u32>> {
        self.topic.ack(self.id, id).await
    }

    /// Negative-acknowledge one delivery, or all pending when `id` is `None`.
    pub async fn nack(&self, id: Option<u32>, requeue: bool) -> BrokerResult<Vec<u32>> {
        self.topic.nack(self.id, id, requeue).await
    }

    /// Start an abortable poll loop delivering into `handler`.
    pub fn subscribe<F, Fut, E>(
        &self,
        options: SubscriptionOptions,
        handler: F,
        on_error: E,
    ) -> Subscription
    where
        F: FnMut(Value, MessageMetadata) -> Fut + Send + 'static,
        Fut: Future<Output = BrokerResult<()>> + Send,
        E: Fn(BrokerError) + Send + Sync + 'static,
    {
        subscription::spawn(
            Arc::clone(&self.topic),
            self.id,
            options,
            handler,
            on_error,
        )
    }
}

/// Capability handle: may read and replay the DLQ.
pub struct DlqConsumer {
    topic: Arc<Topic>,
    id: u32,
}

impl DlqConsumer {
    /// The dlq-consumer's client id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The consumer's (shared) DLQ reader.
    pub async fn reader(&self) -> BrokerResult<Arc<DlqReader>> {
        self.topic.create_dlq_reader(self.id).await
    }

    /// Replay DLQ entries through a handler.
    pub async fn replay<F, Fut, P>(&self, handler: F, filter: Option<P>) -> BrokerResult<usize>
    where
        F: FnMut(Value, MessageMetadata) -> Fut,
        Fut: Future<Output = BrokerResult<()>>,
        P: Fn(&MessageMetadata, DlqReason) -> bool,
    {
        self.topic.replay_dlq(self.id, handler, filter).await
    }
}
