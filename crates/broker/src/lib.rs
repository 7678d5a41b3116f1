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

//! # Relay Broker
//!
//! ## Purpose
//! An embeddable, in-process message broker organized around named topics.
//! Producers publish into a topic; the topic fans messages out to consumers
//! under a routing policy, tracks per-consumer acknowledgement state, retries
//! undeliverable or failed messages, enforces time-to-live and
//! delivery-attempt limits, and exposes a dead-letter queue for messages that
//! cannot be delivered.
//!
//! ## Architecture Context
//! A topic composes the broker's subsystems:
//!
//! ```text
//! Producer ──▶ Topic.publish ──▶ MessageStorage ──▶ Pipeline ──▶ Router
//!                                                      │            │
//!                                          DelayedQueue┘   per-consumer
//!                                                          PriorityQueues
//!                                                               │
//! Consumer ◀── Topic.consume ◀──────────────────────────────────┘
//!     │
//!     └─ ack / nack ──▶ AckManager ──▶ requeue │ DLQ │ mark consumed
//! ```
//!
//! ## Key Components
//! - [`Topic`]: single-topic façade and client factories
//! - [`TopicRegistry`]: named-topic directory
//! - [`Producer`] / [`Consumer`] / [`DlqConsumer`]: capability handles
//! - [`MessageStorage`]: buffered write-through store
//! - [`MessagePipeline`]: expiration / delay / attempts chain
//! - [`Router`] + [`RoutingStrategy`] + [`HashRing`]: routing policy
//! - [`AckManager`]: pending deliveries, ack timeouts, awaited-ack counts
//! - [`DlqManager`]: dead-letter queue with reader and replay
//! - [`SchemaRegistry`]: payload validators by schema name
//!
//! ## Delivery semantics
//! At-least-once with idempotent-ack duplicate protection. Messages published
//! by one producer route in publish order; within one consumer, higher
//! priority dequeues first and equal priorities preserve FIFO.
//!
//! ## Examples
//!
//! ```rust
//! use relay_broker::{PublishOptions, TopicConfig, TopicRegistry};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = TopicRegistry::in_memory();
//! let topic = registry.create("orders", TopicConfig::default()).await?;
//!
//! let consumer = topic.create_consumer(Default::default()).await;
//! let producer = topic.create_producer().await;
//!
//! producer
//!     .publish(vec![json!({"order": 17})], &PublishOptions::new())
//!     .await?;
//!
//! if let Some(message) = consumer.consume(false).await? {
//!     // ... handle the payload ...
//!     consumer.ack(Some(message.metadata.id)).await?;
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ack;
pub mod client;
pub mod config;
pub mod delayed;
pub mod dlq;
pub mod error;
pub mod logging;
pub mod message;
pub mod metrics;
pub mod pipeline;
pub mod queue;
pub mod registry;
pub mod ring;
pub mod router;
pub mod routing;
pub mod schema;
pub mod storage;
pub mod subscription;
pub mod topic;

pub use ack::AckManager;
pub use client::{ClientActivity, ClientInfo, ClientManager, ClientStatus, ClientType};
pub use config::TopicConfig;
pub use delayed::DelayedQueueManager;
pub use dlq::{DlqManager, DlqMessage, DlqReader, DlqReason};
pub use error::{BrokerError, BrokerResult};
pub use logging::{LogLevel, LogRecord, LogService, LogSink, TracingSink};
pub use message::{
    validate_topic_name, MessageMetadata, MetaField, MetadataPatch, ATTEMPTS_UNBOUNDED,
};
pub use metrics::{MetricsCollector, MetricsSnapshot};
pub use pipeline::{
    AttemptsProcessor, DelayProcessor, ExpirationProcessor, MessagePipeline, Processor,
};
pub use queue::QueueManager;
pub use registry::TopicRegistry;
pub use ring::HashRing;
pub use router::Router;
pub use routing::{RoutingEntries, RoutingStrategy};
pub use schema::{CompiledSchema, SchemaRegistry, SchemaValidator};
pub use storage::{MessageStorage, RetentionSweep};
pub use subscription::{Subscription, SubscriptionOptions};
pub use topic::{
    ConsumedMessage, Consumer, ConsumerOptions, DlqConsumer, Producer, PublishOptions, Topic,
    TopicStats,
};
