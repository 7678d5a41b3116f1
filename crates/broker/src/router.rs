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

//! Routing policy glue.
//!
//! Fan-out (no correlation id) targets only *active* consumers; a
//! correlation-id walk considers every registered consumer so stickiness
//! survives a lagging spell. Routing keys narrow the eligible set in both
//! paths: binded consumers win, excluded consumers are skipped.

use crate::client::ClientManager;
use crate::dlq::{DlqManager, DlqReason};
use crate::message::MessageMetadata;
use crate::queue::QueueManager;
use crate::routing::RoutingStrategy;
use std::sync::Arc;
use tracing::debug;

/// Routes messages into consumer queues under the topic's routing policy.
pub struct Router {
    strategy: Arc<RoutingStrategy>,
    queues: Arc<QueueManager>,
    dlq: Arc<DlqManager>,
    clients: Arc<ClientManager>,
}

impl Router {
    /// Wire the router over its collaborators.
    pub fn new(
        strategy: Arc<RoutingStrategy>,
        queues: Arc<QueueManager>,
        dlq: Arc<DlqManager>,
        clients: Arc<ClientManager>,
    ) -> Self {
        Self {
            strategy,
            queues,
            dlq,
            clients,
        }
    }

    /// Route a message, returning the number of queues it entered.
    ///
    /// A message no eligible consumer can receive is dead-lettered with
    /// `no_consumers` and routes to zero queues.
    pub async fn route(&self, meta: &MessageMetadata) -> usize {
        let consumer_count = self.clients.consumer_count().await;
        if consumer_count == 0 {
            self.dlq.publish(meta, DlqReason::NoConsumers).await;
            return 0;
        }

        let entries = self.strategy.get_entries(meta.routing_key.as_deref()).await;
        if entries.excluded.len() == consumer_count {
            self.dlq.publish(meta, DlqReason::NoConsumers).await;
            return 0;
        }

        match meta.correlation_id.as_deref() {
            None => {
                let mut routed = 0;
                for consumer in self.clients.active_consumers().await {
                    if entries.excluded.contains(&consumer) {
                        continue;
                    }
                    if self.queues.enqueue(consumer, meta).await {
                        routed += 1;
                    }
                }
                if routed == 0 {
                    // Consumers are registered but none is eligible right
                    // now (all lagging or inactive); without a queue to
                    // land in, the message would leak
                    self.dlq.publish(meta, DlqReason::NoConsumers).await;
                    return 0;
                }
                debug!(id = meta.id, routed, "fan-out routed");
                routed
            }
            Some(correlation_id) => {
                // Prefer the first binded consumer in ring order; remember
                // the first non-excluded one as fallback.
                let mut fallback = None;
                for consumer in self.strategy.ring_order(correlation_id).await {
                    if entries.binded.contains(&consumer) {
                        if self.queues.enqueue(consumer, meta).await {
                            return 1;
                        }
                        continue;
                    }
                    if fallback.is_none() && !entries.excluded.contains(&consumer) {
                        fallback = Some(consumer);
                    }
                }
                if let Some(consumer) = fallback {
                    if self.queues.enqueue(consumer, meta).await {
                        return 1;
                    }
                }
                self.dlq.publish(meta, DlqReason::NoConsumers).await;
                0
            }
        }
    }
}
