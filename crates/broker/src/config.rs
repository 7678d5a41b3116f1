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

//! Topic configuration.

use serde::{Deserialize, Serialize};

fn default_persist() -> bool {
    true
}

fn default_persist_threshold_ms() -> u64 {
    100
}

fn default_retention_ms() -> u64 {
    86_400_000
}

fn default_archival_threshold_ms() -> u64 {
    100_000
}

fn default_ack_timeout_ms() -> u64 {
    30_000
}

fn default_inactivity_threshold_ms() -> u64 {
    600_000
}

fn default_chunk_size() -> usize {
    64
}

fn default_ring_replicas() -> usize {
    3
}

/// Per-topic configuration.
///
/// All thresholds are milliseconds unless noted. Defaults match a broker
/// tuned for small embedded deployments; override per topic at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicConfig {
    /// Name of a registered schema payloads must validate against.
    pub schema: Option<String>,

    /// Whether the storage buffer drains to the persistent store.
    pub persist: bool,

    /// Coalescing window for the deferred storage flush.
    pub persist_threshold_ms: u64,

    /// Persisted entries older than this without being consumed are
    /// dead-lettered; consumed entries are removed.
    pub retention_ms: u64,

    /// Period of the retention sweep.
    pub archival_threshold_ms: u64,

    /// Admission cap on cumulative published bytes. The counter is never
    /// decremented on consume, so this bounds lifetime throughput, not
    /// outstanding bytes.
    pub max_size_bytes: Option<u64>,

    /// Deliveries beyond this count divert the message to the DLQ.
    /// Unset disables the attempts check entirely.
    pub max_delivery_attempts: Option<u8>,

    /// Per-message encoded payload size cap, bytes.
    pub max_message_size: Option<usize>,

    /// Upper bound on the consume-to-ack interval before the broker nacks
    /// the delivery itself.
    pub ack_timeout_ms: u64,

    /// Consumers inactive longer than this are dropped from the fan-out set.
    pub consumer_inactivity_threshold_ms: u64,

    /// Average processing time above which a consumer stops receiving
    /// fan-out traffic.
    pub consumer_processing_time_threshold_ms: Option<u64>,

    /// Pending-delivery balance above which a consumer stops receiving
    /// fan-out traffic.
    pub consumer_pending_threshold: Option<u64>,

    /// Storage flush chunk size, entries per tick.
    pub chunk_size: usize,

    /// Virtual nodes per consumer on the consistent-hash ring.
    pub ring_replicas: usize,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            schema: None,
            persist: default_persist(),
            persist_threshold_ms: default_persist_threshold_ms(),
            retention_ms: default_retention_ms(),
            archival_threshold_ms: default_archival_threshold_ms(),
            max_size_bytes: None,
            max_delivery_attempts: None,
            max_message_size: None,
            ack_timeout_ms: default_ack_timeout_ms(),
            consumer_inactivity_threshold_ms: default_inactivity_threshold_ms(),
            consumer_processing_time_threshold_ms: None,
            consumer_pending_threshold: None,
            chunk_size: default_chunk_size(),
            ring_replicas: default_ring_replicas(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TopicConfig::default();
        assert!(config.persist);
        assert_eq!(config.persist_threshold_ms, 100);
        assert_eq!(config.retention_ms, 86_400_000);
        assert_eq!(config.ack_timeout_ms, 30_000);
        assert_eq!(config.consumer_inactivity_threshold_ms, 600_000);
        assert_eq!(config.ring_replicas, 3);
        assert!(config.max_delivery_attempts.is_none());
    }

    #[test]
    fn test_partial_deserialization_fills_defaults() {
        let config: TopicConfig = serde_json::from_str(r#"{"ack_timeout_ms": 50}"#).unwrap();
        assert_eq!(config.ack_timeout_ms, 50);
        assert!(config.persist);
        assert_eq!(config.retention_ms, 86_400_000);
    }
}
