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

//! Protobuf persistence envelope.
//!
//! ## Purpose
//! Messages cross the persistence boundary as a Protobuf envelope so other
//! processes (and other languages) can read a Relay store. The in-memory
//! metadata record translates to and from [`PersistedMetadata`] here; the
//! fixed-offset binary layout in [`crate::metadata`] stays an in-process
//! concern.

use crate::error::CodecResult;
use crate::metadata::{MessageMetadata, ATTEMPTS_UNBOUNDED};
use prost::Message as ProstMessage;

/// Metadata as persisted in the envelope.
#[derive(Clone, PartialEq, prost::Message)]
pub struct PersistedMetadata {
    /// Message id.
    #[prost(uint32, tag = "1")]
    pub id: u32,
    /// Creation time, epoch millis.
    #[prost(double, tag = "2")]
    pub ts: f64,
    /// Producing client id.
    #[prost(uint32, tag = "3")]
    pub producer_id: u32,
    /// Topic name.
    #[prost(string, tag = "4")]
    pub topic: String,
    /// Dequeue priority.
    #[prost(uint32, optional, tag = "5")]
    pub priority: Option<u32>,
    /// Time-to-live in ms.
    #[prost(uint32, optional, tag = "6")]
    pub ttl: Option<u32>,
    /// Time-to-delivery in ms.
    #[prost(uint32, optional, tag = "7")]
    pub ttd: Option<u32>,
    /// Batch id.
    #[prost(uint32, optional, tag = "8")]
    pub batch_id: Option<u32>,
    /// Index within the batch.
    #[prost(uint32, tag = "9")]
    pub batch_idx: u32,
    /// Batch size.
    #[prost(uint32, tag = "10")]
    pub batch_size: u32,
    /// Consistent-hash routing key.
    #[prost(string, optional, tag = "11")]
    pub correlation_id: Option<String>,
    /// Subscription routing key.
    #[prost(string, optional, tag = "12")]
    pub routing_key: Option<String>,
    /// Delivery attempt count.
    #[prost(uint32, tag = "13")]
    pub attempts: u32,
    /// Completion timestamp, epoch millis.
    #[prost(double, optional, tag = "14")]
    pub consumed_at: Option<f64>,
}

/// Persisted message: payload bytes plus a metadata snapshot.
#[derive(Clone, PartialEq, prost::Message)]
pub struct PersistedMessage {
    /// Encoded payload bytes.
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
    /// Metadata snapshot at flush time.
    #[prost(message, optional, tag = "2")]
    pub metadata: Option<PersistedMetadata>,
}

impl PersistedMessage {
    /// Build an envelope from payload bytes and a metadata record.
    pub fn new(data: Vec<u8>, meta: &MessageMetadata) -> Self {
        Self {
            data,
            metadata: Some(PersistedMetadata::from(meta)),
        }
    }

    /// Serialize the envelope for the key/value store.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    /// Deserialize an envelope read back from the key/value store.
    pub fn from_bytes(bytes: &[u8]) -> CodecResult<Self> {
        Ok(Self::decode(bytes)?)
    }
}

impl From<&MessageMetadata> for PersistedMetadata {
    fn from(meta: &MessageMetadata) -> Self {
        Self {
            id: meta.id,
            ts: meta.ts as f64,
            producer_id: meta.producer_id,
            topic: meta.topic.clone(),
            priority: meta.priority.map(u32::from),
            ttl: meta.ttl,
            ttd: meta.ttd,
            batch_id: meta.batch_id,
            batch_idx: u32::from(meta.batch_idx),
            batch_size: u32::from(meta.batch_size),
            correlation_id: meta.correlation_id.clone(),
            routing_key: meta.routing_key.clone(),
            attempts: u32::from(meta.attempts),
            consumed_at: meta.consumed_at.map(|ts| ts as f64),
        }
    }
}

impl From<&PersistedMetadata> for MessageMetadata {
    fn from(persisted: &PersistedMetadata) -> Self {
        Self {
            id: persisted.id,
            ts: persisted.ts as u64,
            producer_id: persisted.producer_id,
            topic: persisted.topic.clone(),
            priority: persisted.priority.map(|p| p.min(u32::from(u8::MAX)) as u8),
            ttl: persisted.ttl,
            ttd: persisted.ttd,
            batch_id: persisted.batch_id,
            batch_idx: persisted.batch_idx as u16,
            batch_size: persisted.batch_size as u16,
            correlation_id: persisted.correlation_id.clone(),
            routing_key: persisted.routing_key.clone(),
            attempts: persisted.attempts.min(u32::from(ATTEMPTS_UNBOUNDED)) as u8,
            consumed_at: persisted.consumed_at.map(|ts| ts as u64),
            size: 0,
            need_acks: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_roundtrip() {
        let meta = MessageMetadata::new(9, 2, "orders", 1_700_000_000_000)
            .with_priority(3)
            .with_correlation_id("user-1");
        let envelope = PersistedMessage::new(b"{\"a\":1}".to_vec(), &meta);

        let bytes = envelope.to_bytes();
        let decoded = PersistedMessage::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.data, b"{\"a\":1}");

        let restored = MessageMetadata::from(decoded.metadata.as_ref().unwrap());
        assert_eq!(restored.id, 9);
        assert_eq!(restored.topic, "orders");
        assert_eq!(restored.priority, Some(3));
        assert_eq!(restored.correlation_id.as_deref(), Some("user-1"));
        assert_eq!(restored.attempts, 1);
    }
}
