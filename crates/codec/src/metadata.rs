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

//! Message metadata record and its binary wire layout.
//!
//! ## Layout
//! Fixed-width fields sit at fixed offsets so hot readers (retention sweep,
//! pipeline) can decode `ts`/`ttl`/`ttd`/`attempts` without touching the
//! variable tail. A one-byte flag bitmap after the fixed region marks which
//! optional fields are populated; variable-width UTF-8 fields follow,
//! each with a u16 big-endian length prefix.
//!
//! ```text
//! offset  width  field
//! 0       4      id           u32
//! 4       8      ts           f64 (epoch millis)
//! 12      4      producer_id  u32
//! 16      1      priority
//! 17      4      ttl          (ms)
//! 21      4      ttd          (ms)
//! 25      4      batch_id
//! 29      2      batch_idx
//! 31      2      batch_size
//! 33      1      attempts
//! 34      8      consumed_at  f64 (epoch millis, 0 = unset)
//! 42      1      flags
//! 43..           topic, [correlation_id], [routing_key]
//! ```
//!
//! Absent optional fields keep their zeroed fixed slot; the flag byte is the
//! source of truth for presence.

use crate::error::{CodecError, CodecResult};
use serde::{Deserialize, Serialize};

/// Sentinel for "do not requeue": forces the attempts check to divert the
/// message to the DLQ on its next pipeline pass.
pub const ATTEMPTS_UNBOUNDED: u8 = u8::MAX;

/// Presence flag: `priority` is set.
pub const FLAG_PRIORITY: u8 = 0x01;
/// Presence flag: `ttl` is set.
pub const FLAG_TTL: u8 = 0x02;
/// Presence flag: `ttd` is set.
pub const FLAG_TTD: u8 = 0x04;
/// Presence flag: the batch triplet (`batch_id`, `batch_idx`, `batch_size`) is set.
pub const FLAG_BATCH: u8 = 0x08;
/// Presence flag: `correlation_id` is set.
pub const FLAG_CORRELATION_ID: u8 = 0x10;
/// Presence flag: `routing_key` is set.
pub const FLAG_ROUTING_KEY: u8 = 0x20;

const OFFSET_ID: usize = 0;
const OFFSET_TS: usize = 4;
const OFFSET_PRODUCER_ID: usize = 12;
const OFFSET_PRIORITY: usize = 16;
const OFFSET_TTL: usize = 17;
const OFFSET_TTD: usize = 21;
const OFFSET_BATCH_ID: usize = 25;
const OFFSET_BATCH_IDX: usize = 29;
const OFFSET_BATCH_SIZE: usize = 31;
const OFFSET_ATTEMPTS: usize = 33;
const OFFSET_CONSUMED_AT: usize = 34;
const OFFSET_FLAGS: usize = 42;
const OFFSET_VARIABLE: usize = 43;

/// Metadata fields addressable by partial decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaField {
    /// Message id
    Id,
    /// Creation timestamp (epoch millis)
    Ts,
    /// Producing client id
    ProducerId,
    /// Topic name
    Topic,
    /// Dequeue priority
    Priority,
    /// Time-to-live in ms
    Ttl,
    /// Time-to-delivery in ms
    Ttd,
    /// Batch id
    BatchId,
    /// Index within the batch
    BatchIdx,
    /// Batch size
    BatchSize,
    /// Delivery attempt count
    Attempts,
    /// Completion timestamp
    ConsumedAt,
    /// Consistent-hash routing key
    CorrelationId,
    /// Subscription routing key
    RoutingKey,
}

/// Mutable view of a message's delivery state, alongside its immutable
/// identity fields.
///
/// `size` and `need_acks` are process-local bookkeeping: they are not part of
/// the binary layout. `size` is re-derived from the stored payload and
/// `need_acks` lives in the ack manager's awaited table.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MessageMetadata {
    /// Unique message id, monotonically non-decreasing within a process.
    pub id: u32,
    /// Creation time, epoch millis.
    pub ts: u64,
    /// Id of the producing client.
    pub producer_id: u32,
    /// Topic name, `[A-Za-z0-9_-]+`.
    pub topic: String,
    /// Dequeue priority, 0-255, higher dequeues earlier.
    pub priority: Option<u8>,
    /// Time-to-live in ms; the message expires once `ts + ttl <= now`.
    pub ttl: Option<u32>,
    /// Time-to-delivery in ms; the message is delayed until `ts + ttd`.
    pub ttd: Option<u32>,
    /// Batch id, present when the producer submitted more than one payload.
    pub batch_id: Option<u32>,
    /// Zero-based index within the batch.
    pub batch_idx: u16,
    /// Total number of messages in the batch.
    pub batch_size: u16,
    /// Consistent-hash key pinning the message to a stable consumer.
    pub correlation_id: Option<String>,
    /// Restricts eligible consumers to subscribers of this key.
    pub routing_key: Option<String>,
    /// Delivery attempt count, starting at 1. [`ATTEMPTS_UNBOUNDED`] means
    /// "do not requeue".
    pub attempts: u8,
    /// Set once all awaited acks have arrived, epoch millis.
    pub consumed_at: Option<u64>,
    /// Encoded payload byte length (process-local).
    pub size: u32,
    /// Fan-out count: consumers that must ack before the message is complete
    /// (process-local).
    pub need_acks: u32,
}

impl MessageMetadata {
    /// Create metadata for a freshly published message.
    pub fn new(id: u32, producer_id: u32, topic: impl Into<String>, ts: u64) -> Self {
        Self {
            id,
            ts,
            producer_id,
            topic: topic.into(),
            attempts: 1,
            ..Default::default()
        }
    }

    /// Set dequeue priority.
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Set time-to-live in ms.
    pub fn with_ttl(mut self, ttl_ms: u32) -> Self {
        self.ttl = Some(ttl_ms);
        self
    }

    /// Set time-to-delivery in ms.
    pub fn with_ttd(mut self, ttd_ms: u32) -> Self {
        self.ttd = Some(ttd_ms);
        self
    }

    /// Set the batch triplet.
    pub fn with_batch(mut self, batch_id: u32, batch_idx: u16, batch_size: u16) -> Self {
        self.batch_id = Some(batch_id);
        self.batch_idx = batch_idx;
        self.batch_size = batch_size;
        self
    }

    /// Set the correlation id.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Set the routing key.
    pub fn with_routing_key(mut self, routing_key: impl Into<String>) -> Self {
        self.routing_key = Some(routing_key.into());
        self
    }

    /// Epoch millis at which a delayed message becomes deliverable.
    pub fn ready_ts(&self) -> Option<u64> {
        self.ttd.map(|ttd| self.ts + ttd as u64)
    }

    /// Whether the message has outlived its TTL at `now` (epoch millis).
    pub fn is_expired(&self, now: u64) -> bool {
        match self.ttl {
            Some(ttl) => self.ts + ttl as u64 <= now,
            None => false,
        }
    }
}

/// Partial update applied to an encoded metadata block.
///
/// Only delivery-state fields are patchable; identity fields are immutable
/// once written.
#[derive(Debug, Clone, Default)]
pub struct MetadataPatch {
    /// Replace the attempt counter.
    pub attempts: Option<u8>,
    /// `Some(Some(ts))` sets the completion timestamp, `Some(None)` clears it.
    pub consumed_at: Option<Option<u64>>,
}

impl MetadataPatch {
    /// Patch that bumps attempts to `attempts`.
    pub fn attempts(attempts: u8) -> Self {
        Self {
            attempts: Some(attempts),
            ..Default::default()
        }
    }

    /// Patch that marks the message complete at `ts`.
    pub fn consumed_at(ts: u64) -> Self {
        Self {
            consumed_at: Some(Some(ts)),
            ..Default::default()
        }
    }

    /// Clear the completion timestamp.
    pub fn clear_consumed_at(mut self) -> Self {
        self.consumed_at = Some(None);
        self
    }
}

fn put_var_field(buf: &mut Vec<u8>, field: &'static str, value: &str) -> CodecResult<()> {
    let bytes = value.as_bytes();
    if bytes.len() > u16::MAX as usize {
        return Err(CodecError::FieldTooLong {
            field,
            len: bytes.len(),
        });
    }
    buf.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

fn read_u16(buf: &[u8], offset: usize) -> CodecResult<u16> {
    let end = offset + 2;
    if buf.len() < end {
        return Err(CodecError::Truncated {
            needed: end,
            have: buf.len(),
        });
    }
    Ok(u16::from_be_bytes([buf[offset], buf[offset + 1]]))
}

fn read_u32(buf: &[u8], offset: usize) -> CodecResult<u32> {
    let end = offset + 4;
    if buf.len() < end {
        return Err(CodecError::Truncated {
            needed: end,
            have: buf.len(),
        });
    }
    let mut arr = [0u8; 4];
    arr.copy_from_slice(&buf[offset..end]);
    Ok(u32::from_be_bytes(arr))
}

fn read_f64(buf: &[u8], offset: usize) -> CodecResult<f64> {
    let end = offset + 8;
    if buf.len() < end {
        return Err(CodecError::Truncated {
            needed: end,
            have: buf.len(),
        });
    }
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&buf[offset..end]);
    Ok(f64::from_be_bytes(arr))
}

fn read_u8(buf: &[u8], offset: usize) -> CodecResult<u8> {
    buf.get(offset).copied().ok_or(CodecError::Truncated {
        needed: offset + 1,
        have: buf.len(),
    })
}

fn read_var_field(buf: &[u8], offset: usize, field: &'static str) -> CodecResult<(String, usize)> {
    let len = read_u16(buf, offset)? as usize;
    let start = offset + 2;
    let end = start + len;
    if buf.len() < end {
        return Err(CodecError::Truncated {
            needed: end,
            have: buf.len(),
        });
    }
    let value = std::str::from_utf8(&buf[start..end])
        .map_err(|_| CodecError::InvalidUtf8(field))?
        .to_string();
    Ok((value, end))
}

/// Encode a metadata record into its binary layout.
pub fn encode_metadata(meta: &MessageMetadata) -> CodecResult<Vec<u8>> {
    let mut flags = 0u8;
    if meta.priority.is_some() {
        flags |= FLAG_PRIORITY;
    }
    if meta.ttl.is_some() {
        flags |= FLAG_TTL;
    }
    if meta.ttd.is_some() {
        flags |= FLAG_TTD;
    }
    if meta.batch_id.is_some() {
        flags |= FLAG_BATCH;
    }
    if meta.correlation_id.is_some() {
        flags |= FLAG_CORRELATION_ID;
    }
    if meta.routing_key.is_some() {
        flags |= FLAG_ROUTING_KEY;
    }

    let mut buf = Vec::with_capacity(OFFSET_VARIABLE + 2 + meta.topic.len());
    buf.extend_from_slice(&meta.id.to_be_bytes());
    buf.extend_from_slice(&(meta.ts as f64).to_be_bytes());
    buf.extend_from_slice(&meta.producer_id.to_be_bytes());
    buf.push(meta.priority.unwrap_or(0));
    buf.extend_from_slice(&meta.ttl.unwrap_or(0).to_be_bytes());
    buf.extend_from_slice(&meta.ttd.unwrap_or(0).to_be_bytes());
    buf.extend_from_slice(&meta.batch_id.unwrap_or(0).to_be_bytes());
    buf.extend_from_slice(&meta.batch_idx.to_be_bytes());
    buf.extend_from_slice(&meta.batch_size.to_be_bytes());
    buf.push(meta.attempts);
    buf.extend_from_slice(&(meta.consumed_at.unwrap_or(0) as f64).to_be_bytes());
    buf.push(flags);

    put_var_field(&mut buf, "topic", &meta.topic)?;
    if let Some(ref correlation_id) = meta.correlation_id {
        put_var_field(&mut buf, "correlation_id", correlation_id)?;
    }
    if let Some(ref routing_key) = meta.routing_key {
        put_var_field(&mut buf, "routing_key", routing_key)?;
    }

    Ok(buf)
}

/// Decode a metadata record, optionally restricted to a field subset.
///
/// With `fields` given, only the named fields are read; everything else stays
/// at its default. Fixed-width fields decode straight from their offsets, so
/// a `[Ts, Ttl, Ttd, Attempts]` subset never walks the variable tail.
pub fn decode_metadata(
    buf: &[u8],
    fields: Option<&[MetaField]>,
) -> CodecResult<MessageMetadata> {
    if buf.len() < OFFSET_VARIABLE {
        return Err(CodecError::Truncated {
            needed: OFFSET_VARIABLE,
            have: buf.len(),
        });
    }
    let flags = buf[OFFSET_FLAGS];

    let wants = |field: MetaField| fields.map_or(true, |set| set.contains(&field));
    let mut meta = MessageMetadata::default();

    if wants(MetaField::Id) {
        meta.id = read_u32(buf, OFFSET_ID)?;
    }
    if wants(MetaField::Ts) {
        meta.ts = read_f64(buf, OFFSET_TS)? as u64;
    }
    if wants(MetaField::ProducerId) {
        meta.producer_id = read_u32(buf, OFFSET_PRODUCER_ID)?;
    }
    if wants(MetaField::Priority) && flags & FLAG_PRIORITY != 0 {
        meta.priority = Some(read_u8(buf, OFFSET_PRIORITY)?);
    }
    if wants(MetaField::Ttl) && flags & FLAG_TTL != 0 {
        meta.ttl = Some(read_u32(buf, OFFSET_TTL)?);
    }
    if wants(MetaField::Ttd) && flags & FLAG_TTD != 0 {
        meta.ttd = Some(read_u32(buf, OFFSET_TTD)?);
    }
    if flags & FLAG_BATCH != 0 {
        if wants(MetaField::BatchId) {
            meta.batch_id = Some(read_u32(buf, OFFSET_BATCH_ID)?);
        }
        if wants(MetaField::BatchIdx) {
            meta.batch_idx = read_u16(buf, OFFSET_BATCH_IDX)?;
        }
        if wants(MetaField::BatchSize) {
            meta.batch_size = read_u16(buf, OFFSET_BATCH_SIZE)?;
        }
    }
    if wants(MetaField::Attempts) {
        meta.attempts = read_u8(buf, OFFSET_ATTEMPTS)?;
    }
    if wants(MetaField::ConsumedAt) {
        let raw = read_f64(buf, OFFSET_CONSUMED_AT)?;
        if raw > 0.0 {
            meta.consumed_at = Some(raw as u64);
        }
    }

    // Variable tail: topic is always first; later fields need every earlier
    // length walked even when skipped.
    let needs_correlation = wants(MetaField::CorrelationId) && flags & FLAG_CORRELATION_ID != 0;
    let needs_routing = wants(MetaField::RoutingKey) && flags & FLAG_ROUTING_KEY != 0;
    if wants(MetaField::Topic) || needs_correlation || needs_routing {
        let (topic, mut offset) = read_var_field(buf, OFFSET_VARIABLE, "topic")?;
        if wants(MetaField::Topic) {
            meta.topic = topic;
        }
        if flags & FLAG_CORRELATION_ID != 0 {
            let (correlation_id, next) = read_var_field(buf, offset, "correlation_id")?;
            if needs_correlation {
                meta.correlation_id = Some(correlation_id);
            }
            offset = next;
        }
        if needs_routing {
            let (routing_key, _) = read_var_field(buf, offset, "routing_key")?;
            meta.routing_key = Some(routing_key);
        }
    }

    Ok(meta)
}

/// Apply a [`MetadataPatch`] to an encoded metadata block.
///
/// Patches only touch fixed offsets, so the variable tail is carried over
/// unchanged.
pub fn update_metadata(encoded: &[u8], patch: &MetadataPatch) -> CodecResult<Vec<u8>> {
    if encoded.len() < OFFSET_VARIABLE {
        return Err(CodecError::Truncated {
            needed: OFFSET_VARIABLE,
            have: encoded.len(),
        });
    }
    let mut buf = encoded.to_vec();
    if let Some(attempts) = patch.attempts {
        buf[OFFSET_ATTEMPTS] = attempts;
    }
    if let Some(consumed_at) = patch.consumed_at {
        let raw = (consumed_at.unwrap_or(0) as f64).to_be_bytes();
        buf[OFFSET_CONSUMED_AT..OFFSET_CONSUMED_AT + 8].copy_from_slice(&raw);
    }
    Ok(buf)
}
