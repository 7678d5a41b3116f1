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

//! Codec contract and the default binary implementation.

use crate::error::CodecResult;
use crate::metadata::{self, MessageMetadata, MetaField, MetadataPatch};
use serde_json::Value;

/// Codec contract the broker stores and reads messages through.
///
/// ## Design Decisions
/// - **Separate payload and metadata paths**: metadata is re-encoded on every
///   delivery-state change while the payload is write-once
/// - **Partial decode**: `decode_metadata` accepts a field subset so hot
///   readers can skip the variable tail
/// - **Patch without decode**: `update_metadata` rewrites fixed offsets in
///   the encoded block directly
pub trait MessageCodec: Send + Sync {
    /// Encode a payload value into bytes.
    fn encode(&self, payload: &Value) -> CodecResult<Vec<u8>>;

    /// Decode payload bytes back into a value.
    fn decode(&self, bytes: &[u8]) -> CodecResult<Value>;

    /// Encode a metadata record into its binary layout.
    fn encode_metadata(&self, meta: &MessageMetadata) -> CodecResult<Vec<u8>>;

    /// Decode an encoded metadata block, optionally restricted to `fields`.
    fn decode_metadata(
        &self,
        bytes: &[u8],
        fields: Option<&[MetaField]>,
    ) -> CodecResult<MessageMetadata>;

    /// Apply a partial update to an encoded metadata block.
    fn update_metadata(&self, encoded: &[u8], patch: &MetadataPatch) -> CodecResult<Vec<u8>>;
}

/// Default codec: JSON payloads, fixed-offset binary metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

impl BinaryCodec {
    /// Create the default codec.
    pub fn new() -> Self {
        Self
    }
}

impl MessageCodec for BinaryCodec {
    fn encode(&self, payload: &Value) -> CodecResult<Vec<u8>> {
        Ok(serde_json::to_vec(payload)?)
    }

    fn decode(&self, bytes: &[u8]) -> CodecResult<Value> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn encode_metadata(&self, meta: &MessageMetadata) -> CodecResult<Vec<u8>> {
        metadata::encode_metadata(meta)
    }

    fn decode_metadata(
        &self,
        bytes: &[u8],
        fields: Option<&[MetaField]>,
    ) -> CodecResult<MessageMetadata> {
        metadata::decode_metadata(bytes, fields)
    }

    fn update_metadata(&self, encoded: &[u8], patch: &MetadataPatch) -> CodecResult<Vec<u8>> {
        metadata::update_metadata(encoded, patch)
    }
}
