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

//! # Relay Codec
//!
//! ## Purpose
//! Encoding layer for the Relay broker: JSON payload bytes, the fixed-offset
//! binary metadata layout, and the Protobuf envelope messages cross the
//! persistence boundary in.
//!
//! ## Architecture Context
//! The broker's storage keeps *encoded* payloads and metadata so that
//! delivery-state updates and partial reads never pay for a full decode:
//!
//! - [`MessageCodec`]: contract the broker stores and reads through
//! - [`BinaryCodec`]: default implementation (JSON payloads + binary metadata)
//! - [`MessageMetadata`] / [`MetadataPatch`] / [`MetaField`]: the metadata
//!   record, its partial-update form, and its addressable fields
//! - [`PersistedMessage`]: prost envelope written to the key/value store
//!
//! ## Examples
//!
//! ```rust
//! use relay_codec::{BinaryCodec, MessageCodec, MessageMetadata, MetaField};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let codec = BinaryCodec::new();
//! let meta = MessageMetadata::new(1, 7, "orders", 1_700_000_000_000).with_ttl(30_000);
//!
//! let encoded = codec.encode_metadata(&meta)?;
//! let subset = codec.decode_metadata(&encoded, Some(&[MetaField::Ts, MetaField::Ttl]))?;
//! assert_eq!(subset.ttl, Some(30_000));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod codec;
pub mod envelope;
pub mod error;
pub mod metadata;

pub use codec::{BinaryCodec, MessageCodec};
pub use envelope::{PersistedMessage, PersistedMetadata};
pub use error::{CodecError, CodecResult};
pub use metadata::{
    MessageMetadata, MetaField, MetadataPatch, ATTEMPTS_UNBOUNDED, FLAG_BATCH,
    FLAG_CORRELATION_ID, FLAG_PRIORITY, FLAG_ROUTING_KEY, FLAG_TTD, FLAG_TTL,
};
