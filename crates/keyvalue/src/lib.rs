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

//! # Relay KeyValue Store
//!
//! ## Purpose
//! Provides the persistent key/value storage contract the Relay broker flushes
//! messages and metadata into, plus an in-memory reference backend for tests
//! and embedded single-process deployments.
//!
//! ## Architecture Context
//! The broker's `MessageStorage` buffers writes in memory and periodically
//! drains them into a [`KeyValueStore`]:
//!
//! - **Messages**: `"<topic>/<id>"` → encoded message envelope
//! - **Metadata**: `"<topic>/meta/<id>"` → encoded metadata block
//!
//! Keys are ordered, so prefix scans (`"orders/meta/"`) drive the retention
//! sweep and DLQ bookkeeping without loading unrelated topics.
//!
//! ## Key Components
//! - [`KeyValueStore`]: Main trait defining all operations
//! - [`InMemoryKVStore`]: BTreeMap-based implementation for testing
//! - [`KVError`]: Error types for all operations
//!
//! ## Examples
//!
//! ```rust
//! use relay_keyvalue::{KeyValueStore, InMemoryKVStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let kv = InMemoryKVStore::new();
//!
//! kv.put("orders/1", b"payload".to_vec()).await?;
//! let value = kv.get("orders/1").await?;
//! assert_eq!(value, Some(b"payload".to_vec()));
//!
//! kv.delete("orders/1").await?;
//! assert!(!kv.exists("orders/1").await?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Backend Support
//! Only the in-memory backend ships with the workspace; disk or distributed
//! backends are external collaborators implementing the same trait.

#![warn(missing_docs)]
#![warn(clippy::all)]

use async_trait::async_trait;

pub mod error;
pub mod memory;

pub use error::{KVError, KVResult};
pub use memory::InMemoryKVStore;

/// KeyValue store trait defining all operations.
///
/// ## Design Decisions
/// - **Non-destructive reads**: `get()` does not remove the value
/// - **Ordered keys**: `scan_prefix()` returns entries in key order, which the
///   broker relies on for range iteration over a topic's persisted messages
/// - **Byte values**: callers own encoding; the store never inspects values
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get value by key (non-destructive read).
    ///
    /// ## Returns
    /// - `Ok(Some(value))` if key exists
    /// - `Ok(None)` if key does not exist
    /// - `Err(...)` on storage failure
    async fn get(&self, key: &str) -> KVResult<Option<Vec<u8>>>;

    /// Store a value under a key, replacing any previous value.
    async fn put(&self, key: &str, value: Vec<u8>) -> KVResult<()>;

    /// Delete a key. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> KVResult<()>;

    /// Check whether a key exists.
    async fn exists(&self, key: &str) -> KVResult<bool>;

    /// Return all `(key, value)` pairs whose key starts with `prefix`,
    /// in ascending key order.
    async fn scan_prefix(&self, prefix: &str) -> KVResult<Vec<(String, Vec<u8>)>>;

    /// Count keys under a prefix.
    async fn count_prefix(&self, prefix: &str) -> KVResult<usize> {
        Ok(self.scan_prefix(prefix).await?.len())
    }
}
