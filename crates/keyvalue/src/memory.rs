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

//! In-memory KeyValue store implementation.
//!
//! ## Purpose
//! Provides a BTreeMap-based implementation for testing and single-process
//! scenarios. The ordered map gives `scan_prefix` its key-order guarantee
//! for free.
//!
//! ## Limitations
//! - Not persistent (data lost on restart)
//! - Not distributed (single process only)

use crate::{KVResult, KeyValueStore};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory KeyValue store implementation.
///
/// ## Example
/// ```rust
/// use relay_keyvalue::{KeyValueStore, InMemoryKVStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let kv = InMemoryKVStore::new();
///
/// kv.put("key", b"value".to_vec()).await?;
/// let value = kv.get("key").await?;
/// assert_eq!(value, Some(b"value".to_vec()));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct InMemoryKVStore {
    data: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl InMemoryKVStore {
    /// Create a new in-memory KeyValue store.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Number of keys currently stored.
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    /// Whether the store holds no keys.
    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKVStore {
    async fn get(&self, key: &str) -> KVResult<Option<Vec<u8>>> {
        let data = self.data.read().await;
        Ok(data.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> KVResult<()> {
        let mut data = self.data.write().await;
        data.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> KVResult<()> {
        let mut data = self.data.write().await;
        data.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> KVResult<bool> {
        let data = self.data.read().await;
        Ok(data.contains_key(key))
    }

    async fn scan_prefix(&self, prefix: &str) -> KVResult<Vec<(String, Vec<u8>)>> {
        let data = self.data.read().await;
        let entries = data
            .range::<String, _>((Bound::Included(prefix.to_string()), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Ok(entries)
    }

    async fn count_prefix(&self, prefix: &str) -> KVResult<usize> {
        let data = self.data.read().await;
        let count = data
            .range::<String, _>((Bound::Included(prefix.to_string()), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .count();
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let kv = InMemoryKVStore::new();

        kv.put("a", b"1".to_vec()).await.unwrap();
        assert_eq!(kv.get("a").await.unwrap(), Some(b"1".to_vec()));
        assert!(kv.exists("a").await.unwrap());

        kv.delete("a").await.unwrap();
        assert_eq!(kv.get("a").await.unwrap(), None);
        assert!(!kv.exists("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_scan_prefix_is_ordered_and_scoped() {
        let kv = InMemoryKVStore::new();

        kv.put("orders/2", b"b".to_vec()).await.unwrap();
        kv.put("orders/1", b"a".to_vec()).await.unwrap();
        kv.put("orders/meta/1", b"m".to_vec()).await.unwrap();
        kv.put("payments/1", b"x".to_vec()).await.unwrap();

        let entries = kv.scan_prefix("orders/").await.unwrap();
        let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["orders/1", "orders/2", "orders/meta/1"]);

        assert_eq!(kv.count_prefix("orders/meta/").await.unwrap(), 1);
        assert_eq!(kv.count_prefix("payments/").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_missing_key_is_noop() {
        let kv = InMemoryKVStore::new();
        kv.delete("nope").await.unwrap();
        assert!(kv.is_empty().await);
    }
}
