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

//! Routing strategy: consistent hashing plus routing-key filtering.
//!
//! For a given routing key a consumer is *binded* when its subscription set
//! contains exactly that key, *excluded* when it has any subscription but is
//! not binded. Consumers with no subscription are neither: they receive all
//! traffic. The `(binded, excluded)` pair is memoized per routing key and the
//! cache is flushed whenever membership or subscriptions change.

use crate::ring::HashRing;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

/// Eligibility sets for one routing key.
#[derive(Debug, Clone, Default)]
pub struct RoutingEntries {
    /// Consumers subscribed to exactly this routing key.
    pub binded: HashSet<u32>,
    /// Consumers with some subscription that does not match.
    pub excluded: HashSet<u32>,
}

/// Consistent-hash ring layered with routing-key subscriptions.
pub struct RoutingStrategy {
    ring: RwLock<HashRing>,
    subscriptions: RwLock<HashMap<u32, HashSet<String>>>,
    cache: RwLock<HashMap<Option<String>, RoutingEntries>>,
}

impl RoutingStrategy {
    /// Create a strategy whose ring uses `replicas` virtual positions per
    /// consumer.
    pub fn new(replicas: usize) -> Self {
        Self {
            ring: RwLock::new(HashRing::new(replicas)),
            subscriptions: RwLock::new(HashMap::new()),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Add a consumer to the ring, optionally with routing-key subscriptions.
    pub async fn add_entry(&self, consumer_id: u32, routing_keys: Option<Vec<String>>) {
        self.ring.write().await.add_node(consumer_id);
        if let Some(keys) = routing_keys {
            if !keys.is_empty() {
                self.subscriptions
                    .write()
                    .await
                    .insert(consumer_id, keys.into_iter().collect());
            }
        }
        self.cache.write().await.clear();
    }

    /// Remove a consumer from the ring and drop its subscriptions.
    pub async fn remove_entry(&self, consumer_id: u32) {
        self.ring.write().await.remove_node(consumer_id);
        self.subscriptions.write().await.remove(&consumer_id);
        self.cache.write().await.clear();
    }

    /// Compute (memoized) the `(binded, excluded)` sets for a routing key.
    pub async fn get_entries(&self, routing_key: Option<&str>) -> RoutingEntries {
        let cache_key = routing_key.map(str::to_string);
        if let Some(entries) = self.cache.read().await.get(&cache_key) {
            return entries.clone();
        }

        let subscriptions = self.subscriptions.read().await;
        let mut entries = RoutingEntries::default();
        for (id, keys) in subscriptions.iter() {
            match routing_key {
                Some(key) if keys.contains(key) => {
                    entries.binded.insert(*id);
                }
                _ => {
                    entries.excluded.insert(*id);
                }
            }
        }
        drop(subscriptions);

        self.cache
            .write()
            .await
            .insert(cache_key, entries.clone());
        entries
    }

    /// The stable consumer for a correlation id.
    pub async fn get_correlated_entry(&self, correlation_id: &str) -> Option<u32> {
        self.ring.read().await.node_for(correlation_id)
    }

    /// Distinct consumers in ring order starting at the correlation id's
    /// position.
    pub async fn ring_order(&self, correlation_id: &str) -> Vec<u32> {
        self.ring.read().await.walk(correlation_id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_binded_and_excluded_sets() {
        let strategy = RoutingStrategy::new(3);
        strategy.add_entry(1, Some(vec!["red".to_string()])).await;
        strategy.add_entry(2, Some(vec!["blue".to_string()])).await;
        strategy.add_entry(3, None).await;

        let entries = strategy.get_entries(Some("red")).await;
        assert!(entries.binded.contains(&1));
        assert!(entries.excluded.contains(&2));
        // No subscription: neither binded nor excluded
        assert!(!entries.binded.contains(&3));
        assert!(!entries.excluded.contains(&3));
    }

    #[tokio::test]
    async fn test_no_routing_key_excludes_all_subscribers() {
        let strategy = RoutingStrategy::new(3);
        strategy.add_entry(1, Some(vec!["red".to_string()])).await;
        strategy.add_entry(2, None).await;

        let entries = strategy.get_entries(None).await;
        assert!(entries.binded.is_empty());
        assert!(entries.excluded.contains(&1));
        assert!(!entries.excluded.contains(&2));
    }

    #[tokio::test]
    async fn test_cache_flushed_on_subscription_change() {
        let strategy = RoutingStrategy::new(3);
        strategy.add_entry(1, Some(vec!["red".to_string()])).await;

        let before = strategy.get_entries(Some("red")).await;
        assert_eq!(before.binded.len(), 1);

        strategy.add_entry(2, Some(vec!["red".to_string()])).await;
        let after = strategy.get_entries(Some("red")).await;
        assert_eq!(after.binded.len(), 2);
    }

    #[tokio::test]
    async fn test_correlated_entry_survives_unrelated_removal() {
        let strategy = RoutingStrategy::new(3);
        for id in 1..=3 {
            strategy.add_entry(id, None).await;
        }
        let owner = strategy.get_correlated_entry("user-1").await.unwrap();

        // Removing a different consumer must not move the key
        let other = (1..=3).find(|id| *id != owner).unwrap();
        strategy.remove_entry(other).await;
        assert_eq!(strategy.get_correlated_entry("user-1").await, Some(owner));
    }
}
