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

//! Named-topic directory.

use crate::config::TopicConfig;
use crate::error::{BrokerError, BrokerResult};
use crate::schema::SchemaRegistry;
use crate::topic::Topic;
use relay_keyvalue::{InMemoryKVStore, KeyValueStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Directory of live topics sharing one persistent store and one schema
/// registry.
pub struct TopicRegistry {
    topics: RwLock<HashMap<String, Arc<Topic>>>,
    store: Arc<dyn KeyValueStore>,
    schemas: Arc<SchemaRegistry>,
}

impl TopicRegistry {
    /// Create a registry over a persistent store.
    pub fn new(store: Arc<dyn KeyValueStore>, schemas: Arc<SchemaRegistry>) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            store,
            schemas,
        }
    }

    /// Registry backed by the in-memory store; embedded and test setups.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryKVStore::new()),
            Arc::new(SchemaRegistry::new()),
        )
    }

    /// The shared schema registry.
    pub fn schemas(&self) -> &Arc<SchemaRegistry> {
        &self.schemas
    }

    /// Create a topic. Fails with `AlreadyExists` on a name collision.
    pub async fn create(&self, name: &str, config: TopicConfig) -> BrokerResult<Arc<Topic>> {
        {
            let topics = self.topics.read().await;
            if topics.contains_key(name) {
                return Err(BrokerError::AlreadyExists(format!("topic {}", name)));
            }
        }
        let topic = Topic::new(name, config, Arc::clone(&self.store), &self.schemas).await?;
        let mut topics = self.topics.write().await;
        if topics.contains_key(name) {
            topic.shutdown();
            return Err(BrokerError::AlreadyExists(format!("topic {}", name)));
        }
        topics.insert(name.to_string(), Arc::clone(&topic));
        Ok(topic)
    }

    /// Look up a topic by name.
    pub async fn get(&self, name: &str) -> BrokerResult<Arc<Topic>> {
        self.topics
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| BrokerError::NotFound(format!("topic {}", name)))
    }

    /// Delete a topic, cancelling its background workers.
    pub async fn delete(&self, name: &str) -> BrokerResult<()> {
        let removed = self.topics.write().await.remove(name);
        match removed {
            Some(topic) => {
                topic.shutdown();
                Ok(())
            }
            None => Err(BrokerError::NotFound(format!("topic {}", name))),
        }
    }

    /// Names of live topics, sorted.
    pub async fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.topics.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}
