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

//! Consistent-hash ring over consumers.
//!
//! Each consumer occupies `replicas` virtual positions hashed from
//! `"<id>-<i>"`. Lookups binary-search the first position at or after the
//! key's hash, wrapping on overflow. The ring is traversable: [`HashRing::walk`]
//! yields every distinct consumer exactly once in ring order, which the
//! router uses to fall back past excluded consumers.
//!
//! The hash is the first 8 bytes of SHA-256, so placement is stable across
//! processes and restarts.

use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

/// Consistent-hash ring mapping correlation ids to consumer ids.
#[derive(Debug, Clone)]
pub struct HashRing {
    replicas: usize,
    hashes: Vec<u64>,
    nodes: HashMap<u64, u32>,
}

impl HashRing {
    /// Create an empty ring with `replicas` virtual positions per consumer.
    pub fn new(replicas: usize) -> Self {
        Self {
            replicas: replicas.max(1),
            hashes: Vec::new(),
            nodes: HashMap::new(),
        }
    }

    fn hash_key(key: &str) -> u64 {
        let digest = Sha256::digest(key.as_bytes());
        let mut arr = [0u8; 8];
        arr.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(arr)
    }

    /// Insert a consumer at its `replicas` virtual positions.
    pub fn add_node(&mut self, id: u32) {
        for i in 0..self.replicas {
            let hash = Self::hash_key(&format!("{}-{}", id, i));
            if self.nodes.insert(hash, id).is_none() {
                if let Err(pos) = self.hashes.binary_search(&hash) {
                    self.hashes.insert(pos, hash);
                }
            }
        }
    }

    /// Remove every virtual position of a consumer. Removal is complete: the
    /// positions are recomputed from the id, never scanned for.
    pub fn remove_node(&mut self, id: u32) {
        for i in 0..self.replicas {
            let hash = Self::hash_key(&format!("{}-{}", id, i));
            if self.nodes.get(&hash) == Some(&id) {
                self.nodes.remove(&hash);
                if let Ok(pos) = self.hashes.binary_search(&hash) {
                    self.hashes.remove(pos);
                }
            }
        }
    }

    /// The consumer owning the first virtual position at or after the key's
    /// hash.
    pub fn node_for(&self, key: &str) -> Option<u32> {
        self.walk(key).next()
    }

    /// Walk the ring from the key's position, yielding each distinct
    /// consumer exactly once in ring order.
    pub fn walk(&self, key: &str) -> RingWalk<'_> {
        let start = if self.hashes.is_empty() {
            0
        } else {
            let target = Self::hash_key(key);
            self.hashes.partition_point(|&h| h < target) % self.hashes.len()
        };
        RingWalk {
            ring: self,
            start,
            step: 0,
            seen: HashSet::new(),
        }
    }

    /// Whether the ring holds no consumers.
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// Number of virtual positions on the ring.
    pub fn virtual_len(&self) -> usize {
        self.hashes.len()
    }
}

/// Single-pass cursor over distinct consumers in ring order.
pub struct RingWalk<'a> {
    ring: &'a HashRing,
    start: usize,
    step: usize,
    seen: HashSet<u32>,
}

impl Iterator for RingWalk<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        let len = self.ring.hashes.len();
        while self.step < len {
            let hash = self.ring.hashes[(self.start + self.step) % len];
            self.step += 1;
            let id = *self.ring.nodes.get(&hash)?;
            if self.seen.insert(id) {
                return Some(id);
            }
        }
        None
    }
}
