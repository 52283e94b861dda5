// Copyright 2026 Velo Maintainers.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Hash map based in memory blob caches.
//!
//! `MemBlobCache` is a single level for testing. `TieredBlobCache` pairs a
//! small fast level with a large slow one, write-through on put and
//! promoting L2 hits into L1 on read.

use crate::storage::{BlobCache, Candidate, KeyState};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Single-level in-memory blob cache. For testing, not for production use.
pub struct MemBlobCache {
    name: String,
    map: Arc<RwLock<HashMap<String, Bytes>>>,
}

impl MemBlobCache {
    pub fn new(name: impl Into<String>) -> Self {
        MemBlobCache {
            name: name.into(),
            map: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    /// Direct peek for tests.
    pub fn peek(&self, key: &str) -> Option<Bytes> {
        self.map.read().get(key).cloned()
    }
}

#[async_trait]
impl BlobCache for MemBlobCache {
    async fn get(&self, key: &str) -> Vec<Candidate> {
        match self.map.read().get(key) {
            Some(bytes) => vec![Candidate::available(bytes.clone())],
            None => vec![Candidate::not_found()],
        }
    }

    async fn put(&self, key: &str, value: Bytes) {
        self.map.write().insert(key.to_string(), value);
    }

    async fn delete(&self, key: &str) {
        self.map.write().remove(key);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A write-through two-level blob cache.
pub struct TieredBlobCache {
    name: String,
    l1: Arc<dyn BlobCache>,
    l2: Arc<dyn BlobCache>,
}

impl TieredBlobCache {
    pub fn new(l1: Arc<dyn BlobCache>, l2: Arc<dyn BlobCache>) -> Self {
        let name = format!("Tiered({},{})", l1.name(), l2.name());
        TieredBlobCache { name, l1, l2 }
    }
}

#[async_trait]
impl BlobCache for TieredBlobCache {
    async fn get(&self, key: &str) -> Vec<Candidate> {
        let mut candidates = self.l1.get(key).await;
        if candidates
            .first()
            .is_some_and(|c| c.state == KeyState::Available)
        {
            return candidates;
        }
        let l2_candidates = self.l2.get(key).await;
        if let Some(hit) = l2_candidates
            .iter()
            .find(|c| c.state == KeyState::Available)
        {
            // promote so the next lookup stops at L1
            if let Some(bytes) = &hit.bytes {
                self.l1.put(key, bytes.clone()).await;
            }
        }
        candidates.extend(l2_candidates);
        candidates
    }

    async fn put(&self, key: &str, value: Bytes) {
        self.l1.put(key, value.clone()).await;
        self.l2.put(key, value).await;
    }

    async fn delete(&self, key: &str) {
        self.l1.delete(key).await;
        self.l2.delete(key).await;
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mem_cache_round_trip() {
        let cache = MemBlobCache::new("test");
        assert_eq!(cache.get("k").await[0].state, KeyState::NotFound);

        cache.put("k", Bytes::from_static(b"v")).await;
        let candidates = cache.get("k").await;
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].state, KeyState::Available);
        assert_eq!(candidates[0].bytes.as_deref(), Some(&b"v"[..]));

        cache.delete("k").await;
        assert_eq!(cache.get("k").await[0].state, KeyState::NotFound);
    }

    #[tokio::test]
    async fn tiered_probes_both_levels() {
        let l1 = Arc::new(MemBlobCache::new("l1"));
        let l2 = Arc::new(MemBlobCache::new("l2"));
        let tiered = TieredBlobCache::new(l1.clone(), l2.clone());

        // only in L2: miss candidate from L1, hit from L2, then promoted
        l2.put("k", Bytes::from_static(b"v")).await;
        let candidates = tiered.get("k").await;
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].state, KeyState::NotFound);
        assert_eq!(candidates[1].state, KeyState::Available);
        assert!(l1.peek("k").is_some());

        // now a single L1 candidate suffices
        let candidates = tiered.get("k").await;
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].state, KeyState::Available);
    }

    #[tokio::test]
    async fn tiered_write_through_and_delete() {
        let l1 = Arc::new(MemBlobCache::new("l1"));
        let l2 = Arc::new(MemBlobCache::new("l2"));
        let tiered = TieredBlobCache::new(l1.clone(), l2.clone());

        tiered.put("k", Bytes::from_static(b"v")).await;
        assert!(l1.peek("k").is_some());
        assert!(l2.peek("k").is_some());

        tiered.delete("k").await;
        assert!(l1.peek("k").is_none());
        assert!(l2.peek("k").is_none());
    }
}
