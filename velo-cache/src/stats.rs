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

//! Lock-free statistics for the cache and its collaborators. The counters
//! are passed in explicitly at construction; nothing here is global.

use std::sync::atomic::{AtomicI64, Ordering};

/// A single monotonically increasing statistic.
#[derive(Debug, Default)]
pub struct Counter(AtomicI64);

impl Counter {
    pub fn add(&self, delta: i64) {
        self.0.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Counters exported by [crate::HttpCache].
#[derive(Debug, Default)]
pub struct HttpCacheStats {
    pub cache_time_us: Counter,
    pub cache_hits: Counter,
    pub cache_misses: Counter,
    pub cache_backend_hits: Counter,
    pub cache_backend_misses: Counter,
    pub cache_fallbacks: Counter,
    pub cache_expirations: Counter,
    pub cache_inserts: Counter,
    pub cache_deletes: Counter,
}

impl HttpCacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// (name, value) pairs for scraping.
    pub fn snapshot(&self) -> Vec<(&'static str, i64)> {
        vec![
            ("cache_time_us", self.cache_time_us.get()),
            ("cache_hits", self.cache_hits.get()),
            ("cache_misses", self.cache_misses.get()),
            ("cache_backend_hits", self.cache_backend_hits.get()),
            ("cache_backend_misses", self.cache_backend_misses.get()),
            ("cache_fallbacks", self.cache_fallbacks.get()),
            ("cache_expirations", self.cache_expirations.get()),
            ("cache_inserts", self.cache_inserts.get()),
            ("cache_deletes", self.cache_deletes.get()),
        ]
    }
}

/// Counters exported by the in-place recorder.
#[derive(Debug, Default)]
pub struct RecorderStats {
    pub num_resources: Counter,
    pub num_inserted_into_cache: Counter,
    pub num_not_cacheable: Counter,
    pub num_failed: Counter,
    pub num_dropped_due_to_load: Counter,
    pub num_dropped_due_to_size: Counter,
}

impl RecorderStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<(&'static str, i64)> {
        vec![
            ("ipro_recorder_resources", self.num_resources.get()),
            (
                "ipro_recorder_inserted_into_cache",
                self.num_inserted_into_cache.get(),
            ),
            ("ipro_recorder_not_cacheable", self.num_not_cacheable.get()),
            ("ipro_recorder_failed", self.num_failed.get()),
            (
                "ipro_recorder_dropped_due_to_load",
                self.num_dropped_due_to_load.get(),
            ),
            (
                "ipro_recorder_dropped_due_to_size",
                self.num_dropped_due_to_size.get(),
            ),
        ]
    }
}

/// Counters exported by the fetch decorators.
#[derive(Debug, Default)]
pub struct FetchStats {
    pub fallback_responses_served: Counter,
    pub num_conditional_refreshes: Counter,
}

impl FetchStats {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Per-request cache latency observations. Level 1 is the fastest tier.
#[derive(Debug, Default)]
pub struct TimingInfo {
    http_cache_latency_ms: Option<i64>,
    l2_http_cache_latency_ms: Option<i64>,
}

impl TimingInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_http_cache_latency_ms(&mut self, latency_ms: i64) {
        self.http_cache_latency_ms = Some(latency_ms);
    }

    pub fn set_l2_http_cache_latency_ms(&mut self, latency_ms: i64) {
        self.l2_http_cache_latency_ms = Some(latency_ms);
    }

    pub fn http_cache_latency_ms(&self) -> Option<i64> {
        self.http_cache_latency_ms
    }

    pub fn l2_http_cache_latency_ms(&self) -> Option<i64> {
        self.l2_http_cache_latency_ms
    }

    /// Record a latency observation for the given cache level (1-based).
    pub fn report_latency_ms(&mut self, cache_level: u32, latency_ms: i64) {
        match cache_level {
            1 => self.set_http_cache_latency_ms(latency_ms),
            2 => self.set_l2_http_cache_latency_ms(latency_ms),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = HttpCacheStats::new();
        stats.cache_hits.add(1);
        stats.cache_hits.add(2);
        assert_eq!(stats.cache_hits.get(), 3);
        let snapshot = stats.snapshot();
        assert!(snapshot.contains(&("cache_hits", 3)));
        assert!(snapshot.contains(&("cache_misses", 0)));
    }

    #[test]
    fn timing_levels() {
        let mut timing = TimingInfo::new();
        timing.report_latency_ms(1, 5);
        timing.report_latency_ms(2, 9);
        timing.report_latency_ms(3, 100); // ignored
        assert_eq!(timing.http_cache_latency_ms(), Some(5));
        assert_eq!(timing.l2_http_cache_latency_ms(), Some(9));
    }
}
