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

//! The HTTP caching layer of the velo rewriting proxy.
//!
//! [HttpCache] implements HTTP caching semantics over a byte-level
//! [storage::BlobCache]: keyed lookup with per-candidate validation,
//! insertion with header normalization and optional gzip, stale fallback
//! extraction, and short-TTL memoization of fetch failures. The cache is
//! fragmented by a caller-chosen namespace (typically the Host header) so
//! mutually untrusting sites sharing one deployment cannot poison each
//! other's entries.

#![allow(clippy::new_without_default)]

pub mod compression;
pub mod conditional;
pub mod failure;
pub mod fallback;
pub mod fetch;
pub mod inflate;
pub mod key;
pub mod memory;
pub mod recorder;
pub mod stats;
pub mod storage;
pub mod timer;
pub mod value;

pub use conditional::ConditionalFetch;
pub use failure::{FailurePolicy, FetchResponseStatus};
pub use fallback::FallbackFetch;
pub use fetch::AsyncFetch;
pub use inflate::InflatingFetch;
pub use key::{CacheKey, Hasher};
pub use memory::MemBlobCache;
pub use recorder::InPlaceRecorder;
pub use stats::{HttpCacheStats, TimingInfo};
pub use storage::{BlobCache, KeyState};
pub use timer::Timer;
pub use value::HttpValue;

use crate::failure::{
    decode_failure_caching_status, encode_failure_caching_status, is_failure_caching_status,
};
use log::info;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, Ordering};
use std::sync::Arc;
use velo_http::names;
use velo_http::names::status;
use velo_http::{
    url, HttpOptions, RequestProperties, ResponseHeaders, ValidatorOption, VaryOption,
};

// Increment to flush the entire HTTP cache: the version participates in
// every composite key.
const HTTP_CACHE_VERSION: i32 = 3;

// -1 means no response size limit.
const CACHE_SIZE_UNLIMITED: i64 = -1;

/// Every etag this cache synthesizes starts with this prefix, so they can be
/// told apart from origin etags.
pub const ETAG_PREFIX: &str = "W/\"PSA-";

/// Format a content hash as a synthesized weak etag.
pub fn format_etag(hash: &str) -> String {
    format!("{}{}\"", ETAG_PREFIX, hash)
}

/// The classification of a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindStatus {
    Found,
    NotFound,
    RecentFailure,
}

/// What a lookup concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FindResult {
    pub status: FindStatus,
    /// `NotSet` when status is NotFound, `Ok` when Found, and the remembered
    /// failure kind when status is RecentFailure.
    pub failure: FetchResponseStatus,
}

impl FindResult {
    pub fn not_found() -> Self {
        FindResult {
            status: FindStatus::NotFound,
            failure: FetchResponseStatus::NotSet,
        }
    }

    pub fn found() -> Self {
        FindResult {
            status: FindStatus::Found,
            failure: FetchResponseStatus::Ok,
        }
    }

    pub fn recent_failure(kind: FetchResponseStatus) -> Self {
        FindResult {
            status: FindStatus::RecentFailure,
            failure: kind,
        }
    }
}

/// Everything a lookup delivers. On `Found` the value and headers are
/// filled; an expired-but-usable entry rides along in
/// `fallback_http_value` even when the result is `NotFound`.
#[derive(Debug)]
pub struct FindOutcome {
    pub result: FindResult,
    pub http_value: HttpValue,
    pub fallback_http_value: Option<HttpValue>,
    pub headers: Option<ResponseHeaders>,
}

impl FindOutcome {
    fn new() -> Self {
        FindOutcome {
            result: FindResult::not_found(),
            http_value: HttpValue::new(),
            fallback_http_value: None,
            headers: None,
        }
    }
}

/// Caller-side hooks for one lookup: request facts, invalidation policy,
/// freshness policy and latency reporting.
pub trait FindContext: Send {
    fn req_properties(&self) -> RequestProperties;

    fn respect_vary_on_resources(&self) -> VaryOption;

    /// Whether the requesting client can accept a gzipped body.
    fn accepts_gzip(&self) -> bool {
        true
    }

    /// Further invalidation semantics on otherwise valid entries (e.g.
    /// admin flushes). There is no way to resurrect an entry HTTP semantics
    /// already expired.
    fn is_cache_valid(&self, _key: &str, _headers: &ResponseHeaders) -> bool {
        true
    }

    /// Whether the valid entry is fresh *enough*, e.g. for freshening
    /// lookups that want plenty of remaining lifetime.
    fn is_fresh(&self, _headers: &ResponseHeaders) -> bool {
        true
    }

    /// Override the stored TTL. Values <= 0 mean no override; an override
    /// never lowers the stored TTL.
    fn override_cache_ttl_ms(&self, _key: &str) -> i64 {
        -1
    }

    /// Latency observation for each cache level probed (1-based).
    fn report_latency_ms(&mut self, _cache_level: u32, _latency_ms: i64) {}
}

/// A straightforward [FindContext] carrying request facts and a
/// [TimingInfo].
pub struct BasicFindContext {
    pub req_properties: RequestProperties,
    pub respect_vary: VaryOption,
    pub accepts_gzip: bool,
    pub is_background: bool,
    pub timing: TimingInfo,
}

impl BasicFindContext {
    pub fn new(req_properties: RequestProperties, respect_vary: VaryOption) -> Self {
        BasicFindContext {
            req_properties,
            respect_vary,
            accepts_gzip: true,
            is_background: false,
            timing: TimingInfo::new(),
        }
    }
}

impl FindContext for BasicFindContext {
    fn req_properties(&self) -> RequestProperties {
        self.req_properties
    }

    fn respect_vary_on_resources(&self) -> VaryOption {
        self.respect_vary
    }

    fn accepts_gzip(&self) -> bool {
        self.accepts_gzip
    }

    fn report_latency_ms(&mut self, cache_level: u32, latency_ms: i64) {
        if !self.is_background {
            self.timing.report_latency_ms(cache_level, latency_ms);
        }
    }
}

/// HTTP caching semantics over a blob cache: expiration, validation,
/// retention of the originally served headers, and failure memoization.
pub struct HttpCache {
    cache: Arc<dyn BlobCache>,
    timer: Arc<dyn Timer>,
    hasher: Arc<dyn Hasher>,
    stats: Arc<HttpCacheStats>,
    name: String,
    force_caching: AtomicBool,
    disable_html_caching_on_https: AtomicBool,
    ignore_failure_puts: AtomicBool,
    max_cacheable_response_content_length: AtomicI64,
    compression_level: AtomicI32,
    cache_levels: AtomicI32,
    version: AtomicI32,
    failure_policy: RwLock<FailurePolicy>,
}

impl HttpCache {
    pub fn new(
        cache: Arc<dyn BlobCache>,
        timer: Arc<dyn Timer>,
        hasher: Arc<dyn Hasher>,
        stats: Arc<HttpCacheStats>,
    ) -> Self {
        let name = Self::format_name(cache.name());
        HttpCache {
            cache,
            timer,
            hasher,
            stats,
            name,
            force_caching: AtomicBool::new(false),
            disable_html_caching_on_https: AtomicBool::new(false),
            ignore_failure_puts: AtomicBool::new(false),
            max_cacheable_response_content_length: AtomicI64::new(CACHE_SIZE_UNLIMITED),
            compression_level: AtomicI32::new(0),
            cache_levels: AtomicI32::new(1),
            version: AtomicI32::new(HTTP_CACHE_VERSION),
            failure_policy: RwLock::new(FailurePolicy::default()),
        }
    }

    pub fn format_name(cache_name: &str) -> String {
        format!("HTTPCache({})", cache_name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timer(&self) -> &dyn Timer {
        self.timer.as_ref()
    }

    pub fn stats(&self) -> &HttpCacheStats {
        &self.stats
    }

    /* configuration */

    pub fn set_force_caching(&self, force: bool) {
        self.force_caching.store(force, Ordering::Relaxed);
    }

    pub fn force_caching(&self) -> bool {
        self.force_caching.load(Ordering::Relaxed)
    }

    pub fn set_disable_html_caching_on_https(&self, disable: bool) {
        self.disable_html_caching_on_https
            .store(disable, Ordering::Relaxed);
    }

    /// Make the cache drop put requests that do not record successes.
    pub fn set_ignore_failure_puts(&self) {
        self.ignore_failure_puts.store(true, Ordering::Relaxed);
    }

    pub fn set_max_cacheable_response_content_length(&self, value: i64) {
        debug_assert!(value >= CACHE_SIZE_UNLIMITED);
        if value >= CACHE_SIZE_UNLIMITED {
            self.max_cacheable_response_content_length
                .store(value, Ordering::Relaxed);
        }
    }

    pub fn max_cacheable_response_content_length(&self) -> i64 {
        self.max_cacheable_response_content_length
            .load(Ordering::Relaxed)
    }

    /// 9 is the most compression, -1 the gzip default, 0 disables
    /// compression on insert.
    pub fn set_compression_level(&self, level: i32) {
        if (-1..=9).contains(&level) {
            self.compression_level.store(level, Ordering::Relaxed);
        } else {
            info!("invalid compression level {}, defaulting to -1", level);
            self.compression_level.store(-1, Ordering::Relaxed);
        }
    }

    pub fn compression_level(&self) -> i32 {
        self.compression_level.load(Ordering::Relaxed)
    }

    /// How many levels the backing cache has (1 or 2); this only affects
    /// which latency statistic each probe feeds.
    pub fn set_cache_levels(&self, levels: i32) {
        self.cache_levels.store(levels, Ordering::Relaxed);
    }

    pub fn cache_levels(&self) -> i32 {
        self.cache_levels.load(Ordering::Relaxed)
    }

    /// Bump to invalidate every entry at once.
    pub fn set_version(&self, version: i32) {
        self.version.store(version, Ordering::Relaxed);
    }

    pub fn failure_caching_ttl_sec(&self, kind: FetchResponseStatus) -> i32 {
        self.failure_policy.read().ttl_sec_for_status(kind)
    }

    pub fn set_failure_caching_ttl_sec(&self, kind: FetchResponseStatus, ttl_sec: i32) {
        self.failure_policy
            .write()
            .set_ttl_sec_for_status(kind, ttl_sec);
    }

    /// The byte-exact blob cache key for `(url, fragment)`.
    pub fn composite_key(&self, url: &str, fragment: &str) -> String {
        key::composite_key(url, fragment, self.version.load(Ordering::Relaxed))
    }

    /* size gates */

    /// Whether the advertised content length fits the cache. Absent content
    /// length (e.g. chunked) passes; the body gate applies later.
    pub fn is_cacheable_content_length(&self, headers: &ResponseHeaders) -> bool {
        headers
            .find_content_length()
            .map_or(true, |len| self.is_cacheable_body_size(len))
    }

    pub fn is_cacheable_body_size(&self, body_size: i64) -> bool {
        let max = self.max_cacheable_response_content_length();
        max == CACHE_SIZE_UNLIMITED || body_size <= max
    }

    /* expiration */

    /// Whether the entry is at or past expiration. Does not check general
    /// cacheability.
    pub fn is_expired(&self, headers: &ResponseHeaders, now_ms: i64) -> bool {
        if self.force_caching() {
            return false;
        }
        headers.cache_expiration_time_ms() <= now_ms
    }

    pub fn is_expired_now(&self, headers: &ResponseHeaders) -> bool {
        self.is_expired(headers, self.timer.now_ms())
    }

    /* lookup */

    /// Look up `(url, fragment)`, validating every candidate the backend
    /// yields. See [FindOutcome] for what is delivered.
    pub async fn find(
        &self,
        url: &str,
        fragment: &str,
        http_options: HttpOptions,
        ctx: &mut dyn FindContext,
    ) -> FindOutcome {
        let mut outcome = FindOutcome::new();
        let mut start_us = self.timer.now_us();
        let mut start_ms = start_us / 1000;
        let mut candidates = self.cache.get(&self.composite_key(url, fragment)).await;
        if candidates.is_empty() {
            // a backend should always answer; treat silence as a miss
            candidates.push(storage::Candidate::not_found());
        }
        let levels = self.cache_levels();

        for (index, candidate) in candidates.iter().enumerate() {
            let cache_level = (index + 1) as u32;
            let now_us = self.timer.now_us();
            let now_ms = now_us / 1000;
            let mut is_expired = false;

            if candidate.state == KeyState::Available {
                if let Some(bytes) = &candidate.bytes {
                    let stored = HttpValue::decode(bytes.clone());
                    outcome.http_value.link(&stored);
                    is_expired = self.validate_candidate(
                        url,
                        http_options,
                        ctx,
                        &mut outcome,
                        now_ms,
                        start_ms,
                    );
                }
            }

            let elapsed_us = (now_us - start_us).max(0);
            self.stats.cache_time_us.add(elapsed_us);
            ctx.report_latency_ms(cache_level, elapsed_us / 1000);

            let found = outcome.result.status == FindStatus::Found;
            if cache_level as i32 == levels || found {
                self.update_stats(
                    url,
                    fragment,
                    candidate.state,
                    outcome.result,
                    outcome.fallback_http_value.is_some(),
                    is_expired,
                );
            }

            if !found {
                outcome.headers = None;
                outcome.http_value.clear();
            } else {
                // serve an inflated copy when the client cannot take gzip
                if !ctx.accepts_gzip() {
                    if let Some(headers) = outcome.headers.as_mut() {
                        if headers.is_gzipped() {
                            let mut inflated = HttpValue::new();
                            if InflatingFetch::ungzip_value_if_compressed(
                                &outcome.http_value,
                                headers,
                                &mut inflated,
                            ) {
                                outcome.http_value.link(&inflated);
                            }
                        }
                    }
                }
                break;
            }
            start_us = now_us;
            start_ms = now_ms;
        }
        outcome
    }

    // Run the validation chain over the candidate already linked into
    // `outcome.http_value`. Returns whether the entry was expired.
    fn validate_candidate(
        &self,
        url: &str,
        http_options: HttpOptions,
        ctx: &mut dyn FindContext,
        outcome: &mut FindOutcome,
        now_ms: i64,
        start_ms: i64,
    ) -> bool {
        let Ok(mut headers) = outcome.http_value.extract_headers(http_options) else {
            return false;
        };

        let proxy_cacheable = self.force_caching()
            || headers.is_proxy_cacheable(
                ctx.req_properties(),
                ctx.respect_vary_on_resources(),
                ValidatorOption::HasValidator,
            );
        // Entries written before Connection sanitization was fixed may be
        // contaminated; treating them as a miss self-heals the cache.
        if !proxy_cacheable
            || !ctx.is_cache_valid(url, &headers)
            || headers.sanitize()
        {
            return false;
        }
        headers.compute_caching();

        let override_cache_ttl_ms = ctx.override_cache_ttl_ms(url);
        if override_cache_ttl_ms > 0 {
            headers.force_caching(override_cache_ttl_ms);
        }
        let is_expired = self.is_expired(&headers, now_ms);
        let mut is_valid_and_fresh = !is_expired && ctx.is_fresh(&headers);
        let http_status = headers.status_code();

        if is_failure_caching_status(http_status) {
            // A remembered-uncacheable 200 may since have joined the
            // override-caching group; the memo no longer applies then.
            if override_cache_ttl_ms > 0
                && http_status
                    == encode_failure_caching_status(FetchResponseStatus::Uncacheable200)
            {
                is_valid_and_fresh = false;
            }
            if is_valid_and_fresh {
                let remaining_ms = headers.cache_expiration_time_ms() - start_ms;
                info!(
                    "HTTPCache key={}: remembering recent failure for {} seconds",
                    url,
                    remaining_ms / 1000
                );
                outcome.result =
                    FindResult::recent_failure(decode_failure_caching_status(http_status));
            }
        } else if is_valid_and_fresh {
            outcome.result = FindResult::found();
            outcome.fallback_http_value = None;
            if headers.update_cache_headers_if_force_cached() {
                // reconstruct the stored record around the updated headers
                let contents = outcome.http_value.extract_contents();
                outcome.http_value.clear();
                outcome.http_value.set_headers(&headers);
                outcome.http_value.write(&contents);
            }
            outcome.headers = Some(headers);
        } else {
            // Expired (or not fresh enough), but still proxy-cacheable with
            // a validator: keep it around as a fallback for failed fetches
            // and for conditional revalidation.
            let mut served = false;
            if !ctx.accepts_gzip() {
                if let Ok(mut fallback_headers) =
                    outcome.http_value.extract_headers(http_options)
                {
                    let mut inflated = HttpValue::new();
                    if InflatingFetch::ungzip_value_if_compressed(
                        &outcome.http_value,
                        &mut fallback_headers,
                        &mut inflated,
                    ) {
                        outcome.fallback_http_value = Some(inflated);
                        served = true;
                    }
                }
            }
            if !served {
                let mut fallback = HttpValue::new();
                fallback.link(&outcome.http_value);
                outcome.fallback_http_value = Some(fallback);
            }
        }
        is_expired
    }

    fn update_stats(
        &self,
        url: &str,
        fragment: &str,
        backend_state: KeyState,
        result: FindResult,
        has_fallback: bool,
        is_expired: bool,
    ) {
        if backend_state == KeyState::Available {
            self.stats.cache_backend_hits.add(1);
        } else {
            self.stats.cache_backend_misses.add(1);
        }
        if result.status == FindStatus::Found {
            self.stats.cache_hits.add(1);
            debug_assert!(!has_fallback);
        } else {
            self.stats.cache_misses.add(1);
            if has_fallback {
                self.stats.cache_fallbacks.add(1);
            }
            if is_expired {
                info!("cache entry is expired: {} (fragment={})", url, fragment);
                self.stats.cache_expirations.add(1);
            }
        }
    }

    /* insertion */

    fn may_cache_url(&self, url_str: &str, headers: &ResponseHeaders) -> bool {
        if !url::is_any_valid(url_str) {
            return false;
        }
        if self.disable_html_caching_on_https.load(Ordering::Relaxed) && url::is_https(url_str) {
            return !headers.is_html_like();
        }
        true
    }

    /// Store a fully built value. The value's embedded headers drive
    /// cacheability; callers must not have sent the origin request with
    /// `Authorization`.
    pub async fn put(
        &self,
        url: &str,
        fragment: &str,
        req_properties: RequestProperties,
        http_options: HttpOptions,
        value: &mut HttpValue,
    ) {
        let start_us = self.timer.now_us();
        let Ok(mut headers) = value.extract_headers(http_options) else {
            return;
        };
        if !self.may_cache_url(url, &headers) {
            return;
        }
        if !self.force_caching()
            && !(headers.is_proxy_cacheable(
                req_properties,
                VaryOption::from_respect_vary(http_options.respect_vary),
                ValidatorOption::HasValidator,
            ) && self.is_cacheable_body_size(value.contents_size() as i64))
        {
            debug_assert!(
                false,
                "trying to put uncacheable data for key={} fragment={}",
                url, fragment
            );
            return;
        }
        let contents = value.extract_contents();
        if let Some(mut new_value) =
            self.apply_header_changes_for_put(&contents, &mut headers, Some(&*value))
        {
            self.put_internal(url, fragment, start_us, &mut new_value, &mut headers)
                .await;
            self.stats.cache_inserts.add(1);
        }
    }

    /// Store headers + body. The headers are updated (sanitized, given an
    /// etag, possibly rewritten for compression) prior to storing.
    pub async fn put_with_headers(
        &self,
        url: &str,
        fragment: &str,
        req_properties: RequestProperties,
        respect_vary_on_resources: VaryOption,
        headers: &mut ResponseHeaders,
        content: &[u8],
    ) {
        if !self.may_cache_url(url, headers) {
            return;
        }
        let start_us = self.timer.now_us();
        let now_ms = start_us / 1000;
        if (self.is_expired(headers, now_ms)
            || !headers.is_proxy_cacheable(
                req_properties,
                respect_vary_on_resources,
                ValidatorOption::HasValidator,
            )
            || !self.is_cacheable_body_size(content.len() as i64))
            && !self.force_caching()
        {
            return;
        }
        if let Some(mut value) = self.apply_header_changes_for_put(content, headers, None) {
            // the caller keeps its headers; compression works on a copy
            let mut headers_copy = headers.clone();
            self.put_internal(url, fragment, start_us, &mut value, &mut headers_copy)
                .await;
            self.stats.cache_inserts.add(1);
        }
    }

    // Sanitize, synthesize an etag from the body hash when the origin sent
    // none, and build the value to store. `None` means this put is dropped.
    fn apply_header_changes_for_put(
        &self,
        content: &[u8],
        headers: &mut ResponseHeaders,
        reuse: Option<&HttpValue>,
    ) -> Option<HttpValue> {
        if headers.status_code() != status::OK && self.ignore_failure_puts.load(Ordering::Relaxed)
        {
            return None;
        }
        let mut headers_mutated = headers.sanitize();
        if headers.lookup1(names::ETAG).is_none() {
            let hash = self.hasher.hash(content);
            // formatted etag is always a valid header value
            let _ = headers.add(names::ETAG, &format_etag(hash.as_str()));
            headers_mutated = true;
        }
        headers.compute_caching();

        if !headers_mutated {
            if let Some(value) = reuse {
                let mut same = HttpValue::new();
                same.link(value);
                return Some(same);
            }
        }
        let mut new_value = HttpValue::new();
        new_value.set_headers(headers);
        new_value.write(content);
        Some(new_value)
    }

    // Final compression pass and the actual backend write.
    async fn put_internal(
        &self,
        url: &str,
        fragment: &str,
        start_us: i64,
        value: &mut HttpValue,
        headers: &mut ResponseHeaders,
    ) {
        let compression_level = self.compression_level();
        let mut working_value = HttpValue::new();
        let mut use_working = false;

        if !value.empty() && compression_level != 0 {
            let compressible = headers
                .determine_content_type()
                .is_some_and(|ct| ct.is_compressible());
            if compressible && !headers.is_gzipped() {
                // keep x-original-content-length last for stable ordering
                if let Some(original_len) = headers
                    .lookup1(names::X_ORIGINAL_CONTENT_LENGTH)
                    .map(str::to_string)
                {
                    headers.remove_all(names::X_ORIGINAL_CONTENT_LENGTH);
                    let _ = headers.add(names::X_ORIGINAL_CONTENT_LENGTH, &original_len);
                }
                headers.compute_caching();
                let level = if compression_level < 0 {
                    6
                } else {
                    compression_level as u32
                };
                if InflatingFetch::gzip_value(level, value, &mut working_value, headers) {
                    use_working = true;
                }
            }
        } else if compression_level == 0 && headers.is_gzipped() {
            if InflatingFetch::ungzip_value_if_compressed(value, headers, &mut working_value) {
                use_working = true;
            }
        }

        let to_store = if use_working {
            &mut working_value
        } else {
            &mut *value
        };
        self.cache
            .put(&self.composite_key(url, fragment), to_store.share())
            .await;
        let delta_us = self.timer.now_us() - start_us;
        self.stats.cache_time_us.add(delta_us);
    }

    /* failure memoization */

    /// Remember that the fetch for `(url, fragment)` recently concluded with
    /// `kind`, so lookups short-circuit until the policy TTL elapses.
    pub async fn remember_failure(&self, url: &str, fragment: &str, kind: FetchResponseStatus) {
        let code = encode_failure_caching_status(kind);
        let ttl_sec = self.failure_caching_ttl_sec(kind) as i64;
        let mut headers = ResponseHeaders::new(HttpOptions::default());
        headers.set_status_code(code);
        let now_ms = self.timer.now_ms();
        headers.set_date_and_caching(now_ms, ttl_sec * 1000);
        headers.compute_caching();
        self.put_with_headers(
            url,
            fragment,
            RequestProperties::default(),
            VaryOption::RespectVaryOnResources,
            &mut headers,
            b"",
        )
        .await;
    }

    /* deletion */

    pub async fn delete(&self, url: &str, fragment: &str) {
        self.stats.cache_deletes.add(1);
        self.cache.delete(&self.composite_key(url, fragment)).await;
    }
}
