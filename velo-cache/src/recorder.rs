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

//! In-place recording: snapshot an origin response that is streaming
//! through an unrelated path into the HTTP cache.
//!
//! A recorder lives for one attempt. It is gated on concurrency (a shared
//! counter capability), response size, content type and proxy
//! cacheability; several of the gates memoize their verdict so the next
//! request does not retry the recording. The final headers arrive only
//! when the stream ends, so the body is collected first and the headers
//! attached last.

use crate::compression::has_gzip_magic_bytes;
use crate::failure::FetchResponseStatus;
use crate::fetch::{AsyncFetch, FetchHeaders, FetchState};
use crate::inflate::InflatingFetch;
use crate::stats::RecorderStats;
use crate::value::HttpValue;
use crate::HttpCache;
use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use velo_http::names;
use velo_http::names::status;
use velo_http::{HttpOptions, RequestProperties, ResponseHeaders, ValidatorOption, VaryOption};

/// Which headers a [InPlaceRecorder::consider_response_headers] call
/// carries: an early subset (enough to know `Content-Encoding`) or the
/// complete set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadersKind {
    Preliminary,
    Full,
}

/// The shared in-flight recording counter. One per process, passed into
/// each recorder so tests can substitute their own.
#[derive(Debug, Default)]
pub struct ActiveRecordings(AtomicI32);

impl ActiveRecordings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the count including this increment.
    fn increment(&self) -> i32 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn decrement(&self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> i32 {
        self.0.load(Ordering::SeqCst)
    }
}

// The terminal sink of the recorder's internal inflating chain: body bytes
// land in a shared HttpValue.
struct ValueFetch {
    state: FetchState,
    headers: FetchHeaders,
    value: Arc<Mutex<HttpValue>>,
}

impl ValueFetch {
    fn new(http_options: HttpOptions) -> (Self, Arc<Mutex<HttpValue>>) {
        let value = Arc::new(Mutex::new(HttpValue::new()));
        (
            ValueFetch {
                state: FetchState::default(),
                headers: FetchHeaders::new(http_options),
                value: value.clone(),
            },
            value,
        )
    }
}

#[async_trait]
impl AsyncFetch for ValueFetch {
    fn fetch_state(&mut self) -> &mut FetchState {
        &mut self.state
    }

    fn fetch_state_ref(&self) -> &FetchState {
        &self.state
    }

    fn request_headers(&mut self) -> &mut velo_http::RequestHeaders {
        self.headers.request_mut()
    }

    fn response_headers(&mut self) -> &mut ResponseHeaders {
        self.headers.response_mut()
    }

    fn extra_response_headers(&mut self) -> &mut ResponseHeaders {
        self.headers.extra_response_mut()
    }

    async fn handle_headers_complete(&mut self) {}

    async fn handle_write(&mut self, data: &[u8]) -> bool {
        self.value.lock().write(data);
        true
    }

    async fn handle_flush(&mut self) -> bool {
        true
    }

    async fn handle_done(self: Box<Self>, _success: bool) {}
}

/// One recording attempt. Consumed by
/// [InPlaceRecorder::done_and_set_headers].
pub struct InPlaceRecorder {
    url: String,
    fragment: String,
    request_properties: RequestProperties,
    http_options: HttpOptions,
    max_response_bytes: i64,
    limit_active_recordings: bool,
    active_recordings: Arc<ActiveRecordings>,
    cache: Arc<HttpCache>,
    stats: Arc<RecorderStats>,
    resource_value: Arc<Mutex<HttpValue>>,
    inflating_fetch: Option<Box<InflatingFetch>>,
    status_code: i64,
    failure: bool,
    full_response_headers_considered: bool,
    consider_response_headers_called: bool,
    cache_control_set: bool,
    cache_control: Option<String>,
}

impl InPlaceRecorder {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        url: impl Into<String>,
        fragment: impl Into<String>,
        request_properties: RequestProperties,
        http_options: HttpOptions,
        max_response_bytes: i64,
        max_concurrent_recordings: i32,
        active_recordings: Arc<ActiveRecordings>,
        cache: Arc<HttpCache>,
        stats: Arc<RecorderStats>,
    ) -> Self {
        stats.num_resources.add(1);
        let limit_active_recordings = max_concurrent_recordings > 0;
        let mut failure = false;
        if limit_active_recordings
            && active_recordings.increment() > max_concurrent_recordings
        {
            debug!("too many recordings in progress, not recording");
            stats.num_dropped_due_to_load.add(1);
            failure = true;
        }

        // The cache has its own response size cap; take the most
        // constraining of the two.
        let mut max_response_bytes = max_response_bytes;
        let cache_max = cache.max_cacheable_response_content_length();
        if cache_max != -1 {
            if max_response_bytes <= 0 {
                max_response_bytes = cache_max;
            } else {
                max_response_bytes = max_response_bytes.min(cache_max);
            }
        }

        InPlaceRecorder {
            url: url.into(),
            fragment: fragment.into(),
            request_properties,
            http_options,
            max_response_bytes,
            limit_active_recordings,
            active_recordings,
            cache,
            stats,
            resource_value: Arc::new(Mutex::new(HttpValue::new())),
            inflating_fetch: None,
            status_code: -1,
            failure,
            full_response_headers_considered: false,
            consider_response_headers_called: false,
            cache_control_set: false,
            cache_control: None,
        }
    }

    pub fn failed(&self) -> bool {
        self.failure
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Replace the stored `Cache-Control` with the caller's value (`None`
    /// removes it entirely).
    pub fn save_cache_control(&mut self, cache_control: Option<&str>) {
        self.cache_control_set = true;
        self.cache_control = cache_control.map(str::to_string);
    }

    /// Inspect response headers. Called once with preliminary headers as
    /// soon as `Content-Encoding` is known, and once with the full set;
    /// servers that only learn the content type late may skip the first
    /// call.
    pub async fn consider_response_headers(
        &mut self,
        headers_kind: HeadersKind,
        response_headers: &mut ResponseHeaders,
    ) {
        debug_assert!(!self.full_response_headers_considered);
        response_headers.compute_caching();

        if !self.consider_response_headers_called {
            self.consider_response_headers_called = true;
            // Set up the inflating chain. Only Content-Encoding matters at
            // this point, plus a nonzero status to satisfy the fetch
            // contract.
            let (value_fetch, value) = ValueFetch::new(self.http_options);
            self.resource_value = value;
            let mut inflating = Box::new(InflatingFetch::new(Box::new(value_fetch)));
            inflating.response_headers().copy_from(response_headers);
            inflating.response_headers().set_status_code(status::OK);
            inflating.response_headers().compute_caching();
            self.inflating_fetch = Some(inflating);
        }

        self.status_code = response_headers.status_code() as i64;

        // Bail out early when the advertised length alone is too large.
        if self.max_response_bytes > 0 {
            if let Some(content_length) = response_headers.find_content_length() {
                if content_length > self.max_response_bytes {
                    debug!(
                        "content-length {} too large to record {}",
                        content_length, self.url
                    );
                    self.dropped_due_to_size().await;
                    return;
                }
            }
        }

        // The content-type gate, as soon as a type is known. With full
        // headers an unusable type is memoized so the next request does not
        // retry; learned early, the added cache pressure is not worth it
        // and we simply bail every time.
        if response_headers.has(names::CONTENT_TYPE) || headers_kind == HeadersKind::Full {
            let recordable = response_headers
                .determine_content_type()
                .is_some_and(|ct| ct.is_image() || ct.is_css() || ct.is_js_like());
            if !recordable {
                if headers_kind == HeadersKind::Full {
                    self.dropped_as_uncacheable().await;
                } else {
                    self.failure = true;
                }
                return;
            }
        }

        if headers_kind != HeadersKind::Full {
            return;
        }
        self.full_response_headers_considered = true;

        // 4xx/5xx cannot be recorded, but the failure is worth remembering.
        if status::is_error(response_headers.status_code()) {
            let failure_kind = if (400..500).contains(&response_headers.status_code()) {
                FetchResponseStatus::ClientError4xx
            } else {
                FetchResponseStatus::OtherError
            };
            self.cache
                .remember_failure(&self.url, &self.fragment, failure_kind)
                .await;
            self.failure = true;
            return;
        }

        // Anything else that is not a 200 cannot be optimized either, but
        // is likely transient (304, 206): fail without memoizing.
        if response_headers.status_code() != status::OK {
            self.failure = true;
            return;
        }

        let is_cacheable = response_headers.is_proxy_cacheable(
            self.request_properties,
            VaryOption::from_respect_vary(self.http_options.respect_vary),
            ValidatorOption::NoValidator,
        );
        if !is_cacheable {
            self.dropped_as_uncacheable().await;
            self.stats.num_not_cacheable.add(1);
        }
    }

    /// Stream body bytes through the inflater into the private value.
    pub async fn write(&mut self, contents: &[u8]) -> bool {
        debug_assert!(self.consider_response_headers_called);
        if self.failure {
            return false;
        }
        let Some(inflating) = self.inflating_fetch.as_mut() else {
            self.failure = true;
            return false;
        };
        self.failure = !inflating.write(contents).await;

        let size = self.resource_value.lock().contents_size() as i64;
        if self.max_response_bytes <= 0 || size < self.max_response_bytes {
            !self.failure
        } else {
            debug!("max response bytes exceeded while recording {}", self.url);
            self.dropped_due_to_size().await;
            false
        }
    }

    async fn dropped_due_to_size(&mut self) {
        self.stats.num_dropped_due_to_size.add(1);
        // too big == too big to cache
        self.dropped_as_uncacheable().await;
    }

    async fn dropped_as_uncacheable(&mut self) {
        if !self.failure {
            let kind = if self.status_code == status::OK as i64 {
                FetchResponseStatus::Uncacheable200
            } else {
                FetchResponseStatus::UncacheableError
            };
            self.cache
                .remember_failure(&self.url, &self.fragment, kind)
                .await;
            self.failure = true;
        }
    }

    /// Finish the recording: run the remaining gates, attach the final
    /// headers and insert into the cache. Consumes the recorder; the
    /// concurrency slot is released on drop.
    pub async fn done_and_set_headers(
        mut self,
        response_headers: &mut ResponseHeaders,
        entire_response_received: bool,
    ) {
        if !entire_response_received {
            // partial responses poison the cache with truncated bodies
            self.failure = true;
        }

        if !self.failure && !self.full_response_headers_considered {
            self.consider_response_headers(HeadersKind::Full, response_headers)
                .await;
        }

        // flush whatever the inflater still buffers
        if let Some(inflating) = self.inflating_fetch.take() {
            inflating.done(true).await;
        }

        let contents_size = self.resource_value.lock().contents_size();
        if self.status_code == status::OK as i64 && contents_size == 0 {
            // empty 200s are origin hiccups; remember and move on
            if !self.failure {
                self.cache
                    .remember_failure(&self.url, &self.fragment, FetchResponseStatus::Empty)
                    .await;
            }
            self.failure = true;
        }

        if self.failure {
            self.stats.num_failed.add(1);
            return;
        }

        // The recorded bytes are inflated, but the origin's headers may
        // predate a compression layer: sniff before trusting them.
        let mut value = HttpValue::new();
        {
            let resource_value = self.resource_value.lock();
            value.link(&resource_value);
        }
        let contents = value.extract_contents();
        if !has_gzip_magic_bytes(&contents) {
            response_headers.remove_all(names::CONTENT_ENCODING);
        }
        // the inflated length differs from whatever was advertised
        response_headers.remove_all(names::CONTENT_LENGTH);

        if self.cache_control_set {
            response_headers.remove_all(names::CACHE_CONTROL);
            if let Some(cache_control) = &self.cache_control {
                if !cache_control.is_empty() {
                    let _ = response_headers.add(names::CACHE_CONTROL, cache_control);
                }
            }
        }
        response_headers.compute_caching();

        let mut stored = HttpValue::new();
        stored.set_headers(response_headers);
        stored.write(&contents);
        self.cache
            .put(
                &self.url,
                &self.fragment,
                self.request_properties,
                self.http_options,
                &mut stored,
            )
            .await;
        self.stats.num_inserted_into_cache.add(1);
    }
}

impl Drop for InPlaceRecorder {
    fn drop(&mut self) {
        if self.limit_active_recordings {
            self.active_recordings.decrement();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::gzip_bytes;
    use crate::key::Blake2Hasher;
    use crate::memory::MemBlobCache;
    use crate::stats::HttpCacheStats;
    use crate::timer::MockTimer;
    use crate::{BasicFindContext, FindStatus};
    use velo_http::time::format_http_date_ms;

    const NOW_MS: i64 = 1_000_000;
    const URL: &str = "https://x/a.css";

    struct Fixture {
        cache: Arc<HttpCache>,
        stats: Arc<RecorderStats>,
        active: Arc<ActiveRecordings>,
    }

    impl Fixture {
        fn new() -> Self {
            let blob = Arc::new(MemBlobCache::new("recorder-test"));
            let timer = Arc::new(MockTimer::new(NOW_MS));
            let cache = Arc::new(HttpCache::new(
                blob,
                timer,
                Arc::new(Blake2Hasher),
                Arc::new(HttpCacheStats::new()),
            ));
            Fixture {
                cache,
                stats: Arc::new(RecorderStats::new()),
                active: Arc::new(ActiveRecordings::new()),
            }
        }

        fn recorder(&self, max_bytes: i64, max_concurrent: i32) -> InPlaceRecorder {
            InPlaceRecorder::new(
                URL,
                "frag",
                RequestProperties {
                    has_cookie: false,
                    has_cookie2: false,
                    has_authorization: false,
                },
                HttpOptions::default(),
                max_bytes,
                max_concurrent,
                self.active.clone(),
                self.cache.clone(),
                self.stats.clone(),
            )
        }

        async fn find(&self, url: &str) -> crate::FindOutcome {
            let mut ctx = BasicFindContext::new(
                RequestProperties {
                    has_cookie: false,
                    has_cookie2: false,
                    has_authorization: false,
                },
                VaryOption::IgnoreVaryOnResources,
            );
            self.cache
                .find(url, "frag", HttpOptions::default(), &mut ctx)
                .await
        }
    }

    fn css_headers() -> ResponseHeaders {
        let mut h = ResponseHeaders::new(HttpOptions::default());
        h.set_status_code(200);
        h.add("Content-Type", "text/css").unwrap();
        h.add("Date", &format_http_date_ms(NOW_MS)).unwrap();
        h.add("Cache-Control", "max-age=600").unwrap();
        h
    }

    #[tokio::test]
    async fn records_a_cacheable_resource() {
        let fixture = Fixture::new();
        let mut recorder = fixture.recorder(0, 0);
        let mut headers = css_headers();

        recorder
            .consider_response_headers(HeadersKind::Preliminary, &mut headers)
            .await;
        assert!(recorder.write(b"/* body */").await);
        recorder.done_and_set_headers(&mut headers, true).await;

        assert_eq!(fixture.stats.num_inserted_into_cache.get(), 1);
        assert_eq!(fixture.stats.num_failed.get(), 0);
        let outcome = fixture.find(URL).await;
        assert_eq!(outcome.result.status, FindStatus::Found);
        assert_eq!(&outcome.http_value.extract_contents()[..], b"/* body */");
        // content-length of the original stream never survives
        let found = outcome.headers.unwrap();
        assert!(found.find_content_length().is_none() || found.find_content_length() == Some(10));
    }

    #[tokio::test]
    async fn inflates_gzip_bodies_and_strips_the_header() {
        let fixture = Fixture::new();
        let mut recorder = fixture.recorder(0, 0);
        let body = b"/* a reasonably long css body to compress */".repeat(10);
        let compressed = gzip_bytes(6, &body).unwrap();

        let mut headers = css_headers();
        headers.add("Content-Encoding", "gzip").unwrap();
        headers
            .add("Content-Length", &compressed.len().to_string())
            .unwrap();

        recorder
            .consider_response_headers(HeadersKind::Preliminary, &mut headers)
            .await;
        assert!(recorder.write(&compressed).await);
        recorder.done_and_set_headers(&mut headers, true).await;

        assert_eq!(fixture.stats.num_inserted_into_cache.get(), 1);
        let outcome = fixture.find(URL).await;
        assert_eq!(outcome.result.status, FindStatus::Found);
        assert_eq!(&outcome.http_value.extract_contents()[..], &body[..]);
        let found = outcome.headers.unwrap();
        assert!(!found.is_gzipped());
    }

    #[tokio::test]
    async fn html_known_early_fails_without_memoizing() {
        let fixture = Fixture::new();
        let mut recorder = fixture.recorder(0, 0);
        let mut headers = css_headers();
        headers.replace("Content-Type", "text/html").unwrap();

        recorder
            .consider_response_headers(HeadersKind::Preliminary, &mut headers)
            .await;
        assert!(recorder.failed());
        assert!(!recorder.write(b"<html>").await);
        recorder.done_and_set_headers(&mut headers, true).await;

        assert_eq!(fixture.stats.num_failed.get(), 1);
        assert_eq!(fixture.stats.num_inserted_into_cache.get(), 0);
        // no memoized entry: the next lookup is a clean miss
        let outcome = fixture.find(URL).await;
        assert_eq!(outcome.result.status, FindStatus::NotFound);
        assert_eq!(outcome.result.failure, FetchResponseStatus::NotSet);
    }

    #[tokio::test]
    async fn unusable_type_with_full_headers_is_memoized() {
        let fixture = Fixture::new();
        let mut recorder = fixture.recorder(0, 0);
        let mut headers = css_headers();
        headers.replace("Content-Type", "text/html").unwrap();

        recorder
            .consider_response_headers(HeadersKind::Full, &mut headers)
            .await;
        assert!(recorder.failed());
        recorder.done_and_set_headers(&mut headers, true).await;

        let outcome = fixture.find(URL).await;
        assert_eq!(outcome.result.status, FindStatus::RecentFailure);
        assert_eq!(outcome.result.failure, FetchResponseStatus::Uncacheable200);
    }

    #[tokio::test]
    async fn client_errors_are_memoized() {
        let fixture = Fixture::new();
        let mut recorder = fixture.recorder(0, 0);
        let mut headers = css_headers();
        headers.set_status_code(404);

        recorder
            .consider_response_headers(HeadersKind::Full, &mut headers)
            .await;
        assert!(recorder.failed());
        recorder.done_and_set_headers(&mut headers, true).await;

        let outcome = fixture.find(URL).await;
        assert_eq!(outcome.result.status, FindStatus::RecentFailure);
        assert_eq!(outcome.result.failure, FetchResponseStatus::ClientError4xx);
    }

    #[tokio::test]
    async fn non_200_non_error_fails_without_memoizing() {
        let fixture = Fixture::new();
        let mut recorder = fixture.recorder(0, 0);
        let mut headers = css_headers();
        headers.set_status_code(304);

        recorder
            .consider_response_headers(HeadersKind::Full, &mut headers)
            .await;
        assert!(recorder.failed());
        recorder.done_and_set_headers(&mut headers, true).await;

        let outcome = fixture.find(URL).await;
        assert_eq!(outcome.result.status, FindStatus::NotFound);
    }

    #[tokio::test]
    async fn body_over_the_size_gate_is_dropped() {
        let fixture = Fixture::new();
        let mut recorder = fixture.recorder(10, 0);
        let mut headers = css_headers();

        recorder
            .consider_response_headers(HeadersKind::Preliminary, &mut headers)
            .await;
        assert!(!recorder.write(&[b'x'; 64]).await);
        recorder.done_and_set_headers(&mut headers, true).await;

        assert_eq!(fixture.stats.num_dropped_due_to_size.get(), 1);
        assert_eq!(fixture.stats.num_inserted_into_cache.get(), 0);
    }

    #[tokio::test]
    async fn advertised_length_over_the_gate_is_dropped_early() {
        let fixture = Fixture::new();
        let mut recorder = fixture.recorder(10, 0);
        let mut headers = css_headers();
        headers.add("Content-Length", "1000").unwrap();

        recorder
            .consider_response_headers(HeadersKind::Preliminary, &mut headers)
            .await;
        assert!(recorder.failed());
        assert_eq!(fixture.stats.num_dropped_due_to_size.get(), 1);
    }

    #[tokio::test]
    async fn concurrency_cap_drops_recordings() {
        let fixture = Fixture::new();
        let first = fixture.recorder(0, 1);
        assert!(!first.failed());
        let second = fixture.recorder(0, 1);
        assert!(second.failed());
        assert_eq!(fixture.stats.num_dropped_due_to_load.get(), 1);
        drop(first);
        drop(second);
        assert_eq!(fixture.active.count(), 0);
        // slots released: a new recorder is admitted again
        let third = fixture.recorder(0, 1);
        assert!(!third.failed());
    }

    #[tokio::test]
    async fn empty_200_is_memoized_as_empty() {
        let fixture = Fixture::new();
        let mut recorder = fixture.recorder(0, 0);
        let mut headers = css_headers();

        recorder
            .consider_response_headers(HeadersKind::Full, &mut headers)
            .await;
        assert!(!recorder.failed());
        recorder.done_and_set_headers(&mut headers, true).await;

        assert_eq!(fixture.stats.num_failed.get(), 1);
        let outcome = fixture.find(URL).await;
        assert_eq!(outcome.result.status, FindStatus::RecentFailure);
        assert_eq!(outcome.result.failure, FetchResponseStatus::Empty);
    }

    #[tokio::test]
    async fn incomplete_responses_are_not_recorded() {
        let fixture = Fixture::new();
        let mut recorder = fixture.recorder(0, 0);
        let mut headers = css_headers();

        recorder
            .consider_response_headers(HeadersKind::Preliminary, &mut headers)
            .await;
        assert!(recorder.write(b"/* partial").await);
        recorder.done_and_set_headers(&mut headers, false).await;

        assert_eq!(fixture.stats.num_failed.get(), 1);
        assert_eq!(fixture.stats.num_inserted_into_cache.get(), 0);
    }

    #[tokio::test]
    async fn cache_control_override_is_applied() {
        let fixture = Fixture::new();
        let mut recorder = fixture.recorder(0, 0);
        let mut headers = css_headers();

        recorder
            .consider_response_headers(HeadersKind::Preliminary, &mut headers)
            .await;
        assert!(recorder.write(b"/* body */").await);
        recorder.save_cache_control(Some("max-age=60"));
        recorder.done_and_set_headers(&mut headers, true).await;

        let outcome = fixture.find(URL).await;
        assert_eq!(outcome.result.status, FindStatus::Found);
        let found = outcome.headers.unwrap();
        assert_eq!(found.cache_ttl_ms(), 60_000);
    }

    #[tokio::test]
    async fn uncacheable_headers_are_memoized_as_not_cacheable() {
        let fixture = Fixture::new();
        let mut recorder = fixture.recorder(0, 0);
        let mut headers = css_headers();
        headers.replace("Cache-Control", "private, max-age=600").unwrap();

        recorder
            .consider_response_headers(HeadersKind::Full, &mut headers)
            .await;
        assert!(recorder.failed());
        assert_eq!(fixture.stats.num_not_cacheable.get(), 1);
        recorder.done_and_set_headers(&mut headers, true).await;

        let outcome = fixture.find(URL).await;
        assert_eq!(outcome.result.status, FindStatus::RecentFailure);
        assert_eq!(outcome.result.failure, FetchResponseStatus::Uncacheable200);
    }
}
