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

//! The streaming fetch sink.
//!
//! A fetch observes exactly one `headers_complete`, then body writes and
//! flushes, then exactly one `done(success)`. The provided trait methods
//! enforce that ordering: the first non-empty write (or flush, or done)
//! triggers the one-shot headers-complete transition, HEAD requests
//! suppress body bytes, and a failed `done` before headers repairs the
//! status code (0 becomes 404; a lying 200 becomes 500).
//!
//! Decorators wrap a `Box<dyn AsyncFetch>` and delegate the header
//! accessors to it, so one header object is shared down the chain without
//! copying. A decorator that must destroy itself when the stream ends is
//! simply consumed: `done` takes the fetch by value.

use crate::stats::Counter;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use velo_http::names;
use velo_http::names::status;
use velo_http::{HttpOptions, Method, RequestHeaders, ResponseHeaders};

/// Per-layer streaming bookkeeping.
#[derive(Debug, Default)]
pub struct FetchState {
    pub headers_complete: bool,
    pub content_length: Option<i64>,
}

/// Lazily allocated header objects for a fetch that owns its own.
#[derive(Debug)]
pub struct FetchHeaders {
    http_options: HttpOptions,
    request: Option<RequestHeaders>,
    response: Option<ResponseHeaders>,
    extra_response: Option<ResponseHeaders>,
}

impl FetchHeaders {
    pub fn new(http_options: HttpOptions) -> Self {
        FetchHeaders {
            http_options,
            request: None,
            response: None,
            extra_response: None,
        }
    }

    pub fn with_request(http_options: HttpOptions, request: RequestHeaders) -> Self {
        let mut headers = Self::new(http_options);
        headers.request = Some(request);
        headers
    }

    pub fn request_mut(&mut self) -> &mut RequestHeaders {
        self.request
            .get_or_insert_with(|| RequestHeaders::new(Method::GET, ""))
    }

    pub fn response_mut(&mut self) -> &mut ResponseHeaders {
        let options = self.http_options;
        self.response
            .get_or_insert_with(|| ResponseHeaders::new(options))
    }

    pub fn extra_response_mut(&mut self) -> &mut ResponseHeaders {
        let options = self.http_options;
        self.extra_response
            .get_or_insert_with(|| ResponseHeaders::new(options))
    }
}

/// The streaming sink for one fetch.
#[async_trait]
pub trait AsyncFetch: Send {
    fn fetch_state(&mut self) -> &mut FetchState;
    fn fetch_state_ref(&self) -> &FetchState;
    fn request_headers(&mut self) -> &mut RequestHeaders;
    fn response_headers(&mut self) -> &mut ResponseHeaders;
    /// Headers that may still be modified between headers-complete and
    /// done, e.g. X-Original-Content-Length learned mid-body.
    fn extra_response_headers(&mut self) -> &mut ResponseHeaders;

    async fn handle_headers_complete(&mut self);
    async fn handle_write(&mut self, data: &[u8]) -> bool;
    async fn handle_flush(&mut self) -> bool;
    async fn handle_done(self: Box<Self>, success: bool);

    /// One-shot headers-complete transition. Calling it twice is a contract
    /// violation.
    async fn headers_complete(&mut self) {
        debug_assert_ne!(
            self.response_headers().status_code(),
            0,
            "headers_complete without a status code"
        );
        if self.fetch_state_ref().headers_complete {
            debug_assert!(false, "headers_complete() called twice");
        } else {
            self.fetch_state().headers_complete = true;
            self.handle_headers_complete().await;
        }
    }

    /// Body bytes. Empty writes are no-ops; the first non-empty write
    /// triggers headers-complete; HEAD requests swallow the body.
    async fn write(&mut self, data: &[u8]) -> bool {
        if data.is_empty() {
            return true;
        }
        if !self.fetch_state_ref().headers_complete {
            self.headers_complete().await;
        }
        if self.request_headers().is_head() {
            return true;
        }
        self.handle_write(data).await
    }

    async fn flush(&mut self) -> bool {
        if !self.fetch_state_ref().headers_complete {
            self.headers_complete().await;
        }
        self.handle_flush().await
    }

    /// End of stream. Consumes the fetch; self-owned decorators are
    /// destroyed by this call.
    async fn done(mut self: Box<Self>, success: bool) {
        if !self.fetch_state_ref().headers_complete {
            if !success {
                let code = self.response_headers().status_code();
                if code == 0 {
                    // failing fetches might not set status codes
                    self.response_headers().set_status_code(status::NOT_FOUND);
                } else if code == status::OK {
                    // the fetch claimed success and then failed; nothing
                    // downstream can unsend a 200, so turn it into a 500 here
                    self.response_headers().clear();
                    self.response_headers()
                        .set_status_code(status::INTERNAL_SERVER_ERROR);
                }
            }
            self.response_headers().compute_caching();
            self.headers_complete().await;
        }
        self.handle_done(success).await;
    }

    fn content_length(&self) -> Option<i64> {
        self.fetch_state_ref().content_length
    }

    fn content_length_known(&self) -> bool {
        self.fetch_state_ref().content_length.is_some()
    }

    fn set_content_length(&mut self, len: i64) {
        self.fetch_state().content_length = Some(len);
    }

    /// The Google Cloud CDN only caches responses carrying an explicit
    /// `public`, so add one when the request came through it.
    fn fix_cache_control_for_google_cache(&mut self) {
        let via_google = self
            .request_headers()
            .lookup(names::VIA)
            .iter()
            .any(|v| is_google_cache_via(v));
        if via_google {
            self.response_headers().set_cache_control_public();
        }
    }
}

/// Whether a `Via` header value matches the Google Cloud CDN pattern,
/// `<version> google`.
pub fn is_google_cache_via(via_value: &str) -> bool {
    let mut tokens = via_value.split_whitespace();
    let (Some(version), Some(name), None) = (tokens.next(), tokens.next(), tokens.next()) else {
        return false;
    };
    name.eq_ignore_ascii_case("google") && version.parse::<f64>().is_ok()
}

/// What a [StringFetch] observed, shared with the caller because `done`
/// consumes the fetch itself.
#[derive(Debug, Default)]
pub struct FetchResult {
    pub buffer: Vec<u8>,
    pub done: bool,
    pub success: bool,
    pub flushes: usize,
    pub response_headers: Option<ResponseHeaders>,
    pub content_length: Option<i64>,
}

/// Shared handle to a [StringFetch]'s observations.
pub type FetchResultHandle = Arc<Mutex<FetchResult>>;

/// A fetch that collects the response into a buffer. The terminal sink for
/// tests and for callers that need the whole payload in memory.
pub struct StringFetch {
    state: FetchState,
    headers: FetchHeaders,
    result: FetchResultHandle,
}

impl StringFetch {
    pub fn new(http_options: HttpOptions) -> (Self, FetchResultHandle) {
        Self::with_request(http_options, RequestHeaders::new(Method::GET, ""))
    }

    pub fn with_request(
        http_options: HttpOptions,
        request: RequestHeaders,
    ) -> (Self, FetchResultHandle) {
        let result: FetchResultHandle = Arc::new(Mutex::new(FetchResult::default()));
        let fetch = StringFetch {
            state: FetchState::default(),
            headers: FetchHeaders::with_request(http_options, request),
            result: result.clone(),
        };
        (fetch, result)
    }
}

#[async_trait]
impl AsyncFetch for StringFetch {
    fn fetch_state(&mut self) -> &mut FetchState {
        &mut self.state
    }

    fn fetch_state_ref(&self) -> &FetchState {
        &self.state
    }

    fn request_headers(&mut self) -> &mut RequestHeaders {
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
        self.result.lock().buffer.extend_from_slice(data);
        true
    }

    async fn handle_flush(&mut self) -> bool {
        self.result.lock().flushes += 1;
        true
    }

    async fn handle_done(mut self: Box<Self>, success: bool) {
        let mut result = self.result.lock();
        result.done = true;
        result.success = success;
        result.content_length = self.state.content_length;
        result.response_headers = Some(self.headers.response_mut().clone());
    }
}

/// The shared delegation core for fetch decorators: every header accessor
/// forwards to the wrapped fetch so the chain mutates one set of headers.
#[macro_export]
macro_rules! delegate_fetch_headers {
    ($base:ident) => {
        fn fetch_state(&mut self) -> &mut $crate::fetch::FetchState {
            &mut self.state
        }

        fn fetch_state_ref(&self) -> &$crate::fetch::FetchState {
            &self.state
        }

        fn request_headers(&mut self) -> &mut velo_http::RequestHeaders {
            self.$base.request_headers()
        }

        fn response_headers(&mut self) -> &mut velo_http::ResponseHeaders {
            self.$base.response_headers()
        }

        fn extra_response_headers(&mut self) -> &mut velo_http::ResponseHeaders {
            self.$base.extra_response_headers()
        }
    };
}

/// Propagate a decorator's content length to its base before forwarding
/// headers-complete.
pub(crate) fn propagate_content_length(
    state: &FetchState,
    base: &mut (dyn AsyncFetch + '_),
) {
    if let Some(len) = state.content_length {
        base.set_content_length(len);
    }
}

/// Bump an optional counter by one.
pub(crate) fn bump(counter: Option<&Counter>) {
    if let Some(c) = counter {
        c.add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> HttpOptions {
        HttpOptions::default()
    }

    #[tokio::test]
    async fn write_triggers_headers_complete_once() {
        let (mut fetch, result) = StringFetch::new(options());
        fetch.response_headers().set_status_code(200);
        assert!(fetch.write(b"hello").await);
        assert!(fetch.fetch_state_ref().headers_complete);
        assert!(fetch.write(b" world").await);
        Box::new(fetch).done(true).await;

        let result = result.lock();
        assert!(result.done);
        assert!(result.success);
        assert_eq!(result.buffer, b"hello world");
    }

    #[tokio::test]
    async fn empty_write_is_a_no_op() {
        let (mut fetch, _result) = StringFetch::new(options());
        fetch.response_headers().set_status_code(200);
        assert!(fetch.write(b"").await);
        assert!(!fetch.fetch_state_ref().headers_complete);
    }

    #[tokio::test]
    async fn head_request_suppresses_body() {
        let request = RequestHeaders::new(Method::HEAD, "https://x/");
        let (mut fetch, result) = StringFetch::with_request(options(), request);
        fetch.response_headers().set_status_code(200);
        assert!(fetch.write(b"body").await);
        Box::new(fetch).done(true).await;
        let result = result.lock();
        assert!(result.buffer.is_empty());
        // headers still completed
        assert_eq!(result.response_headers.as_ref().unwrap().status_code(), 200);
    }

    #[tokio::test]
    async fn failed_done_without_status_becomes_404() {
        let (fetch, result) = StringFetch::new(options());
        Box::new(fetch).done(false).await;
        let result = result.lock();
        assert!(result.done);
        assert!(!result.success);
        assert_eq!(result.response_headers.as_ref().unwrap().status_code(), 404);
    }

    #[tokio::test]
    async fn failed_done_with_lying_200_becomes_500() {
        let (mut fetch, result) = StringFetch::new(options());
        fetch.response_headers().set_status_code(200);
        fetch.response_headers().add("X-Leak", "1").unwrap();
        Box::new(fetch).done(false).await;
        let result = result.lock();
        let headers = result.response_headers.as_ref().unwrap();
        assert_eq!(headers.status_code(), 500);
        assert!(!headers.has("X-Leak"));
    }

    #[tokio::test]
    async fn successful_done_keeps_status() {
        let (mut fetch, result) = StringFetch::new(options());
        fetch.response_headers().set_status_code(204);
        Box::new(fetch).done(true).await;
        assert_eq!(
            result.lock().response_headers.as_ref().unwrap().status_code(),
            204
        );
    }

    #[test]
    fn google_cache_via_detection() {
        assert!(is_google_cache_via("1.1 google"));
        assert!(is_google_cache_via("2.0 GOOGLE"));
        assert!(!is_google_cache_via("1.1 squid"));
        assert!(!is_google_cache_via("google"));
        assert!(!is_google_cache_via("one google"));
        assert!(!is_google_cache_via("1.1 google extra"));
    }

    #[tokio::test]
    async fn google_cache_gets_public() {
        let (mut fetch, _result) = StringFetch::new(options());
        fetch.request_headers().add("Via", "1.1 google").unwrap();
        fetch
            .response_headers()
            .add("Cache-Control", "max-age=600")
            .unwrap();
        fetch.response_headers().set_status_code(200);
        fetch.fix_cache_control_for_google_cache();
        assert!(fetch
            .response_headers()
            .has_value("Cache-Control", "public"));
    }
}
