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

//! Stale fallback: when the origin answers 5xx and a stale cached copy is
//! on hand, serve the stale copy instead, marked `Warning: 110`. The failed
//! origin response is discarded entirely.

use crate::delegate_fetch_headers;
use crate::fetch::{bump, propagate_content_length, AsyncFetch, FetchState};
use crate::stats::FetchStats;
use crate::value::HttpValue;
use async_trait::async_trait;
use log::warn;
use std::sync::Arc;
use velo_http::names;
use velo_http::names::status;

/// A fetch decorator armed with an optional stale value as a safety net.
pub struct FallbackFetch {
    state: FetchState,
    base: Box<dyn AsyncFetch>,
    fallback: HttpValue,
    serving_fallback: bool,
    stats: Option<Arc<FetchStats>>,
}

impl FallbackFetch {
    pub fn new(base: Box<dyn AsyncFetch>, fallback: Option<&HttpValue>) -> Self {
        let mut armed = HttpValue::new();
        if let Some(value) = fallback {
            if !value.empty() {
                armed.link(value);
            }
        }
        FallbackFetch {
            state: FetchState::default(),
            base,
            fallback: armed,
            serving_fallback: false,
            stats: None,
        }
    }

    pub fn set_fetch_stats(&mut self, stats: Arc<FetchStats>) {
        self.stats = Some(stats);
    }

    pub fn serving_fallback(&self) -> bool {
        self.serving_fallback
    }
}

#[async_trait]
impl AsyncFetch for FallbackFetch {
    delegate_fetch_headers!(base);

    async fn handle_headers_complete(&mut self) {
        let code = self.base.response_headers().status_code();
        if status::is_server_error(code) && !self.fallback.empty() {
            let options = self.base.response_headers().http_options();
            match self.fallback.extract_headers(options) {
                Ok(stale_headers) => {
                    // Stop passing origin events through until done().
                    self.serving_fallback = true;
                    let contents = self.fallback.extract_contents();
                    {
                        let resp = self.base.response_headers();
                        resp.copy_from(&stale_headers);
                        // formatted constant value, cannot fail
                        let _ = resp.add(names::WARNING, names::WARNING_STALE);
                        resp.compute_caching();
                    }
                    self.set_content_length(contents.len() as i64);
                    propagate_content_length(&self.state, self.base.as_mut());
                    self.base.headers_complete().await;
                    self.base.write(&contents).await;
                    self.base.flush().await;
                    bump(self.stats.as_deref().map(|s| &s.fallback_responses_served));
                    return;
                }
                Err(e) => {
                    warn!("undecodable fallback value, serving the error: {}", e);
                }
            }
        }
        propagate_content_length(&self.state, self.base.as_mut());
        self.base.headers_complete().await;
    }

    async fn handle_write(&mut self, data: &[u8]) -> bool {
        if self.serving_fallback {
            return true;
        }
        self.base.write(data).await
    }

    async fn handle_flush(&mut self) -> bool {
        if self.serving_fallback {
            return true;
        }
        self.base.flush().await
    }

    async fn handle_done(self: Box<Self>, success: bool) {
        let serving_fallback = self.serving_fallback;
        self.base.done(serving_fallback || success).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::StringFetch;
    use velo_http::time::format_http_date_ms;
    use velo_http::{HttpOptions, Method, RequestHeaders, ResponseHeaders};

    fn stale_value(body: &[u8]) -> HttpValue {
        let mut headers = ResponseHeaders::new(HttpOptions::default());
        headers.set_status_code(200);
        headers.add("Content-Type", "text/css").unwrap();
        headers.add("Date", &format_http_date_ms(1_000_000)).unwrap();
        headers.add("Cache-Control", "max-age=600").unwrap();
        let mut value = HttpValue::new();
        value.set_headers(&headers);
        value.write(body);
        value
    }

    fn new_chain(
        fallback: Option<&HttpValue>,
    ) -> (Box<FallbackFetch>, crate::fetch::FetchResultHandle, Arc<FetchStats>) {
        let request = RequestHeaders::new(Method::GET, "https://x/a.css");
        let (sink, result) = StringFetch::with_request(HttpOptions::default(), request);
        let mut fetch = Box::new(FallbackFetch::new(Box::new(sink), fallback));
        let stats = Arc::new(FetchStats::new());
        fetch.set_fetch_stats(stats.clone());
        (fetch, result, stats)
    }

    #[tokio::test]
    async fn serves_stale_on_server_error() {
        let stale = stale_value(b"stale body");
        let (mut fetch, result, stats) = new_chain(Some(&stale));

        fetch.response_headers().set_status_code(502);
        // origin error body must not leak through
        assert!(fetch.write(b"Bad Gateway").await);
        assert!(fetch.flush().await);
        fetch.done(false).await;

        let result = result.lock();
        assert!(result.done);
        // the chain reports success because the client got a usable answer
        assert!(result.success);
        assert_eq!(result.buffer, b"stale body");
        let headers = result.response_headers.as_ref().unwrap();
        assert_eq!(headers.status_code(), 200);
        assert_eq!(headers.lookup1("Warning"), Some("110 Response is stale"));
        assert_eq!(result.content_length, Some(10));
        assert_eq!(stats.fallback_responses_served.get(), 1);
    }

    #[tokio::test]
    async fn passes_success_through_untouched() {
        let stale = stale_value(b"stale body");
        let (mut fetch, result, stats) = new_chain(Some(&stale));

        fetch.response_headers().set_status_code(200);
        assert!(fetch.write(b"fresh body").await);
        fetch.done(true).await;

        let result = result.lock();
        assert!(result.success);
        assert_eq!(result.buffer, b"fresh body");
        assert!(result.response_headers.as_ref().unwrap().lookup1("Warning").is_none());
        assert_eq!(stats.fallback_responses_served.get(), 0);
    }

    #[tokio::test]
    async fn server_error_without_fallback_is_reported() {
        let (mut fetch, result, stats) = new_chain(None);

        fetch.response_headers().set_status_code(503);
        assert!(fetch.write(b"Service Unavailable").await);
        fetch.done(false).await;

        let result = result.lock();
        assert!(!result.success);
        assert_eq!(result.buffer, b"Service Unavailable");
        assert_eq!(result.response_headers.as_ref().unwrap().status_code(), 503);
        assert_eq!(stats.fallback_responses_served.get(), 0);
    }

    #[tokio::test]
    async fn client_error_does_not_trigger_fallback() {
        let stale = stale_value(b"stale body");
        let (mut fetch, result, _stats) = new_chain(Some(&stale));

        fetch.response_headers().set_status_code(404);
        fetch.done(true).await;
        assert_eq!(result.lock().response_headers.as_ref().unwrap().status_code(), 404);
    }
}
