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

//! Conditional revalidation: attach validators from a stale cached copy and,
//! when the origin answers 304, replay the cached body instead of
//! re-downloading it.

use crate::delegate_fetch_headers;
use crate::fetch::{bump, propagate_content_length, AsyncFetch, FetchState};
use crate::stats::FetchStats;
use crate::value::HttpValue;
use async_trait::async_trait;
use log::warn;
use std::sync::Arc;
use velo_http::names;
use velo_http::names::status;

/// A fetch decorator armed with a cached 200 whose validators may spare us
/// the body.
pub struct ConditionalFetch {
    state: FetchState,
    base: Box<dyn AsyncFetch>,
    cached_value: HttpValue,
    serving_cached_value: bool,
    added_conditional_headers: bool,
    stats: Option<Arc<FetchStats>>,
}

impl ConditionalFetch {
    pub fn new(mut base: Box<dyn AsyncFetch>, cached_value: Option<&HttpValue>) -> Self {
        let mut armed = HttpValue::new();
        let mut added = false;
        if let Some(value) = cached_value {
            if !value.empty() {
                added = Self::add_validators(base.as_mut(), value);
                if added {
                    armed.link(value);
                }
            }
        }
        ConditionalFetch {
            state: FetchState::default(),
            base,
            cached_value: armed,
            serving_cached_value: false,
            added_conditional_headers: added,
            stats: None,
        }
    }

    pub fn set_fetch_stats(&mut self, stats: Arc<FetchStats>) {
        self.stats = Some(stats);
    }

    /// Copy the cached entry's validators into the request, unless the
    /// request is already conditional. Etags we synthesized ourselves are
    /// not offered; the origin never issued them.
    fn add_validators(base: &mut (dyn AsyncFetch + '_), cached_value: &HttpValue) -> bool {
        {
            let req = base.request_headers();
            if req.has(names::IF_MODIFIED_SINCE) || req.has(names::IF_NONE_MATCH) {
                return false;
            }
        }
        let options = base.response_headers().http_options();
        let cached_headers = match cached_value.extract_headers(options) {
            Ok(headers) => headers,
            Err(e) => {
                warn!("undecodable cached value, fetching unconditionally: {}", e);
                return false;
            }
        };
        if cached_headers.status_code() != status::OK {
            return false;
        }
        let mut added = false;
        if let Some(etag) = cached_headers.lookup1(names::ETAG) {
            let prefix = crate::ETAG_PREFIX.as_bytes();
            let ours = etag.len() >= prefix.len()
                && etag.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix);
            if !ours && base.request_headers().add(names::IF_NONE_MATCH, etag).is_ok() {
                added = true;
            }
        }
        if let Some(last_modified) = cached_headers.lookup1(names::LAST_MODIFIED) {
            if base
                .request_headers()
                .add(names::IF_MODIFIED_SINCE, last_modified)
                .is_ok()
            {
                added = true;
            }
        }
        added
    }
}

#[async_trait]
impl AsyncFetch for ConditionalFetch {
    delegate_fetch_headers!(base);

    async fn handle_headers_complete(&mut self) {
        if self.added_conditional_headers
            && self.base.response_headers().status_code() == status::NOT_MODIFIED
        {
            let options = self.base.response_headers().http_options();
            if let Ok(cached_headers) = self.cached_value.extract_headers(options) {
                // Serve the cached response; drop the origin's 304 events.
                self.serving_cached_value = true;
                let implicit_cache_ttl_ms =
                    self.base.response_headers().implicit_cache_ttl_ms();
                {
                    let resp = self.base.response_headers();
                    resp.copy_from(&cached_headers);
                    if resp.is_implicitly_cacheable() {
                        // restore the implicit TTL as if freshly fetched
                        resp.set_cache_control_max_age(implicit_cache_ttl_ms);
                        resp.compute_caching();
                    }
                }
                propagate_content_length(&self.state, self.base.as_mut());
                self.base.headers_complete().await;
                let contents = self.cached_value.extract_contents();
                self.base.write(&contents).await;
                self.base.flush().await;
                bump(self.stats.as_deref().map(|s| &s.num_conditional_refreshes));
                return;
            }
        }
        propagate_content_length(&self.state, self.base.as_mut());
        self.base.headers_complete().await;
    }

    async fn handle_write(&mut self, data: &[u8]) -> bool {
        if self.serving_cached_value {
            return true;
        }
        self.base.write(data).await
    }

    async fn handle_flush(&mut self) -> bool {
        if self.serving_cached_value {
            return true;
        }
        self.base.flush().await
    }

    async fn handle_done(self: Box<Self>, success: bool) {
        let serving_cached_value = self.serving_cached_value;
        self.base.done(serving_cached_value || success).await;
    }
}
