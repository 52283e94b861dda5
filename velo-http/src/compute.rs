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

//! The cacheability computer: a pure, lazily-memoized view over a status
//! code and a header set that answers the questions `compute_caching`
//! needs. It deliberately allows only a hand-picked set of status codes to
//! be cacheable; many codes are technically cacheable per RFC but only
//! based on input headers this proxy does not track.

use crate::cache_control::{CacheControl, DirectiveResult};
use crate::content_type::{determine_content_type, ContentType};
use crate::headers::HeaderSet;
use crate::names;
use crate::names::status;
use crate::time::{parse_http_date_ms, SECOND_MS};

#[derive(Default)]
struct ParsedDirectives {
    public_: bool,
    private_: bool,
    no_cache: bool,
    no_store: bool,
    must_revalidate: bool,
    proxy_revalidate: bool,
    max_age_sec: Option<i64>,
    expires_ms: Option<i64>,
    expires_invalid: bool,
}

/// Computes cacheability for one response. Create one per computation; the
/// getters memoize so repeated queries stay cheap.
pub struct CachingComputer<'a> {
    status_code: u16,
    headers: &'a HeaderSet,
    url: &'a str,
    parsed: Option<ParsedDirectives>,
    is_cacheable: Option<bool>,
    is_heuristically_cacheable: Option<bool>,
    // (has explicit freshness lifetime, lifetime ms)
    freshness: Option<(bool, i64)>,
    has_explicit_no_cache: Option<bool>,
}

impl<'a> CachingComputer<'a> {
    pub fn new(status_code: u16, headers: &'a HeaderSet) -> Self {
        CachingComputer {
            status_code,
            headers,
            url: "",
            parsed: None,
            is_cacheable: None,
            is_heuristically_cacheable: None,
            freshness: None,
            has_explicit_no_cache: None,
        }
    }

    /// Attach the request URL. Responses to query URLs are not
    /// heuristically cacheable per RFC 7234.
    pub fn with_url(mut self, url: &'a str) -> Self {
        self.url = url;
        self
    }

    fn parsed(&mut self) -> &ParsedDirectives {
        if self.parsed.is_none() {
            let mut p = ParsedDirectives::default();
            if let Some(cc) = CacheControl::from_headers(self.headers) {
                p.public_ = cc.public();
                p.private_ = cc.private();
                p.no_cache = cc.no_cache();
                p.no_store = cc.no_store();
                p.must_revalidate = cc.must_revalidate();
                p.proxy_revalidate = cc.proxy_revalidate();
                p.max_age_sec = match cc.max_age() {
                    DirectiveResult::Value(v) => Some(v),
                    _ => None,
                };
            }
            let expires = self.headers.lookup(names::EXPIRES);
            if let Some(first) = expires.first() {
                match parse_http_date_ms(first) {
                    Some(ms) => p.expires_ms = Some(ms),
                    None => p.expires_invalid = true,
                }
            }
            self.parsed = Some(p);
        }
        self.parsed.as_ref().unwrap()
    }

    /// Whether the response may be cached at all (browser semantics).
    pub fn is_cacheable(&mut self) -> bool {
        if self.is_cacheable.is_none() {
            let v = self.compute_is_cacheable();
            self.is_cacheable = Some(v);
        }
        self.is_cacheable.unwrap()
    }

    /// Whether a shared cache may store the response. Note that a full
    /// proxy-cacheability answer also involves the request (Authorization,
    /// Vary); those checks live on `ResponseHeaders::is_proxy_cacheable`.
    pub fn is_proxy_cacheable(&mut self) -> bool {
        let cacheable = self.is_cacheable();
        cacheable && !self.parsed().private_
    }

    pub fn must_revalidate(&mut self) -> bool {
        self.parsed().must_revalidate
    }

    pub fn proxy_revalidate(&mut self) -> bool {
        self.parsed().proxy_revalidate
    }

    /// (has an explicit freshness lifetime, that lifetime in ms).
    pub fn freshness_lifetime_ms(&mut self) -> (bool, i64) {
        if self.freshness.is_none() {
            let v = self.compute_freshness_lifetime_ms();
            self.freshness = Some(v);
        }
        self.freshness.unwrap()
    }

    pub fn has_explicit_freshness_lifetime(&mut self) -> bool {
        self.freshness_lifetime_ms().0
    }

    /// Explicitly cacheable: an explicit, positive freshness lifetime.
    pub fn is_explicitly_cacheable(&mut self) -> bool {
        let (explicit, lifetime) = self.freshness_lifetime_ms();
        explicit && lifetime > 0
    }

    pub fn has_explicit_no_cache_directive(&mut self) -> bool {
        if self.has_explicit_no_cache.is_none() {
            let v = self.compute_has_explicit_no_cache_directive();
            self.has_explicit_no_cache = Some(v);
        }
        self.has_explicit_no_cache.unwrap()
    }

    /// Only 200, 301 and the reserved failure-memoization range may be
    /// stored. 302/307 are excluded on purpose: webmasters who want a
    /// redirect cached use 301.
    pub fn is_allowed_cacheable_status_code(&self) -> bool {
        match self.status_code {
            status::OK | status::MOVED_PERMANENTLY => true,
            c => status::is_remember_failure(c),
        }
    }

    /// 3xx redirects excluding 304.
    pub fn is_redirect_status_code(&self) -> bool {
        matches!(self.status_code, 301 | 302 | 303 | 307)
    }

    /// Content-type based hint that the resource is probably a static asset.
    pub fn is_likely_static_resource_type(&self) -> bool {
        if self.is_redirect_status_code() {
            return true; // redirects are cacheable
        }
        determine_content_type(self.headers).is_some_and(ContentType::is_likely_static_resource)
    }

    fn compute_is_cacheable(&mut self) -> bool {
        let (explicit, lifetime) = self.freshness_lifetime_ms();
        if explicit {
            // An explicitly stale resource is not cacheable.
            return lifetime > 0;
        }
        self.is_heuristically_cacheable()
    }

    fn is_heuristically_cacheable(&mut self) -> bool {
        if self.is_heuristically_cacheable.is_none() {
            let v = self.compute_is_heuristically_cacheable();
            self.is_heuristically_cacheable = Some(v);
        }
        self.is_heuristically_cacheable.unwrap()
    }

    fn compute_is_heuristically_cacheable(&mut self) -> bool {
        if self.has_explicit_freshness_lifetime() {
            debug_assert!(false, "heuristic check on explicit freshness lifetime");
            return false;
        }
        if self.parsed().must_revalidate {
            return false;
        }
        // RFC 7234: responses to query URLs must not be treated as fresh
        // without an explicit expiration.
        if self.url.contains('?') {
            return false;
        }
        if !self.is_allowed_cacheable_status_code() {
            return false;
        }
        self.is_likely_static_resource_type()
    }

    fn compute_freshness_lifetime_ms(&mut self) -> (bool, i64) {
        if self.has_explicit_no_cache_directive() {
            // never fresh
            return (true, 0);
        }
        // Cache-Control: max-age takes precedence over Expires.
        if let Some(max_age) = self.parsed().max_age_sec {
            return (true, max_age.saturating_mul(SECOND_MS));
        }
        let expires_ms = match self.parsed().expires_ms {
            Some(ms) => ms,
            // No max-age and no parseable Expires: no explicit lifetime.
            None => return (false, 0),
        };
        // An Expires header only means something relative to a single valid
        // Date header.
        let date = self.headers.lookup(names::DATE);
        let date_ms = if date.len() == 1 {
            parse_http_date_ms(date[0])
        } else {
            None
        };
        let Some(date_ms) = date_ms else {
            return (false, 0);
        };
        (true, (expires_ms - date_ms).max(0))
    }

    fn compute_has_explicit_no_cache_directive(&mut self) -> bool {
        let explicit = {
            let p = self.parsed();
            p.no_cache || p.no_store || p.max_age_sec.is_some_and(|v| v <= 0) || p.expires_invalid
        };
        if explicit {
            return true;
        }
        if self.headers.has_value(names::PRAGMA, "no-cache") {
            return true;
        }
        if self.headers.has_value(names::VARY, "*") {
            return true;
        }
        false
    }
}
