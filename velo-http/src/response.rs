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

//! The response header model with centrally computed caching information.
//!
//! Cacheability is embodied in the headers but parsed in one place so we can
//! try to get it right. Every computed field is guarded by a dirty bit: any
//! mutation that could affect cacheability sets it, and reading a computed
//! field while dirty is a contract violation (fatal in debug builds, a
//! stale read in release builds). Callers that mutate and re-read must call
//! [ResponseHeaders::compute_caching] in between.

use crate::compute::CachingComputer;
use crate::content_type::{determine_content_type, ContentType};
use crate::cookies;
use crate::headers::HeaderSet;
use crate::names;
use crate::names::status;
use crate::time::{format_http_date_ms, parse_http_date_ms, MINUTE_MS, SECOND_MS};
use crate::url;
use bytes::BufMut;
use log::warn;
use velo_error::{Error, ErrorType::*, Result};

/// Cache lifetime assumed for responses that carry no explicit freshness.
pub const IMPLICIT_CACHE_TTL_MS: i64 = 5 * MINUTE_MS;

/// How far in the future a `Date` header may sit before we correct it.
pub const MAX_ALLOWED_DATE_DRIFT_MS: i64 = 3 * MINUTE_MS;

// An entry within this tail fraction of its freshness lifetime is worth
// refreshing proactively.
const REFRESH_EXPIRE_PERCENT: i64 = 80;

/// Per-response knobs, fixed at construction.
#[derive(Debug, Clone, Copy)]
pub struct HttpOptions {
    pub respect_vary: bool,
    pub implicit_cache_ttl_ms: i64,
}

impl Default for HttpOptions {
    fn default() -> Self {
        HttpOptions {
            respect_vary: false,
            implicit_cache_ttl_ms: IMPLICIT_CACHE_TTL_MS,
        }
    }
}

/// Whether arbitrary `Vary` headers on non-HTML resources disable caching.
/// `Vary: Accept-Encoding` is always ignored and `Vary: Cookie` is always
/// respected, independent of this option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaryOption {
    RespectVaryOnResources,
    IgnoreVaryOnResources,
}

impl VaryOption {
    pub fn from_respect_vary(respect_vary: bool) -> Self {
        if respect_vary {
            VaryOption::RespectVaryOnResources
        } else {
            VaryOption::IgnoreVaryOnResources
        }
    }
}

/// Whether the request this decision serves can revalidate a stale answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidatorOption {
    HasValidator,
    NoValidator,
}

#[derive(Debug, Clone, Default)]
struct CacheFields {
    browser_cacheable: bool,
    proxy_cacheable: bool,
    requires_browser_revalidation: bool,
    requires_proxy_revalidation: bool,
    date_ms: Option<i64>,
    last_modified_ms: Option<i64>,
    expiration_time_ms: i64,
    cache_ttl_ms: i64,
    is_implicitly_cacheable: bool,
}

/// HTTP response headers plus parsed first line and computed cache fields.
#[derive(Debug, Clone)]
pub struct ResponseHeaders {
    major_version: u8,
    minor_version: u8,
    status_code: u16,
    reason_phrase: String,
    headers: HeaderSet,
    http_options: HttpOptions,
    force_cache_ttl_ms: i64,
    force_cached: bool,
    cache_fields_dirty: bool,
    cache: CacheFields,
}

impl Default for ResponseHeaders {
    fn default() -> Self {
        Self::new(HttpOptions::default())
    }
}

impl ResponseHeaders {
    pub fn new(http_options: HttpOptions) -> Self {
        ResponseHeaders {
            major_version: 1,
            minor_version: 1,
            status_code: 0,
            reason_phrase: String::new(),
            headers: HeaderSet::new(),
            http_options,
            force_cache_ttl_ms: -1,
            force_cached: false,
            cache_fields_dirty: false,
            cache: CacheFields::default(),
        }
    }

    /// Parse a serialized header block: first line, then `Name: value`
    /// lines. The cache fields are left dirty.
    pub fn from_http_block(block: &str, http_options: HttpOptions) -> Result<Self> {
        let mut resp = Self::new(http_options);
        let mut lines = block.splitn(2, "\r\n");
        let first = lines
            .next()
            .ok_or_else(|| Error::explain(InvalidHTTPHeader, "empty header block"))?;
        resp.parse_first_line(first);
        if resp.status_code == 0 {
            return Error::e_explain(InvalidHTTPHeader, "bad response first line");
        }
        if let Some(rest) = lines.next() {
            resp.headers.parse_lines(rest)?;
        }
        resp.cache_fields_dirty = true;
        Ok(resp)
    }

    /* first line */

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn set_status_code(&mut self, code: u16) {
        self.status_code = code;
        self.cache_fields_dirty = true;
    }

    pub fn has_status_code(&self) -> bool {
        self.status_code != 0
    }

    pub fn reason_phrase(&self) -> &str {
        if self.reason_phrase.is_empty() {
            status::reason_phrase(self.status_code)
        } else {
            &self.reason_phrase
        }
    }

    pub fn set_reason_phrase(&mut self, reason: &str) {
        self.reason_phrase = reason.to_string();
    }

    pub fn version(&self) -> (u8, u8) {
        (self.major_version, self.minor_version)
    }

    pub fn set_first_line(&mut self, major: u8, minor: u8, status_code: u16, reason: &str) {
        self.major_version = major;
        self.minor_version = minor;
        self.set_status_code(status_code);
        self.set_reason_phrase(reason);
    }

    /// Parse `HTTP/<major>.<minor> <status> <reason>`. A malformed line is
    /// logged and leaves the affected fields unset.
    pub fn parse_first_line(&mut self, first_line: &str) {
        let mut parts = first_line.trim_end().splitn(3, ' ');
        let proto = parts.next().unwrap_or("");
        match proto
            .strip_prefix("HTTP/")
            .and_then(|v| v.split_once('.'))
            .and_then(|(maj, min)| Some((maj.parse::<u8>().ok()?, min.parse::<u8>().ok()?)))
        {
            Some((major, minor)) => {
                self.major_version = major;
                self.minor_version = minor;
            }
            None => warn!("unparseable HTTP version in first line: {}", first_line),
        }
        match parts.next().and_then(|s| s.parse::<u16>().ok()) {
            Some(code) => self.set_status_code(code),
            None => warn!("unparseable status code in first line: {}", first_line),
        }
        self.reason_phrase = parts.next().unwrap_or("").to_string();
    }

    /* raw header access; mutations set the dirty bit */

    pub fn headers(&self) -> &HeaderSet {
        &self.headers
    }

    pub fn add(&mut self, name: &str, value: &str) -> Result<()> {
        self.cache_fields_dirty = true;
        self.headers.add(name, value)
    }

    pub fn replace(&mut self, name: &str, value: &str) -> Result<()> {
        self.cache_fields_dirty = true;
        self.headers.replace(name, value)
    }

    pub fn remove_all(&mut self, name: &str) -> bool {
        let removed = self.headers.remove_all(name);
        if removed {
            self.cache_fields_dirty = true;
        }
        removed
    }

    pub fn remove(&mut self, name: &str, value: &str) -> bool {
        let removed = self.headers.remove(name, value);
        if removed {
            self.cache_fields_dirty = true;
        }
        removed
    }

    pub fn lookup(&self, name: &str) -> Vec<&str> {
        self.headers.lookup(name)
    }

    pub fn lookup1(&self, name: &str) -> Option<&str> {
        self.headers.lookup1(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.headers.has(name)
    }

    pub fn has_value(&self, name: &str, token: &str) -> bool {
        self.headers.has_value(name, token)
    }

    /// Replace this object wholesale with a copy of `other`, including its
    /// computed fields and dirty state.
    pub fn copy_from(&mut self, other: &ResponseHeaders) {
        *self = other.clone();
    }

    pub fn clear(&mut self) {
        self.headers.clear();
        self.major_version = 1;
        self.minor_version = 1;
        self.status_code = 0;
        self.reason_phrase.clear();
        self.force_cache_ttl_ms = -1;
        self.force_cached = false;
        self.cache = CacheFields::default();
        self.cache_fields_dirty = false;
    }

    pub fn http_options(&self) -> HttpOptions {
        self.http_options
    }

    pub fn implicit_cache_ttl_ms(&self) -> i64 {
        self.http_options.implicit_cache_ttl_ms
    }

    /* serialization */

    /// Serialize as `HTTP/<major>.<minor> <status> <reason>` followed by all
    /// header lines and a final blank line.
    pub fn write_as_http(&self, buf: &mut impl BufMut) {
        buf.put_slice(
            format!(
                "HTTP/{}.{} {} {}\r\n",
                self.major_version,
                self.minor_version,
                self.status_code,
                self.reason_phrase()
            )
            .as_bytes(),
        );
        self.headers.write_http(buf);
        buf.put_slice(b"\r\n");
    }

    pub fn to_http_string(&self) -> String {
        let mut buf: Vec<u8> = Vec::with_capacity(self.size_estimate() as usize);
        self.write_as_http(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Bytes this header block will occupy on the wire.
    pub fn size_estimate(&self) -> i64 {
        let mut len = "HTTP/1.x 123 ".len() + self.reason_phrase().len() + 2;
        for (name, value) in self.headers.iter() {
            len += name.len() + 2 + value.len() + 2;
        }
        (len + 2) as i64
    }

    /* computed cache fields */

    #[inline]
    fn assert_clean(&self, what: &str) {
        debug_assert!(
            !self.cache_fields_dirty,
            "call compute_caching() before {}",
            what
        );
    }

    /// Recompute the cache fields from the headers and clear the dirty bit.
    /// Idempotent: a clean header set is left untouched.
    pub fn compute_caching(&mut self) {
        if !self.cache_fields_dirty {
            return;
        }
        self.cache = CacheFields::default();
        self.cache.date_ms = self.headers.lookup1(names::DATE).and_then(parse_http_date_ms);
        self.cache.last_modified_ms = self
            .headers
            .lookup1(names::LAST_MODIFIED)
            .and_then(parse_http_date_ms);

        let content_type = determine_content_type(&self.headers);
        let html_like = content_type.is_some_and(ContentType::is_html_like);

        let (allowed_status, redirect, is_cacheable, is_proxy_cacheable, explicitly_cacheable,
             freshness_ms, must_revalidate, proxy_revalidate) = {
            let mut computer = CachingComputer::new(self.status_code, &self.headers);
            (
                computer.is_allowed_cacheable_status_code(),
                computer.is_redirect_status_code(),
                computer.is_cacheable(),
                computer.is_proxy_cacheable(),
                computer.is_explicitly_cacheable(),
                computer.freshness_lifetime_ms().1,
                computer.must_revalidate(),
                computer.proxy_revalidate(),
            )
        };

        // Force-caching only ever applies to non-HTML 200s.
        let force_caching_enabled =
            self.force_cache_ttl_ms > 0 && self.status_code == status::OK && !html_like;

        self.cache.browser_cacheable = self.cache.date_ms.is_some()
            && allowed_status
            && (force_caching_enabled || is_cacheable);
        self.cache.requires_browser_revalidation = must_revalidate;
        self.cache.requires_proxy_revalidation = proxy_revalidate || must_revalidate;

        if self.cache.browser_cacheable {
            let date_ms = self.cache.date_ms.unwrap_or(0);
            let mut cache_ttl_ms = self.http_options.implicit_cache_ttl_ms;
            if explicitly_cacheable {
                cache_ttl_ms = freshness_ms;
            }
            if force_caching_enabled
                && (self.force_cache_ttl_ms > cache_ttl_ms || !is_proxy_cacheable)
            {
                // Force-cached only when the forced TTL beats the origin's,
                // or the origin response was not proxy-cacheable at all.
                cache_ttl_ms = self.force_cache_ttl_ms;
                self.force_cached = true;
            }
            self.cache.cache_ttl_ms = cache_ttl_ms;
            self.cache.expiration_time_ms = date_ms + cache_ttl_ms;
            let mut proxy_cacheable = self.force_cached || is_proxy_cacheable;

            // Never cache HTML or redirects that set cookies, whatever their
            // caching directives say. Misconfigured origins routinely mark
            // user-specific pages cacheable.
            if (html_like || redirect)
                && (self.headers.has(names::SET_COOKIE) || self.headers.has(names::SET_COOKIE2))
            {
                proxy_cacheable = false;
            }
            self.cache.proxy_cacheable = proxy_cacheable;

            if proxy_cacheable && !self.force_cached && !explicitly_cacheable {
                // Proxy-cacheable purely by heuristics: synthesize explicit
                // headers so downstream caches agree with us.
                self.cache.is_implicitly_cacheable = true;
                let preserve = self.cache_control_values_to_preserve();
                self.set_date_and_caching_with_suffix(date_ms, cache_ttl_ms, &preserve);
            }
        } else {
            self.cache.expiration_time_ms = 0;
            self.cache.proxy_cacheable = false;
        }
        self.cache_fields_dirty = false;
    }

    pub fn is_browser_cacheable(&self) -> bool {
        self.assert_clean("is_browser_cacheable");
        self.cache.browser_cacheable
    }

    pub fn requires_browser_revalidation(&self) -> bool {
        self.assert_clean("requires_browser_revalidation");
        self.cache.requires_browser_revalidation
    }

    pub fn requires_proxy_revalidation(&self) -> bool {
        self.assert_clean("requires_proxy_revalidation");
        self.cache.requires_proxy_revalidation
    }

    pub fn has_date_ms(&self) -> bool {
        self.assert_clean("has_date_ms");
        self.cache.date_ms.is_some()
    }

    pub fn date_ms(&self) -> i64 {
        self.assert_clean("date_ms");
        self.cache.date_ms.unwrap_or(0)
    }

    pub fn last_modified_time_ms(&self) -> Option<i64> {
        self.assert_clean("last_modified_time_ms");
        self.cache.last_modified_ms
    }

    pub fn cache_ttl_ms(&self) -> i64 {
        self.assert_clean("cache_ttl_ms");
        self.cache.cache_ttl_ms
    }

    /// The ms-since-epoch time when this response expires out of caches.
    pub fn cache_expiration_time_ms(&self) -> i64 {
        self.assert_clean("cache_expiration_time_ms");
        self.cache.expiration_time_ms
    }

    pub fn is_implicitly_cacheable(&self) -> bool {
        self.assert_clean("is_implicitly_cacheable");
        self.cache.is_implicitly_cacheable
    }

    /// Whether a shared cache may store and re-serve this response for a
    /// request with the given properties.
    pub fn is_proxy_cacheable(
        &self,
        req_properties: crate::request::RequestProperties,
        respect_vary: VaryOption,
        validator: ValidatorOption,
    ) -> bool {
        self.assert_clean("is_proxy_cacheable");
        if !self.cache.proxy_cacheable {
            return false;
        }

        // A response to an authorized request is only proxy-cacheable when
        // the origin opted in with Cache-Control: public (RFC 7234 3.2).
        if req_properties.has_authorization
            && !self.headers.has_value(names::CACHE_CONTROL, "public")
        {
            return false;
        }

        let html_like = self.is_html_like();
        for line in self.headers.lookup(names::VARY) {
            for token in line.split(',') {
                let val = token.trim();
                if val.is_empty() || val.eq_ignore_ascii_case(names::ACCEPT_ENCODING) {
                    // the cache stores one canonical encoding
                    continue;
                }
                if val.eq_ignore_ascii_case(names::COOKIE) {
                    // Vary:Cookie HTML may be served as long as the request
                    // has no cookie and a validator lets us revalidate;
                    // resources never qualify.
                    if req_properties.has_cookie
                        || !html_like
                        || validator == ValidatorOption::NoValidator
                    {
                        return false;
                    }
                } else if val.eq_ignore_ascii_case(names::COOKIE2) {
                    if req_properties.has_cookie2
                        || !html_like
                        || validator == ValidatorOption::NoValidator
                    {
                        return false;
                    }
                } else if respect_vary == VaryOption::RespectVaryOnResources || html_like {
                    return false;
                }
            }
        }
        true
    }

    /* date bookkeeping */

    pub fn set_date(&mut self, date_ms: i64) {
        self.set_time_header(names::DATE, date_ms);
    }

    pub fn set_last_modified(&mut self, time_ms: i64) {
        self.set_time_header(names::LAST_MODIFIED, time_ms);
    }

    pub fn set_time_header(&mut self, name: &str, time_ms: i64) {
        // formatted dates are always valid header values
        let _ = self.replace(name, &format_http_date_ms(time_ms));
    }

    /// If `Date` is missing, in the past, or too far in the future, reset it
    /// to `now_ms` and shift `Expires` by the same delta. The dirty-bit value
    /// on entry is preserved.
    pub fn fix_date_headers(&mut self, now_ms: i64) {
        let date_ms = if self.cache_fields_dirty {
            // Don't pay for a full compute_caching just to read the date.
            self.headers.lookup1(names::DATE).and_then(parse_http_date_ms)
        } else {
            self.cache.date_ms
        };

        let needs_fix = match date_ms {
            None => true,
            Some(d) => d < now_ms || d > now_ms + MAX_ALLOWED_DATE_DRIFT_MS,
        };
        if !needs_fix {
            return;
        }
        let recompute = !self.cache_fields_dirty;
        self.set_date(now_ms);
        match date_ms {
            Some(old) => self.apply_time_delta(names::EXPIRES, now_ms - old),
            // Without a Date there is no rationality to an Expires.
            None => {
                self.remove_all(names::EXPIRES);
            }
        }
        if recompute {
            self.compute_caching();
        }
    }

    fn apply_time_delta(&mut self, name: &str, delta_ms: i64) {
        if let Some(old) = self.headers.lookup1(name).and_then(parse_http_date_ms) {
            self.set_time_header(name, old + delta_ms);
        }
    }

    /// Whether the entry is close enough to expiry to be worth refreshing
    /// proactively, so low-traffic sites don't keep serving unoptimized
    /// content every implicit-TTL window.
    pub fn is_imminently_expiring(
        start_date_ms: i64,
        expire_ms: i64,
        now_ms: i64,
        http_options: &HttpOptions,
    ) -> bool {
        let ttl_ms = expire_ms - start_date_ms;
        if ttl_ms < http_options.implicit_cache_ttl_ms {
            return false;
        }
        let freshen_threshold = std::cmp::min(
            http_options.implicit_cache_ttl_ms,
            ((100 - REFRESH_EXPIRE_PERCENT) * ttl_ms) / 100,
        );
        expire_ms - now_ms < freshen_threshold
    }

    /* cache-control editing */

    /// Set `Date`, `Expires` and `Cache-Control: max-age=` together. Both
    /// Expires and max-age are set so HTTP/1.0 intermediaries cache
    /// correctly.
    pub fn set_date_and_caching(&mut self, date_ms: i64, ttl_ms: i64) {
        self.set_date_and_caching_with_suffix(date_ms, ttl_ms, "");
    }

    fn set_date_and_caching_with_suffix(&mut self, date_ms: i64, ttl_ms: i64, suffix: &str) {
        self.set_date(date_ms);
        self.set_time_header(names::EXPIRES, date_ms + ttl_ms);
        let value = format!("max-age={}{}", ttl_ms / SECOND_MS, suffix);
        let _ = self.replace(names::CACHE_CONTROL, &value);
    }

    /// The Cache-Control tokens that survive a rewrite of the caching
    /// headers: `no-transform`, `no-store` and any `s-maxage=`.
    pub fn cache_control_values_to_preserve(&self) -> String {
        let mut to_preserve = String::new();
        if self.headers.has_value(names::CACHE_CONTROL, "no-transform") {
            to_preserve.push_str(", no-transform");
        }
        if self.headers.has_value(names::CACHE_CONTROL, "no-store") {
            to_preserve.push_str(", no-store");
        }
        for line in self.headers.lookup(names::CACHE_CONTROL) {
            for token in line.split(',') {
                let token = token.trim();
                if token.len() >= 9 && token[..9].eq_ignore_ascii_case("s-maxage=") {
                    to_preserve.push_str(", ");
                    to_preserve.push_str(token);
                }
            }
        }
        to_preserve
    }

    /// Rewrite the `max-age=` token in place (dropping pre-existing
    /// max-ages) and update `Expires` to match. Requires clean cache fields
    /// on entry to read the date; recomputes before returning when entered
    /// clean.
    pub fn set_cache_control_max_age(&mut self, ttl_ms: i64) {
        let recompute = !self.cache_fields_dirty;
        let date_ms = if self.cache_fields_dirty {
            self.headers
                .lookup1(names::DATE)
                .and_then(parse_http_date_ms)
                .unwrap_or(0)
        } else {
            self.date_ms()
        };
        self.set_time_header(names::EXPIRES, date_ms + ttl_ms);

        let mut new_value = format!("max-age={}", ttl_ms / SECOND_MS);
        let existing: Vec<String> = self
            .headers
            .lookup(names::CACHE_CONTROL)
            .iter()
            .flat_map(|line| line.split(','))
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        for token in existing {
            if !token.to_ascii_lowercase().starts_with("max-age") {
                new_value.push(',');
                new_value.push_str(&token);
            }
        }
        let _ = self.replace(names::CACHE_CONTROL, &new_value);
        if recompute {
            self.compute_caching();
        }
    }

    /// Conservatively lower (never raise) the shared-cache TTL via
    /// `s-maxage`. Makes no change when the response is `no-transform`,
    /// `no-cache`, `no-store` or `private`, or when existing directives are
    /// already at least as strict.
    pub fn set_s_max_age(&mut self, s_maxage_sec: i64) {
        let existing = self
            .headers
            .lookup(names::CACHE_CONTROL)
            .join(", ");
        if let Some(updated) = Self::apply_s_max_age(s_maxage_sec, &existing) {
            let _ = self.replace(names::CACHE_CONTROL, &updated);
        }
    }

    /// The s-maxage rewrite rule on a raw Cache-Control string. `None` means
    /// no change should be made.
    pub fn apply_s_max_age(s_maxage_sec: i64, existing_cache_control: &str) -> Option<String> {
        let existing = existing_cache_control.trim();
        let s_maxage_str = format!("s-maxage={}", s_maxage_sec);
        if existing.is_empty() {
            return Some(s_maxage_str);
        }

        let mut segments: Vec<String> = existing
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        for segment in &segments {
            if segment.eq_ignore_ascii_case("no-transform") {
                // not allowed to touch this response
                return None;
            }
            if segment.eq_ignore_ascii_case("no-cache")
                || segment.eq_ignore_ascii_case("no-store")
                || segment.eq_ignore_ascii_case("private")
            {
                // adding s-maxage could confuse a shared cache into storing
                return None;
            }
        }

        // Update any existing s-maxage values individually, only downwards.
        let mut found_existing_s_maxage = false;
        let mut updated_existing_s_maxage = false;
        for segment in segments.iter_mut() {
            let lower = segment.to_ascii_lowercase();
            if let Some(value_str) = lower.strip_prefix("s-maxage=") {
                found_existing_s_maxage = true;
                match value_str.parse::<i64>() {
                    Ok(existing_value) if existing_value > s_maxage_sec => {
                        *segment = s_maxage_str.clone();
                        updated_existing_s_maxage = true;
                    }
                    _ => {} // small enough, or unparseable: leave it alone
                }
            }
        }
        if found_existing_s_maxage {
            return updated_existing_s_maxage.then(|| segments.join(", "));
        }

        // No s-maxage; only add one if it is lower than every max-age.
        let mut lowest_max_age = s_maxage_sec + 1;
        let mut found_max_age = false;
        for segment in &segments {
            let lower = segment.to_ascii_lowercase();
            if let Some(value_str) = lower.strip_prefix("max-age=") {
                found_max_age = true;
                if let Ok(v) = value_str.parse::<i64>() {
                    lowest_max_age = lowest_max_age.min(v);
                }
            }
        }
        if found_max_age && lowest_max_age <= s_maxage_sec {
            return None;
        }
        Some(format!("{}, {}", existing, s_maxage_str))
    }

    /// Add `public` to Cache-Control unless a directive already pins the
    /// response's cacheability one way or the other. Adding `public` to a
    /// non-private policy does not change any computed field, so the dirty
    /// bit is unchanged across this call.
    pub fn set_cache_control_public(&mut self) {
        for token in ["private", "public", "no-cache", "no-store"] {
            if self.headers.has_value(names::CACHE_CONTROL, token) {
                return;
            }
        }
        let existing = self.headers.lookup(names::CACHE_CONTROL).join(", ");
        let new_value = if existing.is_empty() {
            "public".to_string()
        } else {
            format!("{}, public", existing)
        };
        let dirty = self.cache_fields_dirty;
        let _ = self.replace(names::CACHE_CONTROL, &new_value);
        self.cache_fields_dirty = dirty;
    }

    /* force caching */

    /// Treat this response as cacheable for `ttl_ms` even if the origin said
    /// otherwise (subject to the rules in compute_caching).
    pub fn force_caching(&mut self, ttl_ms: i64) {
        if ttl_ms > 0 {
            let recompute = !self.cache_fields_dirty;
            self.force_cache_ttl_ms = ttl_ms;
            self.cache_fields_dirty = true;
            if recompute {
                self.compute_caching();
            }
        }
    }

    pub fn force_cached(&self) -> bool {
        self.force_cached
    }

    pub fn force_cache_ttl_ms(&self) -> i64 {
        self.force_cache_ttl_ms
    }

    /// If this response was promoted by force-caching, rewrite its visible
    /// headers to match the promoted TTL. Returns whether headers changed.
    pub fn update_cache_headers_if_force_cached(&mut self) -> bool {
        if self.cache_fields_dirty {
            debug_assert!(
                false,
                "call compute_caching() before update_cache_headers_if_force_cached"
            );
            return false;
        }
        if !self.force_cached {
            return false;
        }
        let date_ms = self.date_ms();
        let ttl_ms = self.cache_ttl_ms();
        self.remove_all(names::PRAGMA);
        self.remove_all(names::CACHE_CONTROL);
        self.set_date_and_caching(date_ms, ttl_ms);
        self.compute_caching();
        true
    }

    /* sanitization */

    /// Whether a `Connection:` token marks a header for removal. Connection
    /// options (`keep-alive`, `close`, `timeout=`, `max=`) and well-known
    /// end-to-end headers never do.
    pub fn is_hop_by_hop_indication(val: &str) -> bool {
        if val.is_empty()
            || val.eq_ignore_ascii_case("keep-alive")
            || val.eq_ignore_ascii_case("close")
        {
            return false;
        }
        let lower = val.to_ascii_lowercase();
        if lower.starts_with("timeout=") || lower.starts_with("max=") {
            return false;
        }
        !names::in_sorted_headers(val, names::END_TO_END_HEADERS)
    }

    /// Remove hop-by-hop headers (both the fixed RFC 7230 set and anything
    /// listed in `Connection:`) and cookies. Returns whether anything was
    /// removed.
    pub fn sanitize(&mut self) -> bool {
        let mut changed = false;
        let connection_tokens: Vec<String> = self
            .headers
            .lookup(names::CONNECTION)
            .iter()
            .flat_map(|line| line.split(','))
            .map(|t| t.trim().to_string())
            .filter(|t| Self::is_hop_by_hop_indication(t))
            .collect();
        for token in connection_tokens {
            changed = self.remove_all(&token) || changed;
        }
        for name in names::HOP_BY_HOP_HEADERS {
            changed = self.remove_all(name) || changed;
        }
        changed
    }

    /// A sanitized copy, leaving this object untouched. For callers that
    /// serialize a clean view while still forwarding the original.
    pub fn get_sanitized(&self) -> ResponseHeaders {
        let mut copy = self.clone();
        copy.sanitize();
        copy.compute_caching();
        copy
    }

    /* content inspection */

    pub fn determine_content_type(&self) -> Option<&'static ContentType> {
        determine_content_type(&self.headers)
    }

    pub fn is_html_like(&self) -> bool {
        self.determine_content_type()
            .is_some_and(ContentType::is_html_like)
    }

    /// Whether any `Content-Encoding` value is gzip.
    pub fn is_gzipped(&self) -> bool {
        self.headers
            .lookup(names::CONTENT_ENCODING)
            .iter()
            .any(|v| v.trim().eq_ignore_ascii_case("gzip"))
    }

    /// Whether the outermost (last-applied) content coding is gzip.
    pub fn was_gzipped_last(&self) -> bool {
        self.last_content_encoding()
            .is_some_and(|v| v.eq_ignore_ascii_case("gzip"))
    }

    /// The last token of the last `Content-Encoding` header, if any.
    pub fn last_content_encoding(&self) -> Option<String> {
        self.headers
            .lookup(names::CONTENT_ENCODING)
            .last()
            .and_then(|line| line.split(',').next_back())
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }

    pub fn find_content_length(&self) -> Option<i64> {
        self.headers
            .lookup1(names::CONTENT_LENGTH)
            .and_then(|v| v.parse::<i64>().ok())
    }

    /// Set `Content-Length`, dropping a matching `X-Original-Content-Length`
    /// (serving an entry inflated means the two coincide again; a minified
    /// body keeps its original length as evidence of the savings). Does not
    /// affect cacheability, so the dirty bit is unchanged.
    pub fn set_content_length(&mut self, content_length: i64) {
        let dirty = self.cache_fields_dirty;
        let value = content_length.to_string();
        self.headers.remove(names::X_ORIGINAL_CONTENT_LENGTH, &value);
        let _ = self.headers.replace(names::CONTENT_LENGTH, &value);
        self.cache_fields_dirty = dirty;
    }

    /// Record the pre-compression body size, first writer wins.
    pub fn set_original_content_length(&mut self, content_length: i64) {
        if !self.headers.has(names::X_ORIGINAL_CONTENT_LENGTH) {
            let dirty = self.cache_fields_dirty;
            let _ = self
                .headers
                .add(names::X_ORIGINAL_CONTENT_LENGTH, &content_length.to_string());
            self.cache_fields_dirty = dirty;
        }
    }

    /// Replace the media type while keeping an existing charset parameter.
    /// Returns whether the resulting type is one we recognize.
    pub fn merge_content_type(&mut self, content_type: &str) -> bool {
        let charset = self
            .headers
            .lookup(names::CONTENT_TYPE)
            .last()
            .and_then(|v| {
                v.split(';')
                    .map(str::trim)
                    .find(|p| p.to_ascii_lowercase().starts_with("charset="))
                    .map(str::to_string)
            });
        let new_value = match charset {
            Some(cs) if !content_type.to_ascii_lowercase().contains("charset=") => {
                format!("{}; {}", content_type, cs)
            }
            _ => content_type.to_string(),
        };
        let _ = self.replace(names::CONTENT_TYPE, &new_value);
        ContentType::from_mime(content_type).is_some()
    }

    /* link and cookie helpers */

    /// Whether a `Link: <...>; rel="canonical"` header is present.
    pub fn has_link_rel_canonical(&self) -> bool {
        self.headers.lookup(names::LINK).iter().any(|link| {
            match (link.find("rel"), link.rfind("canonical")) {
                (Some(rel), Some(canonical)) => rel < canonical,
                _ => false,
            }
        })
    }

    /// The value for a canonical link header pointing at `url`.
    pub fn rel_canonical_header_value(url_str: &str) -> String {
        format!("<{}>; rel=\"canonical\"", url::sanitize(url_str))
    }

    /// Whether the response sets the named cookie; returns its values.
    pub fn has_cookie(&self, name: &str) -> Option<Vec<String>> {
        let map = cookies::parse_response_cookies(&self.headers);
        map.get(name)
            .map(|entries| entries.iter().map(|(v, _)| v.clone()).collect())
    }

    pub fn has_any_cookies_with_attribute(&self, attribute_name: &str) -> bool {
        cookies::has_any_cookies_with_attribute(&self.headers, attribute_name)
    }

    /// All response cookies rendered as `name=value; ...`, in header order.
    pub fn get_cookie_string(&self) -> Option<String> {
        cookies::cookie_string(&self.headers)
    }

    /// Reflect query parameters as cookies with the given expiry, e.g. to
    /// latch experiment options. Parameters named in `to_exclude` are
    /// skipped. Returns whether all cookies were set.
    pub fn set_query_params_as_cookies(
        &mut self,
        url_str: &str,
        params: &[(&str, &str)],
        to_exclude: &[&str],
        expiration_ms: i64,
    ) -> bool {
        let Some((_, host)) = url::scheme_and_host(url_str) else {
            return false;
        };
        let host = host.to_string();
        let expires = format_http_date_ms(expiration_ms);
        let mut ok = true;
        for (name, value) in params {
            if to_exclude.iter().any(|e| e.eq_ignore_ascii_case(name)) {
                continue;
            }
            let line = format!(
                "{}={}; Expires={}; Domain={}; Path=/",
                name, value, expires, host
            );
            ok = self.add(names::SET_COOKIE, &line).is_ok() && ok;
        }
        ok
    }

    /// Expire the named option cookies on the client. Cookies named in
    /// `to_exclude` are kept.
    pub fn clear_option_cookies(
        &mut self,
        url_str: &str,
        option_cookies: &[&str],
        to_exclude: &[&str],
    ) -> bool {
        let Some((_, host)) = url::scheme_and_host(url_str) else {
            return false;
        };
        let host = host.to_string();
        let mut ok = true;
        for name in option_cookies {
            if to_exclude.iter().any(|e| e.eq_ignore_ascii_case(name)) {
                continue;
            }
            let line = format!(
                "{}=; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Domain={}; Path=/",
                name, host
            );
            ok = self.add(names::SET_COOKIE, &line).is_ok() && ok;
        }
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestProperties;

    const NOW_MS: i64 = 1_000_000;

    fn no_req_cookies() -> RequestProperties {
        RequestProperties {
            has_cookie: false,
            has_cookie2: false,
            has_authorization: false,
        }
    }

    fn response(status: u16, headers: &[(&str, &str)]) -> ResponseHeaders {
        let mut resp = ResponseHeaders::new(HttpOptions::default());
        resp.set_status_code(status);
        for (n, v) in headers {
            resp.add(n, v).unwrap();
        }
        resp
    }

    fn proxy_cacheable(resp: &ResponseHeaders) -> bool {
        resp.is_proxy_cacheable(
            no_req_cookies(),
            VaryOption::IgnoreVaryOnResources,
            ValidatorOption::HasValidator,
        )
    }

    #[test]
    fn explicit_caching_fields() {
        let mut resp = response(
            200,
            &[
                ("Date", &format_http_date_ms(NOW_MS)),
                ("Cache-Control", "max-age=600"),
            ],
        );
        resp.compute_caching();
        assert!(resp.is_browser_cacheable());
        assert!(proxy_cacheable(&resp));
        assert_eq!(resp.date_ms(), NOW_MS);
        assert_eq!(resp.cache_ttl_ms(), 600_000);
        assert_eq!(resp.cache_expiration_time_ms(), NOW_MS + 600_000);
        assert!(!resp.is_implicitly_cacheable());
    }

    #[test]
    fn compute_caching_is_idempotent() {
        let mut resp = response(
            200,
            &[
                ("Date", &format_http_date_ms(NOW_MS)),
                ("Content-Type", "text/css"),
            ],
        );
        resp.compute_caching();
        let ttl = resp.cache_ttl_ms();
        let exp = resp.cache_expiration_time_ms();
        let headers_before = resp.to_http_string();
        resp.compute_caching();
        assert_eq!(resp.cache_ttl_ms(), ttl);
        assert_eq!(resp.cache_expiration_time_ms(), exp);
        assert_eq!(resp.to_http_string(), headers_before);
    }

    #[test]
    fn missing_date_is_uncacheable() {
        let mut resp = response(200, &[("Cache-Control", "max-age=600")]);
        resp.compute_caching();
        assert!(!resp.is_browser_cacheable());
        assert!(!proxy_cacheable(&resp));
        assert_eq!(resp.cache_expiration_time_ms(), 0);
    }

    #[test]
    fn mutations_set_dirty_bit() {
        let mut resp = response(200, &[("Date", &format_http_date_ms(NOW_MS))]);
        resp.compute_caching();

        let ops: Vec<Box<dyn Fn(&mut ResponseHeaders)>> = vec![
            Box::new(|r| {
                r.add("X-A", "1").unwrap();
            }),
            Box::new(|r| {
                r.replace("X-A", "2").unwrap();
            }),
            Box::new(|r| {
                r.remove("X-A", "2");
            }),
            Box::new(|r| {
                r.add("X-A", "3").unwrap();
                r.compute_caching();
                r.remove_all("X-A");
            }),
            Box::new(|r| r.set_status_code(301)),
            Box::new(|r| {
                r.merge_content_type("text/css");
            }),
            Box::new(|r| r.set_cache_control_max_age(10_000)),
            Box::new(|r| r.set_s_max_age(5)),
        ];
        for (i, op) in ops.iter().enumerate() {
            resp.compute_caching();
            op(&mut resp);
            // set_cache_control_max_age recomputes when entered clean
            if i != 6 {
                assert!(resp.cache_fields_dirty, "op {} left fields clean", i);
            }
            resp.compute_caching();
        }
    }

    #[test]
    #[should_panic(expected = "compute_caching")]
    fn dirty_read_is_debug_fatal() {
        let mut resp = response(200, &[("Date", &format_http_date_ms(NOW_MS))]);
        resp.compute_caching();
        resp.add("Cache-Control", "no-store").unwrap();
        let _ = resp.is_browser_cacheable();
    }

    #[test]
    fn implicit_caching_synthesizes_headers() {
        let mut resp = response(
            200,
            &[
                ("Date", &format_http_date_ms(NOW_MS)),
                ("Content-Type", "text/css"),
                ("Cache-Control", "no-transform"),
            ],
        );
        resp.compute_caching();
        assert!(resp.is_implicitly_cacheable());
        assert_eq!(resp.cache_ttl_ms(), IMPLICIT_CACHE_TTL_MS);
        let cc = resp.lookup1("Cache-Control").unwrap();
        assert!(cc.starts_with("max-age=300"));
        assert!(cc.contains("no-transform"));
        assert!(resp.has("Expires"));
    }

    #[test]
    fn implicit_caching_preserves_s_maxage() {
        let mut resp = response(
            200,
            &[
                ("Date", &format_http_date_ms(NOW_MS)),
                ("Content-Type", "text/css"),
                ("Cache-Control", "s-maxage=60"),
            ],
        );
        resp.compute_caching();
        assert!(resp.is_implicitly_cacheable());
        assert!(resp.lookup1("Cache-Control").unwrap().contains("s-maxage=60"));
    }

    #[test]
    fn html_with_set_cookie_not_proxy_cacheable() {
        let mut resp = response(
            200,
            &[
                ("Date", &format_http_date_ms(NOW_MS)),
                ("Content-Type", "text/html"),
                ("Cache-Control", "max-age=600"),
                ("Set-Cookie", "session=1"),
            ],
        );
        resp.compute_caching();
        assert!(resp.is_browser_cacheable());
        assert!(!proxy_cacheable(&resp));

        // non-HTML keeps its cookies without demotion
        let mut resp = response(
            200,
            &[
                ("Date", &format_http_date_ms(NOW_MS)),
                ("Content-Type", "text/css"),
                ("Cache-Control", "max-age=600"),
                ("Set-Cookie", "session=1"),
            ],
        );
        resp.compute_caching();
        assert!(proxy_cacheable(&resp));
    }

    #[test]
    fn redirect_with_set_cookie_not_proxy_cacheable() {
        let mut resp = response(
            301,
            &[
                ("Date", &format_http_date_ms(NOW_MS)),
                ("Cache-Control", "max-age=600"),
                ("Set-Cookie", "session=1"),
            ],
        );
        resp.compute_caching();
        assert!(!proxy_cacheable(&resp));
    }

    #[test]
    fn authorization_requires_public() {
        let mut resp = response(
            200,
            &[
                ("Date", &format_http_date_ms(NOW_MS)),
                ("Cache-Control", "max-age=600"),
            ],
        );
        resp.compute_caching();
        let authorized = RequestProperties {
            has_authorization: true,
            ..no_req_cookies()
        };
        assert!(!resp.is_proxy_cacheable(
            authorized,
            VaryOption::IgnoreVaryOnResources,
            ValidatorOption::HasValidator
        ));

        let mut resp = response(
            200,
            &[
                ("Date", &format_http_date_ms(NOW_MS)),
                ("Cache-Control", "public, max-age=600"),
            ],
        );
        resp.compute_caching();
        assert!(resp.is_proxy_cacheable(
            authorized,
            VaryOption::IgnoreVaryOnResources,
            ValidatorOption::HasValidator
        ));
    }

    #[test]
    fn vary_accept_encoding_ignored() {
        let mut resp = response(
            200,
            &[
                ("Date", &format_http_date_ms(NOW_MS)),
                ("Cache-Control", "max-age=600"),
                ("Vary", "Accept-Encoding"),
            ],
        );
        resp.compute_caching();
        assert!(resp.is_proxy_cacheable(
            no_req_cookies(),
            VaryOption::RespectVaryOnResources,
            ValidatorOption::HasValidator
        ));
    }

    #[test]
    fn vary_cookie_rules() {
        let mut html = response(
            200,
            &[
                ("Date", &format_http_date_ms(NOW_MS)),
                ("Content-Type", "text/html"),
                ("Cache-Control", "max-age=600"),
                ("Vary", "Cookie"),
            ],
        );
        html.compute_caching();
        // HTML without a request cookie and with a validator: ok
        assert!(html.is_proxy_cacheable(
            no_req_cookies(),
            VaryOption::IgnoreVaryOnResources,
            ValidatorOption::HasValidator
        ));
        // request carries a cookie: not cacheable
        let with_cookie = RequestProperties {
            has_cookie: true,
            ..no_req_cookies()
        };
        assert!(!html.is_proxy_cacheable(
            with_cookie,
            VaryOption::IgnoreVaryOnResources,
            ValidatorOption::HasValidator
        ));
        // no validator: not cacheable
        assert!(!html.is_proxy_cacheable(
            no_req_cookies(),
            VaryOption::IgnoreVaryOnResources,
            ValidatorOption::NoValidator
        ));

        // a resource (non-HTML) with Vary: Cookie is never proxy-cacheable
        let mut css = response(
            200,
            &[
                ("Date", &format_http_date_ms(NOW_MS)),
                ("Content-Type", "text/css"),
                ("Cache-Control", "max-age=600"),
                ("Vary", "Cookie"),
            ],
        );
        css.compute_caching();
        assert!(!css.is_proxy_cacheable(
            no_req_cookies(),
            VaryOption::IgnoreVaryOnResources,
            ValidatorOption::HasValidator
        ));
    }

    #[test]
    fn vary_other_rules() {
        let mut css = response(
            200,
            &[
                ("Date", &format_http_date_ms(NOW_MS)),
                ("Content-Type", "text/css"),
                ("Cache-Control", "max-age=600"),
                ("Vary", "User-Agent"),
            ],
        );
        css.compute_caching();
        // resources only respect arbitrary Vary when asked to
        assert!(css.is_proxy_cacheable(
            no_req_cookies(),
            VaryOption::IgnoreVaryOnResources,
            ValidatorOption::HasValidator
        ));
        assert!(!css.is_proxy_cacheable(
            no_req_cookies(),
            VaryOption::RespectVaryOnResources,
            ValidatorOption::HasValidator
        ));

        // HTML always respects arbitrary Vary
        let mut html = response(
            200,
            &[
                ("Date", &format_http_date_ms(NOW_MS)),
                ("Content-Type", "text/html"),
                ("Cache-Control", "max-age=600"),
                ("Vary", "User-Agent"),
            ],
        );
        html.compute_caching();
        assert!(!html.is_proxy_cacheable(
            no_req_cookies(),
            VaryOption::IgnoreVaryOnResources,
            ValidatorOption::HasValidator
        ));
    }

    #[test]
    fn fix_date_headers_future_drift() {
        let future = NOW_MS + MAX_ALLOWED_DATE_DRIFT_MS + 60_000;
        let mut resp = response(
            200,
            &[
                ("Date", &format_http_date_ms(future)),
                ("Expires", &format_http_date_ms(future + 600_000)),
            ],
        );
        resp.compute_caching();
        resp.fix_date_headers(NOW_MS);
        assert!(!resp.cache_fields_dirty);
        assert_eq!(resp.date_ms(), NOW_MS);
        // Expires shifted by the same delta
        assert_eq!(
            parse_http_date_ms(resp.lookup1("Expires").unwrap()).unwrap(),
            NOW_MS + 600_000
        );
    }

    #[test]
    fn fix_date_headers_missing_date() {
        let mut resp = response(200, &[("Expires", &format_http_date_ms(NOW_MS))]);
        resp.compute_caching();
        resp.fix_date_headers(NOW_MS);
        assert_eq!(resp.date_ms(), NOW_MS);
        assert!(!resp.has("Expires"));
    }

    #[test]
    fn fix_date_headers_preserves_dirty_on_entry() {
        let mut resp = response(200, &[]);
        resp.add("X-Whatever", "1").unwrap();
        assert!(resp.cache_fields_dirty);
        resp.fix_date_headers(NOW_MS);
        assert!(resp.cache_fields_dirty);
    }

    #[test]
    fn set_cache_control_max_age_replaces() {
        let mut resp = response(
            200,
            &[
                ("Date", &format_http_date_ms(NOW_MS)),
                ("Cache-Control", "max-age=10, private"),
            ],
        );
        resp.compute_caching();
        resp.set_cache_control_max_age(600_000);
        let cc = resp.lookup1("Cache-Control").unwrap();
        assert!(cc.starts_with("max-age=600"));
        assert!(cc.contains("private"));
        assert!(!cc.contains("max-age=10,"));
        assert_eq!(
            parse_http_date_ms(resp.lookup1("Expires").unwrap()).unwrap(),
            NOW_MS + 600_000
        );
        // entered clean, so it recomputed
        assert_eq!(resp.cache_ttl_ms(), 600_000);
    }

    #[test]
    fn apply_s_max_age_rules() {
        assert_eq!(
            ResponseHeaders::apply_s_max_age(10, "").as_deref(),
            Some("s-maxage=10")
        );
        // forbidden directives: no change
        assert!(ResponseHeaders::apply_s_max_age(10, "no-transform").is_none());
        assert!(ResponseHeaders::apply_s_max_age(10, "private, max-age=600").is_none());
        assert!(ResponseHeaders::apply_s_max_age(10, "no-store").is_none());
        assert!(ResponseHeaders::apply_s_max_age(10, "no-cache").is_none());
        // existing s-maxage only lowered, never raised
        assert_eq!(
            ResponseHeaders::apply_s_max_age(10, "s-maxage=600").as_deref(),
            Some("s-maxage=10")
        );
        assert!(ResponseHeaders::apply_s_max_age(600, "s-maxage=10").is_none());
        // added next to a larger max-age, not next to a smaller one
        assert_eq!(
            ResponseHeaders::apply_s_max_age(10, "max-age=600").as_deref(),
            Some("max-age=600, s-maxage=10")
        );
        assert!(ResponseHeaders::apply_s_max_age(600, "max-age=10").is_none());
    }

    #[test]
    fn set_cache_control_public_preserves_dirty_bit() {
        let mut resp = response(
            200,
            &[
                ("Date", &format_http_date_ms(NOW_MS)),
                ("Cache-Control", "max-age=600"),
            ],
        );
        resp.compute_caching();
        resp.set_cache_control_public();
        assert!(!resp.cache_fields_dirty);
        assert!(resp.has_value("Cache-Control", "public"));
        // no double add, and pinned policies stay put
        resp.set_cache_control_public();
        assert_eq!(resp.lookup("Cache-Control").len(), 1);
    }

    #[test]
    fn sanitize_removes_hop_by_hop_and_cookies() {
        let mut resp = response(
            200,
            &[
                ("Date", &format_http_date_ms(NOW_MS)),
                ("Connection", "Keep-Alive, X-Secret"),
                ("X-Secret", "1"),
                ("Transfer-Encoding", "chunked"),
                ("Set-Cookie", "a=b"),
                ("Content-Type", "text/css"),
            ],
        );
        assert!(resp.sanitize());
        assert!(!resp.has("Connection"));
        assert!(!resp.has("X-Secret"));
        assert!(!resp.has("Transfer-Encoding"));
        assert!(!resp.has("Set-Cookie"));
        assert!(resp.has("Content-Type"));
        // second run finds nothing left to remove
        assert!(!resp.sanitize());
    }

    #[test]
    fn get_sanitized_leaves_original_untouched() {
        let mut resp = response(
            200,
            &[
                ("Date", &format_http_date_ms(NOW_MS)),
                ("Set-Cookie", "a=b"),
                ("Cache-Control", "max-age=600"),
            ],
        );
        resp.compute_caching();
        let clean = resp.get_sanitized();
        assert!(!clean.has("Set-Cookie"));
        assert!(resp.has("Set-Cookie"));
        assert_eq!(resp.get_cookie_string().as_deref(), Some("a=b"));
    }

    #[test]
    fn sanitize_keeps_end_to_end_headers_listed_in_connection() {
        let mut resp = response(
            200,
            &[("Connection", "Cache-Control"), ("Cache-Control", "max-age=5")],
        );
        resp.sanitize();
        assert!(resp.has("Cache-Control"));
    }

    #[test]
    fn force_caching_private_response() {
        let mut resp = response(
            200,
            &[
                ("Date", &format_http_date_ms(NOW_MS)),
                ("Content-Type", "text/css"),
                ("Cache-Control", "private, max-age=10"),
            ],
        );
        resp.compute_caching();
        assert!(!proxy_cacheable(&resp));
        resp.force_caching(600_000);
        assert!(resp.force_cached());
        assert!(proxy_cacheable(&resp));
        assert_eq!(resp.cache_ttl_ms(), 600_000);
    }

    #[test]
    fn force_caching_never_applies_to_html() {
        let mut resp = response(
            200,
            &[
                ("Date", &format_http_date_ms(NOW_MS)),
                ("Content-Type", "text/html"),
                ("Cache-Control", "private"),
            ],
        );
        resp.compute_caching();
        resp.force_caching(600_000);
        assert!(!resp.force_cached());
        assert!(!proxy_cacheable(&resp));
    }

    #[test]
    fn force_caching_does_not_lower_ttl() {
        let mut resp = response(
            200,
            &[
                ("Date", &format_http_date_ms(NOW_MS)),
                ("Cache-Control", "max-age=600"),
            ],
        );
        resp.compute_caching();
        resp.force_caching(10_000);
        assert!(!resp.force_cached());
        assert_eq!(resp.cache_ttl_ms(), 600_000);
    }

    #[test]
    fn update_cache_headers_if_force_cached() {
        let mut resp = response(
            200,
            &[
                ("Date", &format_http_date_ms(NOW_MS)),
                ("Content-Type", "text/css"),
                ("Cache-Control", "private"),
                ("Pragma", "no-cache"),
            ],
        );
        resp.compute_caching();
        resp.force_caching(600_000);
        assert!(resp.update_cache_headers_if_force_cached());
        assert!(!resp.has("Pragma"));
        assert!(resp
            .lookup1("Cache-Control")
            .unwrap()
            .starts_with("max-age=600"));
        // untouched when not force-cached
        let mut plain = response(
            200,
            &[
                ("Date", &format_http_date_ms(NOW_MS)),
                ("Cache-Control", "max-age=600"),
            ],
        );
        plain.compute_caching();
        assert!(!plain.update_cache_headers_if_force_cached());
    }

    #[test]
    fn content_encoding_inspection() {
        let mut resp = response(200, &[("Content-Encoding", "gzip")]);
        assert!(resp.is_gzipped());
        assert!(resp.was_gzipped_last());

        resp.remove_all("Content-Encoding");
        resp.add("Content-Encoding", "gzip, br").unwrap();
        assert!(resp.is_gzipped());
        assert!(!resp.was_gzipped_last());
        assert_eq!(resp.last_content_encoding().as_deref(), Some("br"));
    }

    #[test]
    fn content_length_handling() {
        let mut resp = response(200, &[("X-Original-Content-Length", "100")]);
        resp.compute_caching();
        // setting CL == XOCL clears the marker
        resp.set_content_length(100);
        assert!(!resp.cache_fields_dirty);
        assert!(!resp.has("X-Original-Content-Length"));
        assert_eq!(resp.find_content_length(), Some(100));
        // a differing XOCL stays as evidence of savings
        resp.set_original_content_length(500);
        resp.set_content_length(80);
        assert_eq!(resp.lookup1("X-Original-Content-Length"), Some("500"));
        // first writer wins
        resp.set_original_content_length(900);
        assert_eq!(resp.lookup1("X-Original-Content-Length"), Some("500"));
    }

    #[test]
    fn first_line_round_trip() {
        let text = "HTTP/1.1 301 Moved Permanently\r\nLocation: https://x/\r\n";
        let resp = ResponseHeaders::from_http_block(text, HttpOptions::default()).unwrap();
        assert_eq!(resp.status_code(), 301);
        assert_eq!(resp.reason_phrase(), "Moved Permanently");
        assert_eq!(resp.version(), (1, 1));
        assert_eq!(resp.lookup1("Location"), Some("https://x/"));
        let out = resp.to_http_string();
        assert!(out.starts_with("HTTP/1.1 301 Moved Permanently\r\n"));
        assert!(out.ends_with("\r\n\r\n"));
    }

    #[test]
    fn sentinel_status_first_line() {
        let text = "HTTP/1.1 10003 Remembered Failure\r\n";
        let resp = ResponseHeaders::from_http_block(text, HttpOptions::default()).unwrap();
        assert_eq!(resp.status_code(), 10003);
    }

    #[test]
    fn link_rel_canonical() {
        let mut resp = response(200, &[]);
        assert!(!resp.has_link_rel_canonical());
        let value = ResponseHeaders::rel_canonical_header_value("https://x/page");
        resp.add("Link", &value).unwrap();
        assert!(resp.has_link_rel_canonical());
        assert_eq!(value, "<https://x/page>; rel=\"canonical\"");
    }

    #[test]
    fn imminently_expiring() {
        let opts = HttpOptions::default();
        // 10-minute TTL, 1 minute left: worth freshening
        assert!(ResponseHeaders::is_imminently_expiring(
            0,
            600_000,
            540_000,
            &opts
        ));
        // plenty of time left
        assert!(!ResponseHeaders::is_imminently_expiring(
            0,
            600_000,
            60_000,
            &opts
        ));
        // TTL below the implicit TTL is never freshened
        assert!(!ResponseHeaders::is_imminently_expiring(
            0,
            60_000,
            59_000,
            &opts
        ));
    }

    #[test]
    fn query_params_as_cookies() {
        let mut resp = response(200, &[]);
        assert!(resp.set_query_params_as_cookies(
            "https://example.com/page",
            &[("opt", "1"), ("secret", "x")],
            &["secret"],
            NOW_MS,
        ));
        let values = resp.has_cookie("opt").unwrap();
        assert_eq!(values, vec!["1"]);
        assert!(resp.has_cookie("secret").is_none());

        assert!(resp.clear_option_cookies("https://example.com/page", &["opt"], &[]));
        let values = resp.has_cookie("opt").unwrap();
        assert_eq!(values.last().unwrap(), "");
    }
}
