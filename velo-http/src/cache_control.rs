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

//! Functions and utilities to help parse Cache-Control headers

use crate::headers::HeaderSet;
use crate::names;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

/// The max delta-second per [RFC 9111](https://datatracker.ietf.org/doc/html/rfc9111#section-1.2.2)
// A cache receiving a larger value, or overflowing on arithmetic, must treat
// it as 2^31 or the greatest integer it can represent.
pub const DELTA_SECONDS_OVERFLOW_VALUE: i64 = 2147483648;

/// Cache control directive key type
pub type DirectiveKey = String;

/// Cache control directive value type
#[derive(Debug)]
pub struct DirectiveValue(pub String);

impl DirectiveValue {
    /// The value without surrounding quotes (`"`).
    pub fn unquoted(&self) -> &str {
        self.0
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .unwrap_or(&self.0)
    }

    /// Parse the value as delta seconds. Positive overflow caps at
    /// [DELTA_SECONDS_OVERFLOW_VALUE]; anything unparseable (including
    /// negative values with more text) is `None`.
    pub fn as_delta_seconds(&self) -> Option<i64> {
        match self.unquoted().parse::<i64>() {
            Ok(v) => Some(v.min(DELTA_SECONDS_OVERFLOW_VALUE)),
            Err(e) if *e.kind() == std::num::IntErrorKind::PosOverflow => {
                Some(DELTA_SECONDS_OVERFLOW_VALUE)
            }
            Err(_) => None,
        }
    }
}

/// An ordered map to store cache control key value pairs.
pub type DirectiveMap = IndexMap<DirectiveKey, Option<DirectiveValue>>;

/// Parsed Cache-Control directives
#[derive(Debug)]
pub struct CacheControl {
    /// The parsed directives
    pub directives: DirectiveMap,
}

// Cache-Control   = 1#cache-directive
// cache-directive = token [ "=" ( token / quoted-string ) ]
// The token production excludes the delimiters of RFC 9110 5.6.2. We also
// accept semicolons as delimiters, which some origins emit.
static RE_CACHE_DIRECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?:^|(?:\s*[,;]\s*))([^\x00-\x20()<>@,;:\\"/\[\]?=\{\}\x7F]+)(?:=((?:[^\x00-\x20()<>@,;:\\"/\[\]?=\{\}\x7F]+|(?:"(?:[^"\\]|\\.)*"))))?"#,
    )
    .unwrap()
});

impl CacheControl {
    /// Parse all `Cache-Control` lines of `headers` in order.
    ///
    /// `None` when no Cache-Control header is present at all.
    pub fn from_headers(headers: &HeaderSet) -> Option<Self> {
        Self::from_headers_named(names::CACHE_CONTROL, headers)
    }

    /// Parse the given header name as cache-control directives.
    pub fn from_headers_named(header_name: &str, headers: &HeaderSet) -> Option<Self> {
        if !headers.has(header_name) {
            return None;
        }
        let mut directives = IndexMap::new();
        for line in headers.lookup(header_name) {
            for captures in RE_CACHE_DIRECTIVE.captures_iter(line) {
                let Some(key) = captures.get(1) else { continue };
                let key = key.as_str().to_lowercase();
                let value = captures
                    .get(2)
                    .map(|v| DirectiveValue(v.as_str().to_string()));
                directives.insert(key, value);
            }
        }
        Some(CacheControl { directives })
    }

    /// Whether the given directive is present.
    pub fn has_key(&self, key: &str) -> bool {
        self.directives.contains_key(key)
    }

    pub fn public(&self) -> bool {
        self.has_key("public")
    }

    /// `private` in either the bare or the `private="field"` form. Both
    /// prevent a shared cache from storing the full response.
    pub fn private(&self) -> bool {
        self.has_key("private")
    }

    /// `no-cache` in either the bare or field-list form.
    pub fn no_cache(&self) -> bool {
        self.has_key("no-cache")
    }

    pub fn no_store(&self) -> bool {
        self.has_key("no-store")
    }

    pub fn no_transform(&self) -> bool {
        self.has_key("no-transform")
    }

    pub fn must_revalidate(&self) -> bool {
        self.has_key("must-revalidate")
    }

    pub fn proxy_revalidate(&self) -> bool {
        self.has_key("proxy-revalidate")
    }

    fn delta_seconds(&self, key: &str) -> DirectiveResult {
        match self.directives.get(key) {
            None => DirectiveResult::Absent,
            Some(None) => DirectiveResult::Unparseable,
            Some(Some(v)) => match v.as_delta_seconds() {
                Some(secs) => DirectiveResult::Value(secs),
                None => DirectiveResult::Unparseable,
            },
        }
    }

    /// The `max-age` seconds.
    pub fn max_age(&self) -> DirectiveResult {
        self.delta_seconds("max-age")
    }

    /// The `s-maxage` seconds.
    pub fn s_maxage(&self) -> DirectiveResult {
        self.delta_seconds("s-maxage")
    }
}

/// Outcome of reading a numeric directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveResult {
    /// Directive not present
    Absent,
    /// Present with a parseable number of seconds
    Value(i64),
    /// Present but the value could not be read
    Unparseable,
}

impl DirectiveResult {
    pub fn value(&self) -> Option<i64> {
        match self {
            DirectiveResult::Value(v) => Some(*v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with_cc(values: &[&str]) -> HeaderSet {
        let mut h = HeaderSet::new();
        for v in values {
            h.add("Cache-Control", v).unwrap();
        }
        h
    }

    #[test]
    fn simple_directives() {
        let cc = CacheControl::from_headers(&headers_with_cc(&["public, max-age=10000"])).unwrap();
        assert!(cc.public());
        assert_eq!(cc.max_age(), DirectiveResult::Value(10000));
    }

    #[test]
    fn no_header_is_none() {
        assert!(CacheControl::from_headers(&HeaderSet::new()).is_none());
    }

    #[test]
    fn directives_across_header_lines() {
        let cc =
            CacheControl::from_headers(&headers_with_cc(&["public,", "max-age=10000"])).unwrap();
        assert!(cc.public());
        assert_eq!(cc.max_age(), DirectiveResult::Value(10000));
    }

    #[test]
    fn semicolon_delimiters() {
        let cc = CacheControl::from_headers(&headers_with_cc(&["public; max-age=0"])).unwrap();
        assert!(cc.public());
        assert_eq!(cc.max_age(), DirectiveResult::Value(0));
    }

    #[test]
    fn case_insensitive_keys() {
        let cc =
            CacheControl::from_headers(&headers_with_cc(&["Private, mAx-AGe=\"600\""])).unwrap();
        assert!(cc.private());
        assert_eq!(cc.max_age(), DirectiveResult::Value(600));
    }

    #[test]
    fn private_with_field_names_counts() {
        let cc =
            CacheControl::from_headers(&headers_with_cc(&["private=\"set-cookie\""])).unwrap();
        assert!(cc.private());
    }

    #[test]
    fn overflow_and_garbage() {
        let cc = CacheControl::from_headers(&headers_with_cc(&[
            "max-age=99999999999999999999, s-maxage=soon",
        ]))
        .unwrap();
        assert_eq!(
            cc.max_age(),
            DirectiveResult::Value(DELTA_SECONDS_OVERFLOW_VALUE)
        );
        assert_eq!(cc.s_maxage(), DirectiveResult::Unparseable);
    }

    #[test]
    fn negative_max_age_is_a_value() {
        let cc = CacheControl::from_headers(&headers_with_cc(&["max-age=-5"])).unwrap();
        assert_eq!(cc.max_age(), DirectiveResult::Value(-5));
    }

    #[test]
    fn unknown_directives_preserved_in_order() {
        let cc = CacheControl::from_headers(&headers_with_cc(&["public,random1=random2"])).unwrap();
        let mut iter = cc.directives.iter();
        assert_eq!(iter.next().unwrap().0, "public");
        let (k, v) = iter.next().unwrap();
        assert_eq!(k, "random1");
        assert_eq!(v.as_ref().unwrap().0, "random2");
    }
}
