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

//! On-demand cookie views over a header set.
//!
//! Requests carry `Cookie: a=1; b=2`; responses carry one `Set-Cookie` line
//! per cookie, with attributes after the first pair. Neither view is stored;
//! callers parse when they need one.

use crate::headers::HeaderSet;
use crate::names;
use indexmap::IndexMap;

/// name -> [(value, attributes)] in header order. Attributes are the raw
/// `; `-joined tail of a Set-Cookie line, empty for request cookies.
pub type CookieMap = IndexMap<String, Vec<(String, String)>>;

/// Parse all `Cookie` request header lines.
pub fn parse_request_cookies(headers: &HeaderSet) -> CookieMap {
    let mut map = CookieMap::new();
    for line in headers.lookup(names::COOKIE) {
        for pair in line.split(';') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let (name, value) = match pair.split_once('=') {
                Some((n, v)) => (n.trim(), v.trim()),
                None => (pair, ""),
            };
            map.entry(name.to_string())
                .or_default()
                .push((value.to_string(), String::new()));
        }
    }
    map
}

/// Parse all `Set-Cookie` / `Set-Cookie2` response header lines.
pub fn parse_response_cookies(headers: &HeaderSet) -> CookieMap {
    let mut map = CookieMap::new();
    for name in [names::SET_COOKIE, names::SET_COOKIE2] {
        for line in headers.lookup(name) {
            let mut segments = line.split(';');
            let Some(first) = segments.next() else {
                continue;
            };
            let (cookie_name, value) = match first.split_once('=') {
                Some((n, v)) => (n.trim(), v.trim()),
                None => (first.trim(), ""),
            };
            if cookie_name.is_empty() {
                continue;
            }
            let attributes = segments
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("; ");
            map.entry(cookie_name.to_string())
                .or_default()
                .push((value.to_string(), attributes));
        }
    }
    map
}

/// Render all response cookies as a `name=value; name2=value2` string, in
/// header order. `None` when there are no cookies at all.
pub fn cookie_string(headers: &HeaderSet) -> Option<String> {
    let map = parse_response_cookies(headers);
    if map.is_empty() {
        return None;
    }
    let pairs: Vec<String> = map
        .iter()
        .flat_map(|(name, entries)| {
            entries
                .iter()
                .map(move |(value, _)| format!("{}={}", name, value))
        })
        .collect();
    Some(pairs.join("; "))
}

/// Whether any response cookie carries the named attribute (e.g.
/// `HttpOnly`, `Secure`), matched case-insensitively against the attribute
/// name before any `=`.
pub fn has_any_cookies_with_attribute(headers: &HeaderSet, attribute_name: &str) -> bool {
    parse_response_cookies(headers).values().any(|entries| {
        entries.iter().any(|(_, attributes)| {
            attributes.split(';').any(|attr| {
                let name = attr.split('=').next().unwrap_or("").trim();
                name.eq_ignore_ascii_case(attribute_name)
            })
        })
    })
}
