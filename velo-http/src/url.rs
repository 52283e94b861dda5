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

//! Just enough URL handling for cache keying decisions. Full URL
//! normalization belongs to the rewriting layers, not the cache core.

/// Split `scheme://host[:port]/...` into (scheme, host). `None` when the
/// string has no scheme separator or an empty host.
pub fn scheme_and_host(url: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = url.split_once("://")?;
    if scheme.is_empty() {
        return None;
    }
    let authority = rest.split(['/', '?', '#']).next().unwrap_or("");
    let host = authority.split('@').next_back().unwrap_or("");
    let host = host.split(':').next().unwrap_or("");
    if host.is_empty() {
        return None;
    }
    Some((scheme, host))
}

/// Whether the string is a usable absolute URL for cache keying.
pub fn is_any_valid(url: &str) -> bool {
    scheme_and_host(url).is_some() && !url.contains(|c: char| c.is_ascii_whitespace())
}

/// Whether the URL is served over https.
pub fn is_https(url: &str) -> bool {
    scheme_and_host(url).is_some_and(|(scheme, _)| scheme.eq_ignore_ascii_case("https"))
}

/// Escape the few characters that would break a quoted `Link:` header value.
pub fn sanitize(url: &str) -> String {
    url.replace(' ', "%20").replace('>', "%3E").replace('<', "%3C")
}
