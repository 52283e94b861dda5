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

//! The header names and status codes this proxy cares about.

pub const ACCEPT_ENCODING: &str = "Accept-Encoding";
pub const AUTHORIZATION: &str = "Authorization";
pub const CACHE_CONTROL: &str = "Cache-Control";
pub const CONNECTION: &str = "Connection";
pub const CONTENT_ENCODING: &str = "Content-Encoding";
pub const CONTENT_LENGTH: &str = "Content-Length";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const COOKIE: &str = "Cookie";
pub const COOKIE2: &str = "Cookie2";
pub const DATE: &str = "Date";
pub const ETAG: &str = "Etag";
pub const EXPIRES: &str = "Expires";
pub const IF_MODIFIED_SINCE: &str = "If-Modified-Since";
pub const IF_NONE_MATCH: &str = "If-None-Match";
pub const KEEP_ALIVE: &str = "Keep-Alive";
pub const LAST_MODIFIED: &str = "Last-Modified";
pub const LINK: &str = "Link";
pub const PRAGMA: &str = "Pragma";
pub const PROXY_AUTHENTICATE: &str = "Proxy-Authenticate";
pub const PROXY_AUTHORIZATION: &str = "Proxy-Authorization";
pub const SET_COOKIE: &str = "Set-Cookie";
pub const SET_COOKIE2: &str = "Set-Cookie2";
pub const TE: &str = "TE";
pub const TRAILER: &str = "Trailer";
pub const TRAILERS: &str = "Trailers";
pub const TRANSFER_ENCODING: &str = "Transfer-Encoding";
pub const UPGRADE: &str = "Upgrade";
pub const VARY: &str = "Vary";
pub const VIA: &str = "Via";
pub const WARNING: &str = "Warning";

// Proprietary markers.
pub const X_ORIGINAL_CONTENT_LENGTH: &str = "X-Original-Content-Length";
pub const X_PSA_LOAD_SHED: &str = "X-Psa-Load-Shed";
pub const X_PAGE_SPEED_LOOP: &str = "X-Page-Speed-Loop";

/// Warning value attached when a stale response is served in place of a
/// failed origin fetch.
pub const WARNING_STALE: &str = "110 Response is stale";

/// Headers that are never forwarded by a cache, plus cookies, which we never
/// store. Sorted case-insensitively for binary search.
pub const HOP_BY_HOP_HEADERS: &[&str] = &[
    CONNECTION,
    COOKIE,
    COOKIE2,
    KEEP_ALIVE,
    PROXY_AUTHENTICATE,
    PROXY_AUTHORIZATION,
    SET_COOKIE,
    SET_COOKIE2,
    TE,
    TRAILER,
    TRAILERS,
    TRANSFER_ENCODING,
    UPGRADE,
];

/// End-to-end headers a `Connection:` token may never mark for removal.
/// Sorted case-insensitively for binary search.
pub const END_TO_END_HEADERS: &[&str] = &[
    ACCEPT_ENCODING,
    CACHE_CONTROL,
    CONTENT_ENCODING,
    CONTENT_LENGTH,
    CONTENT_TYPE,
    DATE,
    ETAG,
    EXPIRES,
    LAST_MODIFIED,
    VARY,
    WARNING,
    X_ORIGINAL_CONTENT_LENGTH,
];

/// HTTP status codes used directly by this crate family. The reserved
/// failure-memoization range holds synthetic statuses the cache stores to
/// remember recent fetch failures; it must never leak to clients.
pub mod status {
    pub const OK: u16 = 200;
    pub const MOVED_PERMANENTLY: u16 = 301;
    pub const NOT_MODIFIED: u16 = 304;
    pub const NOT_FOUND: u16 = 404;
    pub const INTERNAL_SERVER_ERROR: u16 = 500;

    pub const REMEMBER_FAILURE_RANGE_START: u16 = 10001;
    pub const REMEMBER_FAILURE_RANGE_END: u16 = 10007; // exclusive

    /// Whether the status looks like an error (4xx or 5xx).
    pub fn is_error(code: u16) -> bool {
        (400..600).contains(&code)
    }

    /// Whether the status is a server error (5xx).
    pub fn is_server_error(code: u16) -> bool {
        (500..600).contains(&code)
    }

    /// Whether the status is in the reserved failure-memoization range.
    pub fn is_remember_failure(code: u16) -> bool {
        (REMEMBER_FAILURE_RANGE_START..REMEMBER_FAILURE_RANGE_END).contains(&code)
    }

    /// The default reason phrase for a status code, empty when unknown.
    pub fn reason_phrase(code: u16) -> &'static str {
        match code {
            200 => "OK",
            204 => "No Content",
            206 => "Partial Content",
            301 => "Moved Permanently",
            302 => "Found",
            303 => "See Other",
            304 => "Not Modified",
            307 => "Temporary Redirect",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            410 => "Gone",
            500 => "Internal Server Error",
            502 => "Bad Gateway",
            503 => "Service Unavailable",
            504 => "Gateway Timeout",
            _ => "",
        }
    }
}

/// Case-insensitive membership test in a sorted header-name table.
pub fn in_sorted_headers(name: &str, table: &[&str]) -> bool {
    table
        .binary_search_by(|probe| {
            probe
                .to_ascii_lowercase()
                .cmp(&name.to_ascii_lowercase())
        })
        .is_ok()
}
