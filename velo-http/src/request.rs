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

//! The request-side header model. The cache only needs a few request facts:
//! method, validators, cookies, authorization and accepted encodings.

use crate::cookies::parse_request_cookies;
use crate::headers::HeaderSet;
use crate::names;
use velo_error::Result;

pub use http::Method;

/// The request facts cacheability decisions depend on.
///
/// The default is deliberately pessimistic about cookies (a `Vary: Cookie`
/// response will not be served) and optimistic about authorization; build
/// from real headers via [RequestHeaders::properties] when they are known.
#[derive(Debug, Clone, Copy)]
pub struct RequestProperties {
    pub has_cookie: bool,
    pub has_cookie2: bool,
    pub has_authorization: bool,
}

impl Default for RequestProperties {
    fn default() -> Self {
        RequestProperties {
            has_cookie: true,
            has_cookie2: true,
            has_authorization: false,
        }
    }
}

/// The HTTP request header block.
#[derive(Debug, Clone)]
pub struct RequestHeaders {
    method: Method,
    url: String,
    major_version: u8,
    minor_version: u8,
    headers: HeaderSet,
}

impl RequestHeaders {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        RequestHeaders {
            method,
            url: url.into(),
            major_version: 1,
            minor_version: 1,
            headers: HeaderSet::new(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    pub fn is_head(&self) -> bool {
        self.method == Method::HEAD
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn version(&self) -> (u8, u8) {
        (self.major_version, self.minor_version)
    }

    pub fn headers(&self) -> &HeaderSet {
        &self.headers
    }

    pub fn add(&mut self, name: &str, value: &str) -> Result<()> {
        self.headers.add(name, value)
    }

    pub fn replace(&mut self, name: &str, value: &str) -> Result<()> {
        self.headers.replace(name, value)
    }

    pub fn remove_all(&mut self, name: &str) -> bool {
        self.headers.remove_all(name)
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

    /// Derive [RequestProperties] from the actual headers.
    pub fn properties(&self) -> RequestProperties {
        RequestProperties {
            has_cookie: self.headers.has(names::COOKIE),
            has_cookie2: self.headers.has(names::COOKIE2),
            has_authorization: self.headers.has(names::AUTHORIZATION),
        }
    }

    /// Whether `Accept-Encoding` lists the coding. Quality parameters are
    /// ignored; `gzip;q=0` is rare enough to not special-case.
    pub fn accepts_encoding(&self, coding: &str) -> bool {
        self.headers
            .lookup(names::ACCEPT_ENCODING)
            .iter()
            .flat_map(|v| v.split(','))
            .map(|t| t.split(';').next().unwrap_or("").trim())
            .any(|t| t.eq_ignore_ascii_case(coding))
    }

    pub fn accepts_gzip(&self) -> bool {
        self.accepts_encoding("gzip")
    }

    /// Whether the request carries the named cookie.
    pub fn has_cookie(&self, name: &str) -> bool {
        parse_request_cookies(&self.headers).contains_key(name)
    }

    /// The values of the named cookie, in header order.
    pub fn cookie_values(&self, name: &str) -> Vec<String> {
        parse_request_cookies(&self.headers)
            .get(name)
            .map(|entries| entries.iter().map(|(v, _)| v.clone()).collect())
            .unwrap_or_default()
    }
}
