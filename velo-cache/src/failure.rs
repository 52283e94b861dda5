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

//! Failure memoization: classifying fetch outcomes and encoding them as
//! synthetic status codes for storage.
//!
//! Remembering that a fetch recently failed (or was uncacheable, or was
//! load-shed) saves the backends and us from immediate retries. The
//! memoized entry is a normal cache record whose status code comes from a
//! reserved range; those sentinels never leave the cache layer.

use velo_http::names;
use velo_http::names::status;
use velo_http::ResponseHeaders;

/// How a fetch concluded, for classification and memoization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchResponseStatus {
    /// Internal sentinel, never stored.
    NotSet,
    /// A cacheable 200.
    Ok,
    /// A valid 200 whose headers/cookies forbid caching.
    Uncacheable200,
    /// A non-200 that would be storable but is not cacheable.
    UncacheableError,
    /// Any 4xx.
    ClientError4xx,
    /// 5xx or other non-cacheable failure.
    OtherError,
    /// The origin load-shed the request.
    Dropped,
    /// A 200 with an empty body and no redirect.
    Empty,
}

impl FetchResponseStatus {
    pub fn as_str(&self) -> &'static str {
        use FetchResponseStatus::*;
        match self {
            NotSet => "not_set",
            Ok => "ok",
            Uncacheable200 => "uncacheable_200",
            UncacheableError => "uncacheable_error",
            ClientError4xx => "client_error_4xx",
            OtherError => "other_error",
            Dropped => "dropped",
            Empty => "empty",
        }
    }

    /// All kinds that can be memoized.
    pub fn memoizable() -> [FetchResponseStatus; 6] {
        use FetchResponseStatus::*;
        [
            Uncacheable200,
            UncacheableError,
            ClientError4xx,
            OtherError,
            Dropped,
            Empty,
        ]
    }
}

/// Map a memoizable failure kind to its reserved status code.
pub fn encode_failure_caching_status(kind: FetchResponseStatus) -> u16 {
    use FetchResponseStatus::*;
    let offset = match kind {
        Uncacheable200 => 0,
        UncacheableError => 1,
        ClientError4xx => 2,
        OtherError => 3,
        Dropped => 4,
        Empty => 5,
        NotSet | Ok => {
            debug_assert!(false, "cannot encode {:?} as a failure status", kind);
            3 // treat as OtherError rather than corrupt the range
        }
    };
    status::REMEMBER_FAILURE_RANGE_START + offset
}

/// Inverse of [encode_failure_caching_status]. `NotSet` for codes outside
/// the reserved range.
pub fn decode_failure_caching_status(code: u16) -> FetchResponseStatus {
    use FetchResponseStatus::*;
    match code.checked_sub(status::REMEMBER_FAILURE_RANGE_START) {
        Some(0) => Uncacheable200,
        Some(1) => UncacheableError,
        Some(2) => ClientError4xx,
        Some(3) if code < status::REMEMBER_FAILURE_RANGE_END => OtherError,
        Some(4) if code < status::REMEMBER_FAILURE_RANGE_END => Dropped,
        Some(5) if code < status::REMEMBER_FAILURE_RANGE_END => Empty,
        _ => NotSet,
    }
}

/// Whether the status code is one of the reserved memoization sentinels.
pub fn is_failure_caching_status(code: u16) -> bool {
    status::is_remember_failure(code)
}

/// Memoization TTLs per failure kind, in seconds.
#[derive(Debug, Clone)]
pub struct FailurePolicy {
    ttl_sec_uncacheable_200: i32,
    ttl_sec_uncacheable_error: i32,
    ttl_sec_client_error_4xx: i32,
    ttl_sec_other_error: i32,
    ttl_sec_dropped: i32,
    ttl_sec_empty: i32,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        FailurePolicy {
            ttl_sec_uncacheable_200: 300,
            ttl_sec_uncacheable_error: 300,
            ttl_sec_client_error_4xx: 300,
            ttl_sec_other_error: 300,
            ttl_sec_dropped: 10,
            ttl_sec_empty: 300,
        }
    }
}

impl FailurePolicy {
    pub fn ttl_sec_for_status(&self, kind: FetchResponseStatus) -> i32 {
        use FetchResponseStatus::*;
        match kind {
            Uncacheable200 => self.ttl_sec_uncacheable_200,
            UncacheableError => self.ttl_sec_uncacheable_error,
            ClientError4xx => self.ttl_sec_client_error_4xx,
            OtherError => self.ttl_sec_other_error,
            Dropped => self.ttl_sec_dropped,
            Empty => self.ttl_sec_empty,
            NotSet | Ok => 0,
        }
    }

    pub fn set_ttl_sec_for_status(&mut self, kind: FetchResponseStatus, ttl_sec: i32) {
        use FetchResponseStatus::*;
        match kind {
            Uncacheable200 => self.ttl_sec_uncacheable_200 = ttl_sec,
            UncacheableError => self.ttl_sec_uncacheable_error = ttl_sec,
            ClientError4xx => self.ttl_sec_client_error_4xx = ttl_sec,
            OtherError => self.ttl_sec_other_error = ttl_sec,
            Dropped => self.ttl_sec_dropped = ttl_sec,
            Empty => self.ttl_sec_empty = ttl_sec,
            NotSet | Ok => {}
        }
    }
}

/// Classify a finished fetch for memoization.
///
/// `physical_success` is whether bytes arrived at all; `external_cacheable`
/// is the caller's cacheability verdict for the response.
pub fn classify(
    headers: &ResponseHeaders,
    body_empty: bool,
    physical_success: bool,
    external_cacheable: bool,
) -> FetchResponseStatus {
    use FetchResponseStatus::*;
    let code = headers.status_code();

    if headers.has(names::X_PSA_LOAD_SHED) {
        return Dropped;
    }
    if !physical_success || (400..500).contains(&code) {
        return ClientError4xx;
    }
    if (500..600).contains(&code) {
        return OtherError;
    }

    let redirect = matches!(code, 301 | 302 | 303 | 307);
    let success = (200..300).contains(&code);
    if (success || redirect) && body_empty && !redirect {
        return Empty;
    }
    if success && !external_cacheable {
        return if code == status::OK {
            Uncacheable200
        } else {
            UncacheableError
        };
    }
    if code == status::OK {
        Ok
    } else {
        OtherError
    }
}
