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

//! RFC 7231 date header conversion. All cache timestamps in this workspace
//! are milliseconds since the unix epoch; header dates have one-second
//! resolution.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const SECOND_MS: i64 = 1000;
pub const MINUTE_MS: i64 = 60 * SECOND_MS;
pub const HOUR_MS: i64 = 60 * MINUTE_MS;
pub const DAY_MS: i64 = 24 * HOUR_MS;
pub const YEAR_MS: i64 = 365 * DAY_MS;

/// Parse an HTTP date header value to ms since the epoch.
pub fn parse_http_date_ms(value: &str) -> Option<i64> {
    let time = httpdate::parse_http_date(value).ok()?;
    let since_epoch = time.duration_since(UNIX_EPOCH).ok()?;
    Some(since_epoch.as_millis() as i64)
}

/// Format ms since the epoch as an HTTP date header value.
///
/// Negative timestamps clamp to the epoch: httpdate cannot represent them
/// and a pre-1970 date header is equally expired either way.
pub fn format_http_date_ms(time_ms: i64) -> String {
    let time_ms = time_ms.max(0);
    let time = UNIX_EPOCH + Duration::from_millis(time_ms as u64);
    httpdate::fmt_http_date(time)
}

/// The current wall clock in ms since the epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
