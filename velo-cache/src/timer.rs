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

//! The clock capability. The cache never reads the system clock directly so
//! tests can drive expiry deterministically.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of wall-clock time in ms/us since the unix epoch.
pub trait Timer: Send + Sync {
    fn now_us(&self) -> i64;

    fn now_ms(&self) -> i64 {
        self.now_us() / 1000
    }
}

/// The real clock.
#[derive(Debug, Default)]
pub struct SystemTimer;

impl Timer for SystemTimer {
    fn now_us(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or(0)
    }
}

/// A manually advanced clock for tests.
#[derive(Debug, Default)]
pub struct MockTimer {
    now_us: AtomicI64,
}

impl MockTimer {
    pub fn new(now_ms: i64) -> Self {
        MockTimer {
            now_us: AtomicI64::new(now_ms * 1000),
        }
    }

    pub fn set_time_ms(&self, now_ms: i64) {
        self.now_us.store(now_ms * 1000, Ordering::Relaxed);
    }

    pub fn advance_ms(&self, delta_ms: i64) {
        self.now_us.fetch_add(delta_ms * 1000, Ordering::Relaxed);
    }
}

impl Timer for MockTimer {
    fn now_us(&self) -> i64 {
        self.now_us.load(Ordering::Relaxed)
    }
}
