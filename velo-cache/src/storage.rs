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

//! The byte-level blob cache abstraction backing [crate::HttpCache].
//!
//! The blob cache knows nothing about HTTP: keys are opaque strings, values
//! are opaque bytes. A tiered implementation yields one candidate per level,
//! fastest first; the HTTP layer validates each candidate in turn and keeps
//! per-level latency accounting.

use async_trait::async_trait;
use bytes::Bytes;

/// Whether a key was found in a given level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Available,
    NotFound,
}

/// One lookup answer from one cache level.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub state: KeyState,
    pub bytes: Option<Bytes>,
}

impl Candidate {
    pub fn available(bytes: Bytes) -> Self {
        Candidate {
            state: KeyState::Available,
            bytes: Some(bytes),
        }
    }

    pub fn not_found() -> Self {
        Candidate {
            state: KeyState::NotFound,
            bytes: None,
        }
    }
}

/// A key -> bytes store. Implementations serialize their own access; the
/// HTTP layer calls them from many request tasks concurrently.
#[async_trait]
pub trait BlobCache: Send + Sync {
    /// Look up `key`, returning one candidate per cache level probed,
    /// ordered fastest level first. A plain single-level cache returns
    /// exactly one candidate.
    async fn get(&self, key: &str) -> Vec<Candidate>;

    /// Store `value` under `key`.
    async fn put(&self, key: &str, value: Bytes);

    /// Remove `key` from every level.
    async fn delete(&self, key: &str);

    /// The backend's name, for logging.
    fn name(&self) -> &str;
}
