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

//! Cache keying and the content hashing capability.
//!
//! An entry is addressed by `(url, fragment)`. The fragment is an extra
//! namespace (typically the Host header, sometimes a shared-cache opt-in
//! name) orthogonal to the URL; it keeps mutually untrusting sites from
//! poisoning each other's entries. The composite string handed to the blob
//! cache is `v<version>/<fragment>/<url>`; bumping the version flushes every
//! entry at once.

use blake2::{Blake2b, Digest};

/// A cache address: URL plus namespace fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub url: String,
    pub fragment: String,
}

impl CacheKey {
    pub fn new(url: impl Into<String>, fragment: impl Into<String>) -> Self {
        CacheKey {
            url: url.into(),
            fragment: fragment.into(),
        }
    }

    /// The byte-exact blob cache key.
    pub fn composite(&self, version: i32) -> String {
        composite_key(&self.url, &self.fragment, version)
    }
}

/// Format the composite key. An empty fragment omits its slash.
pub fn composite_key(url: &str, fragment: &str, version: i32) -> String {
    debug_assert!(
        !fragment.contains('/'),
        "cache fragment must not contain a slash"
    );
    if fragment.is_empty() {
        format!("v{}/{}", version, url)
    } else {
        format!("v{}/{}/{}", version, fragment, url)
    }
}

// 128-bit output is plenty for content addressing and maps to a 32-char hex
// string. Consistency across machines matters (keys live in shared caches),
// so no randomized hashers here.
type Blake2b128 = Blake2b<blake2::digest::consts::U16>;

/// The content hashing capability, used for synthesized etags.
pub trait Hasher: Send + Sync {
    /// Hex digest of the content.
    fn hash(&self, content: &[u8]) -> String;
}

/// Default [Hasher] over 128-bit blake2.
#[derive(Debug, Default)]
pub struct Blake2Hasher;

impl Hasher for Blake2Hasher {
    fn hash(&self, content: &[u8]) -> String {
        let mut hasher = Blake2b128::new();
        hasher.update(content);
        hex::encode(hasher.finalize())
    }
}
