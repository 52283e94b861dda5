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

//! A framed, shareable byte record holding a response's headers and body.
//!
//! The stored form is `[u32-le header block size][header block][body]`,
//! where the header block is the HTTP/1.1 text serialization. While being
//! built, headers and body are kept apart so either may arrive first (the
//! recorder learns the final headers only at the end of the stream).
//! `share()` assembles and freezes the record; after the first share the
//! contents are immutable and cheap to hand around.

use bytes::{Buf, BufMut, Bytes};
use velo_error::{Error, ErrorType::*, Result};
use velo_http::{HttpOptions, ResponseHeaders};

const FRAME_PREFIX_SIZE: usize = 4;

#[derive(Debug, Clone)]
enum State {
    Building {
        header_block: Option<Vec<u8>>,
        body: Vec<u8>,
    },
    Shared(Bytes),
}

/// The cacheable (headers, body) record.
#[derive(Debug, Clone)]
pub struct HttpValue {
    state: State,
}

impl Default for HttpValue {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpValue {
    pub fn new() -> Self {
        HttpValue {
            state: State::Building {
                header_block: None,
                body: Vec::new(),
            },
        }
    }

    /// Adopt the raw stored form of another value, e.g. bytes read back from
    /// the blob cache.
    pub fn decode(bytes: Bytes) -> Self {
        HttpValue {
            state: State::Shared(bytes),
        }
    }

    /// Whether this value holds nothing at all.
    pub fn empty(&self) -> bool {
        match &self.state {
            State::Building { header_block, body } => header_block.is_none() && body.is_empty(),
            State::Shared(bytes) => bytes.is_empty(),
        }
    }

    /// Size of the body region.
    pub fn contents_size(&self) -> usize {
        match &self.state {
            State::Building { body, .. } => body.len(),
            State::Shared(bytes) => self.shared_regions(bytes).map_or(0, |(_, body)| body.len()),
        }
    }

    pub fn clear(&mut self) {
        self.state = State::Building {
            header_block: None,
            body: Vec::new(),
        };
    }

    /// Store the serialized form of `headers`. May be called before or
    /// after body writes, but not after the value was shared.
    pub fn set_headers(&mut self, headers: &ResponseHeaders) {
        match &mut self.state {
            State::Building { header_block, .. } => {
                let mut block = Vec::with_capacity(headers.size_estimate() as usize);
                headers.write_as_http(&mut block);
                *header_block = Some(block);
            }
            State::Shared(_) => {
                debug_assert!(false, "set_headers on a shared HttpValue");
            }
        }
    }

    /// Append body bytes. Not allowed after the value was shared.
    pub fn write(&mut self, data: &[u8]) {
        match &mut self.state {
            State::Building { body, .. } => body.extend_from_slice(data),
            State::Shared(_) => {
                debug_assert!(false, "write on a shared HttpValue");
            }
        }
    }

    /// Take a shared read view of another value's bytes, discarding any
    /// write in progress here.
    pub fn link(&mut self, other: &HttpValue) {
        if let Some(bytes) = other.snapshot() {
            self.state = State::Shared(bytes);
        } else {
            self.clear();
        }
    }

    /// Freeze into the stored form and return a refcounted handle to it.
    /// Subsequent shares return the same bytes.
    pub fn share(&mut self) -> Bytes {
        if let State::Building { header_block, body } = &self.state {
            let assembled = Self::assemble(header_block.as_deref().unwrap_or(b""), body);
            self.state = State::Shared(assembled);
        }
        match &self.state {
            State::Shared(bytes) => bytes.clone(),
            State::Building { .. } => unreachable!(),
        }
    }

    /// Parse the header block. The returned headers have their cache fields
    /// computed.
    pub fn extract_headers(&self, http_options: HttpOptions) -> Result<ResponseHeaders> {
        let block = match &self.state {
            State::Building { header_block, .. } => match header_block {
                Some(block) => Bytes::copy_from_slice(block),
                None => return Error::e_explain(CacheDecodeError, "HttpValue has no headers"),
            },
            State::Shared(bytes) => {
                let (headers, _) = self
                    .shared_regions(bytes)
                    .ok_or_else(|| Error::explain(CacheDecodeError, "bad HttpValue framing"))?;
                headers
            }
        };
        let text = std::str::from_utf8(&block)
            .map_err(|e| Error::because(CacheDecodeError, "non-utf8 header block", e))?;
        let mut headers = ResponseHeaders::from_http_block(text, http_options)?;
        headers.compute_caching();
        Ok(headers)
    }

    /// The body region. Zero-copy for shared values.
    pub fn extract_contents(&self) -> Bytes {
        match &self.state {
            State::Building { body, .. } => Bytes::copy_from_slice(body),
            State::Shared(bytes) => self
                .shared_regions(bytes)
                .map(|(_, body)| body)
                .unwrap_or_else(Bytes::new),
        }
    }

    fn snapshot(&self) -> Option<Bytes> {
        match &self.state {
            State::Building { header_block, body } => {
                if header_block.is_none() && body.is_empty() {
                    None
                } else {
                    Some(Self::assemble(
                        header_block.as_deref().unwrap_or(b""),
                        body,
                    ))
                }
            }
            State::Shared(bytes) => Some(bytes.clone()),
        }
    }

    fn assemble(header_block: &[u8], body: &[u8]) -> Bytes {
        let mut buf = Vec::with_capacity(FRAME_PREFIX_SIZE + header_block.len() + body.len());
        buf.put_u32_le(header_block.len() as u32);
        buf.put_slice(header_block);
        buf.put_slice(body);
        Bytes::from(buf)
    }

    fn shared_regions(&self, bytes: &Bytes) -> Option<(Bytes, Bytes)> {
        if bytes.len() < FRAME_PREFIX_SIZE {
            return None;
        }
        let mut prefix = &bytes[..FRAME_PREFIX_SIZE];
        let header_len = prefix.get_u32_le() as usize;
        if bytes.len() < FRAME_PREFIX_SIZE + header_len {
            return None;
        }
        let headers = bytes.slice(FRAME_PREFIX_SIZE..FRAME_PREFIX_SIZE + header_len);
        let body = bytes.slice(FRAME_PREFIX_SIZE + header_len..);
        Some((headers, body))
    }
}
