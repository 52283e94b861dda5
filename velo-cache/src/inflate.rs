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

//! Transparent (de)compression for fetch chains and cache records.
//!
//! The cache stores one canonical encoding; when the client cannot accept
//! what the origin sent, this decorator inflates the body mid-stream and
//! rewrites the headers to match. Only the last `Content-Encoding` token is
//! consulted.

use crate::compression::{
    gzip_bytes, has_gzip_magic_bytes, inflate_bytes, ContentCoding, Decompressor, Encode,
};
use crate::delegate_fetch_headers;
use crate::fetch::{propagate_content_length, AsyncFetch, FetchState};
use crate::value::HttpValue;
use async_trait::async_trait;
use log::debug;
use velo_http::names;
use velo_http::ResponseHeaders;

/// A fetch decorator that gunzips/inflates the body when the client did not
/// ask for the origin's encoding.
pub struct InflatingFetch {
    state: FetchState,
    base: Box<dyn AsyncFetch>,
    // what the client itself asked for, captured before we touch the request
    request_accepts_compressed: bool,
    inflater: Option<Decompressor>,
    inflate_failure: bool,
}

impl InflatingFetch {
    pub fn new(mut base: Box<dyn AsyncFetch>) -> Self {
        let request_accepts_compressed = {
            let req = base.request_headers();
            req.accepts_encoding("gzip") || req.accepts_encoding("deflate")
        };
        InflatingFetch {
            state: FetchState::default(),
            base,
            request_accepts_compressed,
            inflater: None,
            inflate_failure: false,
        }
    }

    /// Ask the backend for gzip even though the client did not; the response
    /// will be inflated transparently before it reaches the client.
    pub fn enable_gzip_from_backend(&mut self) {
        if !self.request_accepts_compressed {
            let req = self.base.request_headers();
            if !req.accepts_gzip() {
                // formatted constant value, cannot fail
                let _ = req.add(names::ACCEPT_ENCODING, "gzip");
            }
        }
    }

    /// Drop the decompression state.
    pub fn reset(&mut self) {
        self.inflater = None;
        self.inflate_failure = false;
    }

    /// Remove the last `Content-Encoding` token, e.g. after undoing it.
    fn strip_last_content_encoding(headers: &mut ResponseHeaders) {
        let lines: Vec<String> = headers
            .lookup(names::CONTENT_ENCODING)
            .iter()
            .map(|v| v.to_string())
            .collect();
        let Some(last_line) = lines.last() else {
            return;
        };
        let mut tokens: Vec<&str> = last_line
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect();
        tokens.pop();
        headers.remove_all(names::CONTENT_ENCODING);
        for line in &lines[..lines.len() - 1] {
            let _ = headers.add(names::CONTENT_ENCODING, line);
        }
        if !tokens.is_empty() {
            let _ = headers.add(names::CONTENT_ENCODING, &tokens.join(", "));
        }
    }

    /// Whole-buffer gunzip of a cache record, rewriting the headers. Returns
    /// false (with `dest` untouched) when the record is not gzipped or the
    /// stream is corrupt.
    pub fn ungzip_value_if_compressed(
        src: &HttpValue,
        headers: &mut ResponseHeaders,
        dest: &mut HttpValue,
    ) -> bool {
        if !headers.is_gzipped() {
            return false;
        }
        let contents = src.extract_contents();
        let Ok(inflated) = inflate_bytes(ContentCoding::Gzip, &contents) else {
            debug!("corrupt gzip stream in cached value");
            return false;
        };
        headers.remove(names::CONTENT_ENCODING, "gzip");
        headers.remove_all(names::TRANSFER_ENCODING);
        if !headers.has_value(names::VARY, names::ACCEPT_ENCODING) {
            let _ = headers.add(names::VARY, names::ACCEPT_ENCODING);
        }
        headers.set_content_length(inflated.len() as i64);
        headers.compute_caching();
        dest.clear();
        dest.set_headers(headers);
        dest.write(&inflated);
        true
    }

    /// Whole-buffer gzip of a cache record, rewriting the headers.
    pub fn gzip_value(
        level: u32,
        src: &HttpValue,
        dest: &mut HttpValue,
        headers: &mut ResponseHeaders,
    ) -> bool {
        let contents = src.extract_contents();
        let Ok(compressed) = gzip_bytes(level, &contents) else {
            return false;
        };
        let _ = headers.add(names::CONTENT_ENCODING, "gzip");
        headers.set_original_content_length(contents.len() as i64);
        if !headers.has_value(names::VARY, names::ACCEPT_ENCODING) {
            let _ = headers.add(names::VARY, names::ACCEPT_ENCODING);
        }
        headers.set_content_length(compressed.len() as i64);
        headers.compute_caching();
        dest.clear();
        dest.set_headers(headers);
        dest.write(&compressed);
        true
    }

    /// Re-export of the gzip sniff so recorder-side callers need one import.
    pub fn has_gzip_magic(data: &[u8]) -> bool {
        has_gzip_magic_bytes(data)
    }
}

#[async_trait]
impl AsyncFetch for InflatingFetch {
    delegate_fetch_headers!(base);

    async fn handle_headers_complete(&mut self) {
        if !self.request_accepts_compressed {
            let coding = self
                .base
                .response_headers()
                .last_content_encoding()
                .and_then(|t| ContentCoding::from_token(&t));
            if let Some(coding) = coding {
                self.inflater = Some(Decompressor::new(coding));
                let headers = self.base.response_headers();
                Self::strip_last_content_encoding(headers);
                // the inflated length is unknown until the stream ends
                headers.remove_all(names::CONTENT_LENGTH);
                headers.compute_caching();
            }
        }
        propagate_content_length(&self.state, self.base.as_mut());
        self.base.headers_complete().await;
    }

    async fn handle_write(&mut self, data: &[u8]) -> bool {
        if self.inflate_failure {
            return false;
        }
        match self.inflater.as_mut() {
            Some(inflater) => match inflater.encode(data, false) {
                Ok(inflated) => self.base.write(&inflated).await,
                Err(_) => {
                    self.inflate_failure = true;
                    false
                }
            },
            None => self.base.write(data).await,
        }
    }

    async fn handle_flush(&mut self) -> bool {
        self.base.flush().await
    }

    async fn handle_done(mut self: Box<Self>, success: bool) {
        if let Some(inflater) = self.inflater.as_mut() {
            if !self.inflate_failure {
                match inflater.encode(&[], true) {
                    Ok(tail) => {
                        if !self.base.write(&tail).await {
                            self.inflate_failure = true;
                        }
                    }
                    Err(_) => self.inflate_failure = true,
                }
            }
        }
        let success = success && !self.inflate_failure;
        self.base.done(success).await;
    }
}
