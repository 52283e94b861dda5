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

//! Streaming and whole-buffer gzip/deflate codecs.

use bytes::Bytes;
use flate2::write::{GzDecoder, GzEncoder, ZlibDecoder};
use std::io::Write;
use std::time::{Duration, Instant};
use velo_error::{ErrorType, OrErr, Result};

/// The type of error to return when (de)compression fails
pub const COMPRESSION_ERROR: ErrorType = ErrorType::new("CompressionError");

/// The content codings the cache can undo transparently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentCoding {
    Gzip,
    Deflate,
}

impl ContentCoding {
    /// Match a `Content-Encoding` token.
    pub fn from_token(token: &str) -> Option<Self> {
        if token.eq_ignore_ascii_case("gzip") {
            Some(ContentCoding::Gzip)
        } else if token.eq_ignore_ascii_case("deflate") {
            Some(ContentCoding::Deflate)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentCoding::Gzip => "gzip",
            ContentCoding::Deflate => "deflate",
        }
    }
}

/// The trait for both compress and decompress because the interface and
/// syntax are the same: encode some bytes to other bytes.
pub trait Encode {
    /// Encode the input bytes. `end` flags the end of the entire input so
    /// the codec can flush whatever it buffered.
    fn encode(&mut self, input: &[u8], end: bool) -> Result<Bytes>;
    /// (name, total in bytes, total out bytes, time spent encoding).
    fn stat(&self) -> (&'static str, usize, usize, Duration);
}

/// Streaming gzip compressor.
pub struct Compressor {
    compress: GzEncoder<Vec<u8>>,
    total_in: usize,
    total_out: usize,
    duration: Duration,
}

impl Compressor {
    pub fn new(level: u32) -> Compressor {
        Compressor {
            compress: GzEncoder::new(vec![], flate2::Compression::new(level)),
            total_in: 0,
            total_out: 0,
            duration: Duration::new(0, 0),
        }
    }
}

impl Encode for Compressor {
    // infallible: compression accepts any input
    fn encode(&mut self, input: &[u8], end: bool) -> Result<Bytes> {
        const MAX_INIT_COMPRESSED_BUF_SIZE: usize = 16 * 1024;
        let start = Instant::now();
        self.total_in += input.len();
        self.compress
            .get_mut()
            .reserve(std::cmp::min(MAX_INIT_COMPRESSED_BUF_SIZE, input.len()));
        self.compress.write_all(input).unwrap(); // write to vec, never fails
        if end {
            self.compress.try_finish().unwrap();
        }
        self.total_out += self.compress.get_ref().len();
        self.duration += start.elapsed();
        Ok(std::mem::take(self.compress.get_mut()).into())
    }

    fn stat(&self) -> (&'static str, usize, usize, Duration) {
        ("gzip", self.total_in, self.total_out, self.duration)
    }
}

enum DecodeInner {
    Gzip(GzDecoder<Vec<u8>>),
    Deflate(ZlibDecoder<Vec<u8>>),
}

/// Streaming gzip/deflate decompressor.
pub struct Decompressor {
    decompress: DecodeInner,
    total_in: usize,
    total_out: usize,
    duration: Duration,
}

impl Decompressor {
    pub fn new(coding: ContentCoding) -> Self {
        let decompress = match coding {
            ContentCoding::Gzip => DecodeInner::Gzip(GzDecoder::new(vec![])),
            ContentCoding::Deflate => DecodeInner::Deflate(ZlibDecoder::new(vec![])),
        };
        Decompressor {
            decompress,
            total_in: 0,
            total_out: 0,
            duration: Duration::new(0, 0),
        }
    }

    fn write_all(&mut self, input: &[u8]) -> std::io::Result<()> {
        match &mut self.decompress {
            DecodeInner::Gzip(d) => d.write_all(input),
            DecodeInner::Deflate(d) => d.write_all(input),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.decompress {
            DecodeInner::Gzip(d) => d.try_finish(),
            DecodeInner::Deflate(d) => d.try_finish(),
        }
    }

    fn buffer_mut(&mut self) -> &mut Vec<u8> {
        match &mut self.decompress {
            DecodeInner::Gzip(d) => d.get_mut(),
            DecodeInner::Deflate(d) => d.get_mut(),
        }
    }

    fn name(&self) -> &'static str {
        match &self.decompress {
            DecodeInner::Gzip(_) => "de-gzip",
            DecodeInner::Deflate(_) => "de-deflate",
        }
    }
}

impl Encode for Decompressor {
    fn encode(&mut self, input: &[u8], end: bool) -> Result<Bytes> {
        let start = Instant::now();
        self.total_in += input.len();
        let name = self.name();
        self.write_all(input)
            .or_err(COMPRESSION_ERROR, "while decompressing")
            .map_err(|e| {
                log::warn!("{} stream error", name);
                e
            })?;
        if end {
            self.flush().or_err(COMPRESSION_ERROR, "while flushing decompressor")?;
        }
        self.total_out += self.buffer_mut().len();
        self.duration += start.elapsed();
        Ok(std::mem::take(self.buffer_mut()).into())
    }

    fn stat(&self) -> (&'static str, usize, usize, Duration) {
        (self.name(), self.total_in, self.total_out, self.duration)
    }
}

/// Whether the buffer starts with the gzip magic bytes.
pub fn has_gzip_magic_bytes(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b
}

/// Whole-buffer gzip.
pub fn gzip_bytes(level: u32, input: &[u8]) -> Result<Bytes> {
    let mut compressor = Compressor::new(level);
    compressor.encode(input, true)
}

/// Whole-buffer inflate of a gzip or deflate stream.
pub fn inflate_bytes(coding: ContentCoding, input: &[u8]) -> Result<Bytes> {
    let mut decompressor = Decompressor::new(coding);
    decompressor.encode(input, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gzip_round_trip() {
        let input = b"abcdefg abcdefg abcdefg";
        let compressed = gzip_bytes(6, input).unwrap();
        assert!(has_gzip_magic_bytes(&compressed));
        let inflated = inflate_bytes(ContentCoding::Gzip, &compressed).unwrap();
        assert_eq!(&inflated[..], input);
    }

    #[test]
    fn streaming_decompress_in_chunks() {
        let input: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let compressed = gzip_bytes(6, &input).unwrap();

        let mut decompressor = Decompressor::new(ContentCoding::Gzip);
        let mut output = Vec::new();
        let mid = compressed.len() / 2;
        output.extend_from_slice(&decompressor.encode(&compressed[..mid], false).unwrap());
        output.extend_from_slice(&decompressor.encode(&compressed[mid..], true).unwrap());
        assert_eq!(output, input);
        let (name, total_in, _, _) = decompressor.stat();
        assert_eq!(name, "de-gzip");
        assert_eq!(total_in, compressed.len());
    }

    #[test]
    fn garbage_input_errors() {
        let mut decompressor = Decompressor::new(ContentCoding::Gzip);
        let result = decompressor.encode(b"definitely not gzip data at all....", true);
        assert!(result.is_err());
    }

    #[test]
    fn magic_bytes() {
        assert!(has_gzip_magic_bytes(&[0x1f, 0x8b, 0x08]));
        assert!(!has_gzip_magic_bytes(b"plain"));
        assert!(!has_gzip_magic_bytes(&[0x1f]));
    }
}
