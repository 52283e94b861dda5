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

//! An ordered multi-map of HTTP header name/value pairs.
//!
//! Lookup is case-insensitive while the original spelling of each name is
//! preserved for serialization, so the proxy does not alter traffic it has no
//! reason to touch. Values for one name keep their insertion order.

use bytes::{BufMut, Bytes};
use http::header::{HeaderName, HeaderValue};
use log::warn;
use velo_error::{ErrorType::*, OrErr, Result};

pub use http::HeaderMap as HMap;

/* An ordered header map storing the original case of each header name:
   HMap({ "foo": ["Foo", "foO"] }).
   HeaderMap iteration order is "arbitrary, but consistent", so the case map
   and the value map, fed identically, iterate in the same order. */
type CaseMap = HMap<CaseName>;

/// A header name with its original spelling retained.
#[derive(Debug, Clone)]
struct CaseName(Bytes);

impl CaseName {
    fn from(name: &str) -> Self {
        CaseName(Bytes::copy_from_slice(name.as_bytes()))
    }

    fn as_slice(&self) -> &[u8] {
        &self.0
    }

    fn as_str(&self) -> &str {
        // constructed from &str only
        std::str::from_utf8(&self.0).unwrap_or("")
    }
}

/// Ordered case-preserving header multi-map.
#[derive(Debug, Clone, Default)]
pub struct HeaderSet {
    values: HMap<HeaderValue>,
    names: CaseMap,
}

impl HeaderSet {
    pub fn new() -> Self {
        HeaderSet::default()
    }

    /// Number of header lines.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.names.clear();
    }

    /// Append a header line. Existing lines under the same name are kept.
    pub fn add(&mut self, name: &str, value: &str) -> Result<()> {
        let header_name: HeaderName = name
            .as_bytes()
            .try_into()
            .or_err(InvalidHTTPHeader, "invalid header name")?;
        let header_value: HeaderValue = value
            .try_into()
            .or_err(InvalidHTTPHeader, "invalid header value")?;
        self.names.append(header_name.clone(), CaseName::from(name));
        self.values.append(header_name, header_value);
        Ok(())
    }

    /// Replace all lines under `name` with a single line.
    pub fn replace(&mut self, name: &str, value: &str) -> Result<()> {
        let header_name: HeaderName = name
            .as_bytes()
            .try_into()
            .or_err(InvalidHTTPHeader, "invalid header name")?;
        let header_value: HeaderValue = value
            .try_into()
            .or_err(InvalidHTTPHeader, "invalid header value")?;
        self.names.insert(header_name.clone(), CaseName::from(name));
        self.values.insert(header_name, header_value);
        Ok(())
    }

    /// Remove every line under `name`. Returns whether anything was removed.
    pub fn remove_all(&mut self, name: &str) -> bool {
        let removed = self.values.remove(name).is_some();
        if removed {
            self.names.remove(name);
        }
        removed
    }

    /// Remove only the lines under `name` whose full value equals `value`
    /// (ASCII case-insensitive). Returns whether anything was removed.
    pub fn remove(&mut self, name: &str, value: &str) -> bool {
        let existing: Vec<String> = self.lookup(name).iter().map(|v| v.to_string()).collect();
        if existing.is_empty() {
            return false;
        }
        let keep: Vec<&String> = existing
            .iter()
            .filter(|v| !v.eq_ignore_ascii_case(value))
            .collect();
        if keep.len() == existing.len() {
            return false;
        }
        let case = self.original_case(name);
        self.remove_all(name);
        for v in keep {
            // values were valid when stored
            let _ = self.add(&case, v);
        }
        true
    }

    /// All values under `name`, in insertion order. Values that are not valid
    /// UTF-8 are skipped with a warning.
    pub fn lookup(&self, name: &str) -> Vec<&str> {
        self.values
            .get_all(name)
            .iter()
            .filter_map(|v| match v.to_str() {
                Ok(s) => Some(s),
                Err(_) => {
                    warn!("skipping non-utf8 value for header {}", name);
                    None
                }
            })
            .collect()
    }

    /// The value under `name`, only when exactly one line with that name
    /// exists.
    pub fn lookup1(&self, name: &str) -> Option<&str> {
        let mut iter = self.values.get_all(name).iter();
        let first = iter.next()?;
        if iter.next().is_some() {
            return None;
        }
        first.to_str().ok()
    }

    pub fn has(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Whether any comma-separated token of any line under `name` equals
    /// `token` (ASCII case-insensitive, surrounding whitespace ignored).
    pub fn has_value(&self, name: &str, token: &str) -> bool {
        self.lookup(name)
            .iter()
            .flat_map(|v| v.split(','))
            .any(|t| t.trim().eq_ignore_ascii_case(token))
    }

    /// The stored spelling of `name`, falling back to the given spelling.
    fn original_case(&self, name: &str) -> String {
        self.names
            .get(name)
            .map(|c| c.as_str().to_string())
            .unwrap_or_else(|| name.to_string())
    }

    /// Iterate over (original-case name, value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        let case_iter = self.names.iter().zip(self.values.iter());
        case_iter.map(|((name, case_name), (name2, value))| {
            if name != name2 {
                // in case HeaderMap iteration order changes in a future version
                panic!("header iter mismatch {}, {}", name, name2);
            }
            (case_name.as_str(), value.to_str().unwrap_or(""))
        })
    }

    /// Write all header lines in wire format, preserving name case. The
    /// final blank line is the caller's business.
    pub fn write_http(&self, buf: &mut impl BufMut) {
        const CRLF: &[u8; 2] = b"\r\n";
        const DELIMITER: &[u8; 2] = b": ";
        let iter = self.names.iter().zip(self.values.iter());
        for ((name, case_name), (name2, value)) in iter {
            if name != name2 {
                panic!("header iter mismatch {}, {}", name, name2);
            }
            buf.put_slice(case_name.as_slice());
            buf.put_slice(DELIMITER);
            buf.put_slice(value.as_ref());
            buf.put_slice(CRLF);
        }
    }

    /// Parse `Name: value` lines (separated by CRLF or LF) into this set.
    /// Malformed lines are an error; the set may be partially filled then.
    pub fn parse_lines(&mut self, block: &str) -> Result<()> {
        for line in block.split("\r\n").flat_map(|l| l.split('\n')) {
            if line.is_empty() {
                continue;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| velo_error::Error::explain(InvalidHTTPHeader, "missing colon"))?;
            self.add(name.trim(), value.trim())?;
        }
        Ok(())
    }
}
