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

//! MIME types this proxy can classify, and the predicates caching decisions
//! are built on.

/// The payload categories that matter for caching and rewriting decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MimeKind {
    Html,
    Xhtml,
    Css,
    Js,
    Json,
    Xml,
    Text,
    Jpeg,
    Png,
    Gif,
    Webp,
    Svg,
    Ico,
    Pdf,
    Woff,
}

/// A recognized content type.
#[derive(Debug, PartialEq, Eq)]
pub struct ContentType {
    pub mime: &'static str,
    pub file_extension: &'static str,
    kind: MimeKind,
}

const CONTENT_TYPES: &[ContentType] = &[
    ContentType { mime: "text/html", file_extension: ".html", kind: MimeKind::Html },
    ContentType { mime: "application/xhtml+xml", file_extension: ".xhtml", kind: MimeKind::Xhtml },
    ContentType { mime: "text/css", file_extension: ".css", kind: MimeKind::Css },
    ContentType { mime: "text/javascript", file_extension: ".js", kind: MimeKind::Js },
    ContentType { mime: "application/javascript", file_extension: ".js", kind: MimeKind::Js },
    ContentType { mime: "application/x-javascript", file_extension: ".js", kind: MimeKind::Js },
    ContentType { mime: "application/ecmascript", file_extension: ".js", kind: MimeKind::Js },
    ContentType { mime: "application/json", file_extension: ".json", kind: MimeKind::Json },
    ContentType { mime: "application/xml", file_extension: ".xml", kind: MimeKind::Xml },
    ContentType { mime: "text/xml", file_extension: ".xml", kind: MimeKind::Xml },
    ContentType { mime: "text/plain", file_extension: ".txt", kind: MimeKind::Text },
    ContentType { mime: "image/jpeg", file_extension: ".jpg", kind: MimeKind::Jpeg },
    ContentType { mime: "image/jpg", file_extension: ".jpg", kind: MimeKind::Jpeg },
    ContentType { mime: "image/png", file_extension: ".png", kind: MimeKind::Png },
    ContentType { mime: "image/gif", file_extension: ".gif", kind: MimeKind::Gif },
    ContentType { mime: "image/webp", file_extension: ".webp", kind: MimeKind::Webp },
    ContentType { mime: "image/svg+xml", file_extension: ".svg", kind: MimeKind::Svg },
    ContentType { mime: "image/x-icon", file_extension: ".ico", kind: MimeKind::Ico },
    ContentType { mime: "image/vnd.microsoft.icon", file_extension: ".ico", kind: MimeKind::Ico },
    ContentType { mime: "application/pdf", file_extension: ".pdf", kind: MimeKind::Pdf },
    ContentType { mime: "font/woff", file_extension: ".woff", kind: MimeKind::Woff },
    ContentType { mime: "font/woff2", file_extension: ".woff2", kind: MimeKind::Woff },
];

impl ContentType {
    /// Find the [ContentType] for a mime string, ignoring any parameters
    /// (`text/html; charset=utf-8` matches `text/html`).
    pub fn from_mime(mime: &str) -> Option<&'static ContentType> {
        let bare = mime.split(';').next().unwrap_or("").trim();
        CONTENT_TYPES
            .iter()
            .find(|ct| ct.mime.eq_ignore_ascii_case(bare))
    }

    pub fn kind(&self) -> MimeKind {
        self.kind
    }

    /// HTML and close relatives. These get the most conservative caching
    /// treatment because they routinely carry per-user content.
    pub fn is_html_like(&self) -> bool {
        matches!(self.kind, MimeKind::Html | MimeKind::Xhtml)
    }

    pub fn is_css(&self) -> bool {
        self.kind == MimeKind::Css
    }

    pub fn is_js_like(&self) -> bool {
        matches!(self.kind, MimeKind::Js | MimeKind::Json)
    }

    pub fn is_image(&self) -> bool {
        matches!(
            self.kind,
            MimeKind::Jpeg
                | MimeKind::Png
                | MimeKind::Gif
                | MimeKind::Webp
                | MimeKind::Svg
                | MimeKind::Ico
        )
    }

    /// Whether gzip is expected to shrink this payload.
    pub fn is_compressible(&self) -> bool {
        matches!(
            self.kind,
            MimeKind::Html
                | MimeKind::Xhtml
                | MimeKind::Css
                | MimeKind::Js
                | MimeKind::Json
                | MimeKind::Xml
                | MimeKind::Text
                | MimeKind::Svg
        )
    }

    /// Whether resources of this type are typically immutable assets that
    /// browsers cache heuristically.
    pub fn is_likely_static_resource(&self) -> bool {
        self.is_css() || self.is_js_like() || self.is_image()
            || matches!(self.kind, MimeKind::Pdf | MimeKind::Woff)
    }
}

/// The content type of a response, from the **last** `Content-Type` header.
/// Origins that emit several are taken at their final word.
pub fn determine_content_type(headers: &crate::headers::HeaderSet) -> Option<&'static ContentType> {
    headers
        .lookup(crate::names::CONTENT_TYPE)
        .last()
        .and_then(|v| ContentType::from_mime(v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_content_type_wins() {
        let mut h = crate::headers::HeaderSet::new();
        h.add("Content-Type", "text/html").unwrap();
        h.add("Content-Type", "text/css").unwrap();
        assert!(determine_content_type(&h).unwrap().is_css());
    }

    #[test]
    fn lookup_strips_parameters() {
        let ct = ContentType::from_mime("text/html; charset=UTF-8").unwrap();
        assert!(ct.is_html_like());
        assert!(ct.is_compressible());
        assert!(!ct.is_likely_static_resource());
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let ct = ContentType::from_mime("Text/CSS").unwrap();
        assert!(ct.is_css());
        assert!(ct.is_likely_static_resource());
    }

    #[test]
    fn unknown_type() {
        assert!(ContentType::from_mime("application/octet-stream").is_none());
    }

    #[test]
    fn image_predicates() {
        let ct = ContentType::from_mime("image/webp").unwrap();
        assert!(ct.is_image());
        assert!(!ct.is_compressible());
        assert!(ct.is_likely_static_resource());
    }
}
