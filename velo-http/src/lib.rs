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

//! HTTP header objects for the velo rewriting proxy.
//!
//! The response model centralizes RFC 7234 cacheability computation behind a
//! dirty bit, and header names keep their original case so the proxy does
//! not alter traffic it has no reason to touch.

#![allow(clippy::new_without_default)]

pub mod cache_control;
pub mod compute;
pub mod content_type;
pub mod cookies;
pub mod headers;
pub mod names;
pub mod request;
pub mod response;
pub mod time;
pub mod url;

pub use compute::CachingComputer;
pub use content_type::ContentType;
pub use headers::HeaderSet;
pub use http::method::Method;
pub use request::{RequestHeaders, RequestProperties};
pub use response::{
    HttpOptions, ResponseHeaders, ValidatorOption, VaryOption, IMPLICIT_CACHE_TTL_MS,
};

pub mod prelude {
    pub use crate::request::RequestHeaders;
    pub use crate::response::ResponseHeaders;
}
