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

#![warn(clippy::all)]
//! The library to provide the struct to represent errors in velo.

pub use std::error::Error as ErrorTrait;
use std::fmt;
use std::fmt::Debug;
use std::result::Result as StdResult;

/// The boxed [Error], the desired way to pass [Error]
pub type BError = Box<Error>;
/// Syntax sugar for `std::Result<T, BError>`
pub type Result<T, E = BError> = StdResult<T, E>;

/// The struct that represents an error
#[derive(Debug)]
pub struct Error {
    /// the type of error
    pub etype: ErrorType,
    /// chain to the cause of this error
    pub cause: Option<Box<(dyn ErrorTrait + Send + Sync)>>,
    /// an arbitrary string that explains the context when the error happens
    pub context: Option<Box<str>>,
}

/// Predefined type of errors
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorType {
    /// A header line or first line could not be parsed
    InvalidHTTPHeader,
    /// An HTTP date header could not be parsed
    InvalidTimestamp,
    /// A gzip/deflate stream could not be encoded or decoded
    CompressionError,
    /// A stored cache record could not be decoded
    CacheDecodeError,
    /// The cache storage backend reported an error
    StorageError,
    /// Catch-all for internal logic errors
    InternalError,
    /// Custom error with static name
    Custom(&'static str),
}

impl ErrorType {
    /// Create a new custom error type
    pub const fn new(name: &'static str) -> Self {
        ErrorType::Custom(name)
    }

    /// Return the string representation for this error type
    pub fn as_str(&self) -> &str {
        match self {
            ErrorType::InvalidHTTPHeader => "InvalidHTTPHeader",
            ErrorType::InvalidTimestamp => "InvalidTimestamp",
            ErrorType::CompressionError => "CompressionError",
            ErrorType::CacheDecodeError => "CacheDecodeError",
            ErrorType::StorageError => "StorageError",
            ErrorType::InternalError => "InternalError",
            ErrorType::Custom(name) => name,
        }
    }
}

impl Error {
    /// Simply create the error. See other functions that provide less verbose interfaces.
    #[inline]
    pub fn create(
        etype: ErrorType,
        context: Option<Box<str>>,
        cause: Option<Box<dyn ErrorTrait + Send + Sync>>,
    ) -> BError {
        Box::new(Error {
            etype,
            cause,
            context,
        })
    }

    /// Create an error with the given type
    #[inline]
    pub fn new(e: ErrorType) -> BError {
        Self::create(e, None, None)
    }

    /// Create an error with the given type, a context string and the causing error.
    /// This method is usually used when there the error is caused by another error.
    #[inline]
    pub fn because<S: Into<Box<str>>, E: Into<Box<dyn ErrorTrait + Send + Sync>>>(
        e: ErrorType,
        context: S,
        cause: E,
    ) -> BError {
        Self::create(e, Some(context.into()), Some(cause.into()))
    }

    /// Short for `Err(Self::because(...))`
    #[inline]
    pub fn e_because<T, S: Into<Box<str>>, E: Into<Box<dyn ErrorTrait + Send + Sync>>>(
        e: ErrorType,
        context: S,
        cause: E,
    ) -> Result<T> {
        Err(Self::because(e, context, cause))
    }

    /// Create an error with context but no direct causing error
    #[inline]
    pub fn explain<S: Into<Box<str>>>(e: ErrorType, context: S) -> BError {
        Self::create(e, Some(context.into()), None)
    }

    /// Short for `Err(Self::explain(...))`
    #[inline]
    pub fn e_explain<T, S: Into<Box<str>>>(e: ErrorType, context: S) -> Result<T> {
        Err(Self::explain(e, context))
    }

    /// The most underlying cause of this error, self included
    pub fn root_cause(&self) -> &(dyn ErrorTrait + Send + Sync + 'static) {
        let mut cause = self;
        while let Some(c) = cause.cause.as_ref().and_then(|c| c.downcast_ref::<Error>()) {
            cause = c;
        }
        cause
    }

    /// Whether this error is of the given type
    pub fn etype(&self) -> &ErrorType {
        &self.etype
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, " {}", self.etype.as_str())?;
        if let Some(c) = self.context.as_ref() {
            write!(f, " context: {}", c)?;
        }
        if let Some(c) = self.cause.as_ref() {
            write!(f, " cause: {}", c)?;
        }
        Ok(())
    }
}

impl ErrorTrait for Error {}

/// Helper trait to add more context to a given error
pub trait Context<T> {
    /// Wrap the `Err(E)` in [Result] with more context, the existing error will be the cause.
    fn err_context<C: Into<Box<str>>, F: FnOnce() -> C>(self, context: F) -> Result<T, BError>;
}

impl<T> Context<T> for Result<T, BError> {
    fn err_context<C: Into<Box<str>>, F: FnOnce() -> C>(self, context: F) -> Result<T, BError> {
        self.map_err(|e| Error::because(e.etype.clone(), context(), e))
    }
}

/// Helper trait to chain errors with context
pub trait OrErr<T, E> {
    /// Wrap the E in [Result] with new [ErrorType] and context, the existing E will be the cause.
    fn or_err(self, et: ErrorType, context: &'static str) -> Result<T, BError>
    where
        E: Into<Box<dyn ErrorTrait + Send + Sync>>;

    /// Similar to or_err(), but takes a closure to build the context string lazily.
    fn or_err_with<C: Into<Box<str>>, F: FnOnce() -> C>(
        self,
        et: ErrorType,
        context: F,
    ) -> Result<T, BError>
    where
        E: Into<Box<dyn ErrorTrait + Send + Sync>>;
}

impl<T, E> OrErr<T, E> for Result<T, E> {
    fn or_err(self, et: ErrorType, context: &'static str) -> Result<T, BError>
    where
        E: Into<Box<dyn ErrorTrait + Send + Sync>>,
    {
        self.map_err(|e| Error::because(et, context, e))
    }

    fn or_err_with<C: Into<Box<str>>, F: FnOnce() -> C>(
        self,
        et: ErrorType,
        context: F,
    ) -> Result<T, BError>
    where
        E: Into<Box<dyn ErrorTrait + Send + Sync>>,
    {
        self.map_err(|e| Error::because(et, context(), e))
    }
}

/// Helper trait to convert an [Option] to an [Error] with context.
pub trait OrFail<T> {
    /// Turn `None` into an [Error] of the given type with context.
    fn or_fail(self, et: ErrorType, context: &'static str) -> Result<T, BError>;
}

impl<T> OrFail<T> for Option<T> {
    fn or_fail(self, et: ErrorType, context: &'static str) -> Result<T, BError> {
        self.ok_or_else(|| Error::explain(et, context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn io_error() -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::Other, "oops")
    }

    #[test]
    fn test_chain_of_errors() {
        let e: Result<()> = Err(io_error()).or_err(ErrorType::InternalError, "while testing");
        let e = e.err_context(|| "outer context");
        let err = e.unwrap_err();
        assert_eq!(err.etype, ErrorType::InternalError);
        let display = format!("{}", err);
        assert!(display.contains("outer context"));
        assert!(display.contains("while testing"));
        assert!(display.contains("oops"));
    }

    #[test]
    fn test_custom_type() {
        const MY_TYPE: ErrorType = ErrorType::new("MyType");
        let err = Error::explain(MY_TYPE, "custom");
        assert_eq!(err.etype.as_str(), "MyType");
    }

    #[test]
    fn test_or_fail() {
        let v: Option<u32> = None;
        let err = v.or_fail(ErrorType::InternalError, "missing").unwrap_err();
        assert_eq!(err.etype, ErrorType::InternalError);
        assert_eq!(err.context.as_deref(), Some("missing"));
    }
}
