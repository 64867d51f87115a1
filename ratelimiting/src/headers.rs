//! Parse typed rate-limit headers from a response.
//!
//! Parsing response headers is necessary for the [`Ratelimiter`] to properly
//! function.
//!
//! [`Ratelimiter`]: super::Ratelimiter

use std::{
    error::Error,
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    str::{self, FromStr, Utf8Error},
};

/// Iterator of header name-value pairs failed to be parsed.
#[derive(Debug)]
pub struct HeaderParsingError {
    /// Detailed reason why the headers failed to be parsed.
    pub(super) kind: HeaderParsingErrorType,
    /// Original error leading up to this one.
    pub(super) source: Option<Box<dyn Error + Send + Sync>>,
}

impl HeaderParsingError {
    /// Immutable reference to the type of error that occurred.
    #[must_use]
    pub const fn kind(&self) -> &HeaderParsingErrorType {
        &self.kind
    }

    /// Consume the error, returning the source error if there is any.
    #[must_use]
    pub fn into_source(self) -> Option<Box<dyn Error + Send + Sync>> {
        self.source
    }

    /// Consume the error, returning the owned error type and the source error.
    #[must_use]
    pub fn into_parts(self) -> (HeaderParsingErrorType, Option<Box<dyn Error + Send + Sync>>) {
        (self.kind, self.source)
    }

    /// Create a new error because a header is missing in the response.
    pub(super) fn missing(name: HeaderName) -> Self {
        Self {
            kind: HeaderParsingErrorType::Missing { name },
            source: None,
        }
    }

    /// Create a new error because a header is not valid UTF-8.
    pub(super) fn not_utf8(name: HeaderName, value: Vec<u8>, source: Utf8Error) -> Self {
        Self {
            kind: HeaderParsingErrorType::NotUtf8 { name, value },
            source: Some(Box::new(source)),
        }
    }
}

impl Display for HeaderParsingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match &self.kind {
            HeaderParsingErrorType::Missing { name } => {
                f.write_str("at least one header, '")?;
                f.write_str(name.name())?;

                f.write_str("', is missing")
            }
            HeaderParsingErrorType::NotUtf8 { name, value } => {
                f.write_str("header '")?;
                f.write_str(name.name())?;
                f.write_str("' contains invalid UTF-8: ")?;

                Debug::fmt(value, f)
            }
            HeaderParsingErrorType::Parsing { kind, name, value } => {
                f.write_str("header '")?;
                f.write_str(name.name())?;
                f.write_str("' can not be parsed as a ")?;
                f.write_str(kind.name())?;
                f.write_str(": '")?;
                f.write_str(value)?;

                f.write_str("'")
            }
        }
    }
}

impl Error for HeaderParsingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| &**source as &(dyn Error + 'static))
    }
}

/// Type of [`HeaderParsingError`] that occurred.
#[derive(Debug)]
#[non_exhaustive]
pub enum HeaderParsingErrorType {
    /// Expected header is missing.
    Missing {
        /// Name of the header that should be present in the list.
        name: HeaderName,
    },
    /// Header value is not UTF-8 valid.
    NotUtf8 {
        /// Name of the header.
        name: HeaderName,
        /// Value of the header.
        value: Vec<u8>,
    },
    /// Header value is not of the expected type.
    Parsing {
        /// Type of header value expected.
        kind: HeaderType,
        /// Name of the header.
        name: HeaderName,
        /// Value of the header.
        value: String,
    },
}

/// Typed name of a rate-limit header.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum HeaderName {
    /// Opaque identity of the ratelimit bucket.
    Bucket,
    /// Whether the ratelimit is a global one.
    Global,
    /// Maximum requests allotted in the bucket.
    Limit,
    /// Remaining requests allotted.
    Remaining,
    /// How long until the bucket resets.
    ResetAfter,
    /// When the bucket resets.
    Reset,
    /// How long until a request can be retried.
    RetryAfter,
    /// Scope of a ratelimit.
    Scope,
}

impl HeaderName {
    /// Lowercased name for the bucket header.
    pub const BUCKET: &'static str = "x-ratelimit-bucket";
    /// Lowercased name for the global header.
    pub const GLOBAL: &'static str = "x-ratelimit-global";
    /// Lowercased name for the limit header.
    pub const LIMIT: &'static str = "x-ratelimit-limit";
    /// Lowercased name for the remaining header.
    pub const REMAINING: &'static str = "x-ratelimit-remaining";
    /// Lowercased name for the reset-after header.
    pub const RESET_AFTER: &'static str = "x-ratelimit-reset-after";
    /// Lowercased name for the reset header.
    pub const RESET: &'static str = "x-ratelimit-reset";
    /// Lowercased name for the retry-after header.
    // It's correct for this not to have the `x-ratelimit-` prefix.
    pub const RETRY_AFTER: &'static str = "retry-after";
    /// Lowercased name for the scope header.
    pub const SCOPE: &'static str = "x-ratelimit-scope";

    /// Lowercased name of the header.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bucket => Self::BUCKET,
            Self::Global => Self::GLOBAL,
            Self::Limit => Self::LIMIT,
            Self::Remaining => Self::REMAINING,
            Self::ResetAfter => Self::RESET_AFTER,
            Self::Reset => Self::RESET,
            Self::RetryAfter => Self::RETRY_AFTER,
            Self::Scope => Self::SCOPE,
        }
    }
}

impl Display for HeaderName {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.name())
    }
}

/// Expected type of a header value.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum HeaderType {
    /// Type of header value is a bool.
    Bool,
    /// Type of header value is a float.
    Float,
    /// Type of header value is an integer.
    Integer,
    /// Type of header value is a string.
    String,
}

impl HeaderType {
    /// Name of the type of header.
    const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Float => "float",
            Self::Integer => "integer",
            Self::String => "string",
        }
    }
}

impl Display for HeaderType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.name())
    }
}

/// Scope of a ratelimit when one occurs.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum RatelimitScope {
    /// Ratelimit affects the application as a whole.
    Global,
    /// Ratelimit is shared across all applications touching the resource and
    /// does not affect this application's own buckets or global limit.
    Shared,
    /// Ratelimit is scoped to an individual bucket.
    User,
}

impl Display for RatelimitScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(match self {
            Self::Global => "global",
            Self::Shared => "shared",
            Self::User => "user",
        })
    }
}

impl FromStr for RatelimitScope {
    type Err = HeaderParsingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "global" => Self::Global,
            "shared" => Self::Shared,
            "user" => Self::User,
            _ => {
                return Err(HeaderParsingError {
                    kind: HeaderParsingErrorType::Parsing {
                        kind: HeaderType::String,
                        name: HeaderName::Scope,
                        value: s.to_owned(),
                    },
                    source: None,
                })
            }
        })
    }
}

impl TryFrom<&'_ str> for RatelimitScope {
    type Error = HeaderParsingError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::from_str(value)
    }
}

/// Ratelimit that applies to every bucket at once.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct GlobalLimited {
    /// Number of seconds before retrying.
    retry_after: u64,
    /// Scope of the ratelimit.
    scope: Option<RatelimitScope>,
}

impl GlobalLimited {
    /// Number of seconds before retrying.
    #[must_use]
    pub const fn retry_after(&self) -> u64 {
        self.retry_after
    }

    /// Scope of the ratelimit. Should always be [`RatelimitScope::Global`].
    #[must_use]
    pub const fn scope(&self) -> Option<RatelimitScope> {
        self.scope
    }
}

/// Information about a single bucket's ratelimit.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Present {
    /// Opaque bucket identity, if disclosed.
    pub(crate) bucket: Option<String>,
    /// Total tickets allocated to the bucket.
    pub(crate) limit: u64,
    /// Remaining tickets.
    pub(crate) remaining: u64,
    /// Seconds until the bucket resets.
    pub(crate) reset_after: u64,
    /// Unix timestamp in milliseconds when the bucket resets.
    pub(crate) reset: u64,
    /// Scope of the ratelimit, when one occurred.
    pub(crate) scope: Option<RatelimitScope>,
}

impl Present {
    /// Opaque bucket identity, if disclosed.
    #[must_use]
    pub fn bucket(&self) -> Option<&str> {
        self.bucket.as_deref()
    }

    /// Consumes the headers, returning the owned bucket identity.
    #[must_use]
    pub fn into_bucket(self) -> Option<String> {
        self.bucket
    }

    /// Total tickets allocated to the bucket.
    #[must_use]
    pub const fn limit(&self) -> u64 {
        self.limit
    }

    /// Remaining tickets.
    #[must_use]
    pub const fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Seconds until the bucket resets.
    #[must_use]
    pub const fn reset_after(&self) -> u64 {
        self.reset_after
    }

    /// Unix timestamp in milliseconds when the bucket resets.
    #[must_use]
    pub const fn reset(&self) -> u64 {
        self.reset
    }

    /// Scope of the ratelimit, when one occurred.
    #[must_use]
    pub const fn scope(&self) -> Option<RatelimitScope> {
        self.scope
    }
}

/// Parsed rate-limit headers.
///
/// A response either discloses a global ratelimit, a bucketed ratelimit, or
/// no ratelimit information at all.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum RatelimitHeaders {
    /// Ratelimit applies to every bucket.
    GlobalLimited(GlobalLimited),
    /// No ratelimit headers present.
    None,
    /// Information about a single bucket's ratelimit.
    Present(Present),
}

impl RatelimitHeaders {
    /// Whether these are global ratelimit headers.
    #[must_use]
    pub const fn is_global(&self) -> bool {
        matches!(self, Self::GlobalLimited(_))
    }

    /// Whether there are no ratelimit headers.
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Whether these are present, non-global bucket headers.
    #[must_use]
    pub const fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    /// Parse headers from an iterator of lowercased name/value pairs.
    ///
    /// Header names must be lowercase UTF-8; values may or may not be UTF-8
    /// and are validated as needed while parsing.
    ///
    /// # Errors
    ///
    /// Returns an error if a required header is missing, or a header's value
    /// cannot be parsed as its expected type.
    pub fn from_pairs<'a>(
        headers: impl Iterator<Item = (&'a str, &'a [u8])>,
    ) -> Result<Self, HeaderParsingError> {
        let mut bucket = None;
        let mut global = false;
        let mut limit = None;
        let mut remaining = None;
        let mut reset = None;
        let mut reset_after = None;
        let mut retry_after = None;
        let mut scope = None;

        for (name, value) in headers {
            match name {
                HeaderName::BUCKET => {
                    bucket.replace(header_str(HeaderName::Bucket, value)?.to_owned());
                }
                HeaderName::GLOBAL => {
                    global = header_bool(HeaderName::Global, value)?;
                }
                HeaderName::LIMIT => {
                    limit.replace(header_int(HeaderName::Limit, value)?);
                }
                HeaderName::REMAINING => {
                    remaining.replace(header_int(HeaderName::Remaining, value)?);
                }
                HeaderName::RESET => {
                    let reset_value = header_float(HeaderName::Reset, value)?;

                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    reset.replace((reset_value * 1000.).ceil() as u64);
                }
                HeaderName::RESET_AFTER => {
                    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
                    let reset_after_value =
                        (header_float(HeaderName::ResetAfter, value)? * 1000.).ceil() as u64;

                    reset_after.replace(reset_after_value);
                }
                HeaderName::RETRY_AFTER => {
                    retry_after.replace(header_int(HeaderName::RetryAfter, value)?);
                }
                HeaderName::SCOPE => {
                    let scope_value = header_str(HeaderName::Scope, value)?;
                    scope.replace(RatelimitScope::try_from(scope_value)?);
                }
                _ => continue,
            }
        }

        if global {
            let retry_after =
                retry_after.ok_or_else(|| HeaderParsingError::missing(HeaderName::RetryAfter))?;

            return Ok(Self::GlobalLimited(GlobalLimited { retry_after, scope }));
        }

        // No ratelimit values set at all: the route isn't rate-limited.
        if bucket.is_none()
            && limit.is_none()
            && remaining.is_none()
            && reset.is_none()
            && reset_after.is_none()
        {
            return Ok(Self::None);
        }

        Ok(Self::Present(Present {
            bucket,
            limit: limit.ok_or_else(|| HeaderParsingError::missing(HeaderName::Limit))?,
            remaining: remaining
                .ok_or_else(|| HeaderParsingError::missing(HeaderName::Remaining))?,
            reset: reset.ok_or_else(|| HeaderParsingError::missing(HeaderName::Reset))?,
            reset_after: reset_after
                .ok_or_else(|| HeaderParsingError::missing(HeaderName::ResetAfter))?,
            scope,
        }))
    }
}

/// Parse a value as a boolean.
fn header_bool(name: HeaderName, value: &[u8]) -> Result<bool, HeaderParsingError> {
    let text = header_str(name, value)?;

    text.parse().map_err(|source| HeaderParsingError {
        kind: HeaderParsingErrorType::Parsing {
            kind: HeaderType::Bool,
            name,
            value: text.to_owned(),
        },
        source: Some(Box::new(source)),
    })
}

/// Parse a value expected to be a float.
fn header_float(name: HeaderName, value: &[u8]) -> Result<f64, HeaderParsingError> {
    let text = header_str(name, value)?;

    text.parse().map_err(|source| HeaderParsingError {
        kind: HeaderParsingErrorType::Parsing {
            kind: HeaderType::Float,
            name,
            value: text.to_owned(),
        },
        source: Some(Box::new(source)),
    })
}

/// Parse a value expected to be an integer.
fn header_int(name: HeaderName, value: &[u8]) -> Result<u64, HeaderParsingError> {
    let text = header_str(name, value)?;

    text.parse().map_err(|source| HeaderParsingError {
        kind: HeaderParsingErrorType::Parsing {
            kind: HeaderType::Integer,
            name,
            value: text.to_owned(),
        },
        source: Some(Box::new(source)),
    })
}

/// Parse a value expected to be a UTF-8 valid string.
fn header_str(name: HeaderName, value: &[u8]) -> Result<&str, HeaderParsingError> {
    str::from_utf8(value)
        .map_err(|source| HeaderParsingError::not_utf8(name, value.to_owned(), source))
}

#[cfg(test)]
mod tests {
    use super::{
        GlobalLimited, HeaderName, HeaderParsingError, HeaderParsingErrorType, HeaderType, Present,
        RatelimitHeaders, RatelimitScope,
    };
    use http::header::{HeaderMap, HeaderName as HttpHeaderName, HeaderValue};
    use static_assertions::{assert_fields, assert_impl_all};
    use std::{
        error::Error,
        fmt::{Debug, Display},
    };

    assert_fields!(HeaderParsingErrorType::Missing: name);
    assert_fields!(HeaderParsingErrorType::NotUtf8: name, value);
    assert_fields!(HeaderParsingErrorType::Parsing: kind, name, value);
    assert_impl_all!(HeaderName: Clone, Copy, Debug, Display, Eq, PartialEq, Send, Sync);
    assert_impl_all!(HeaderParsingErrorType: Debug, Send, Sync);
    assert_impl_all!(HeaderParsingError: Error, Send, Sync);
    assert_impl_all!(HeaderType: Clone, Copy, Debug, Display, Eq, PartialEq, Send, Sync);
    assert_impl_all!(GlobalLimited: Clone, Debug, Eq, PartialEq, Send, Sync);
    assert_impl_all!(Present: Clone, Debug, Eq, PartialEq, Send, Sync);
    assert_impl_all!(RatelimitHeaders: Clone, Debug, Send, Sync);

    fn pairs(map: &HeaderMap) -> impl Iterator<Item = (&str, &[u8])> {
        map.iter().map(|(k, v)| (k.as_str(), v.as_bytes()))
    }

    #[test]
    fn global() -> Result<(), Box<dyn Error>> {
        let mut map = HeaderMap::new();
        map.insert(
            HttpHeaderName::from_static("x-ratelimit-global"),
            HeaderValue::from_static("true"),
        );
        map.insert(
            HttpHeaderName::from_static("retry-after"),
            HeaderValue::from_static("65"),
        );

        let headers = RatelimitHeaders::from_pairs(pairs(&map))?;
        assert!(matches!(headers, RatelimitHeaders::GlobalLimited(g) if g.retry_after() == 65));

        Ok(())
    }

    #[test]
    fn global_with_scope() -> Result<(), Box<dyn Error>> {
        let mut map = HeaderMap::new();
        map.insert(
            HttpHeaderName::from_static("x-ratelimit-global"),
            HeaderValue::from_static("true"),
        );
        map.insert(
            HttpHeaderName::from_static("retry-after"),
            HeaderValue::from_static("65"),
        );
        map.insert(
            HttpHeaderName::from_static("x-ratelimit-scope"),
            HeaderValue::from_static("global"),
        );

        let headers = RatelimitHeaders::from_pairs(pairs(&map))?;
        assert!(matches!(
            headers,
            RatelimitHeaders::GlobalLimited(ref g) if g.retry_after() == 65
        ));
        assert!(matches!(
            headers,
            RatelimitHeaders::GlobalLimited(g) if g.scope() == Some(RatelimitScope::Global)
        ));

        Ok(())
    }

    #[test]
    fn present() -> Result<(), Box<dyn Error>> {
        let mut map = HeaderMap::new();
        map.insert(
            HttpHeaderName::from_static("x-ratelimit-limit"),
            HeaderValue::from_static("10"),
        );
        map.insert(
            HttpHeaderName::from_static("x-ratelimit-remaining"),
            HeaderValue::from_static("9"),
        );
        map.insert(
            HttpHeaderName::from_static("x-ratelimit-reset"),
            HeaderValue::from_static("1470173023.123"),
        );
        map.insert(
            HttpHeaderName::from_static("x-ratelimit-reset-after"),
            HeaderValue::from_static("64.57"),
        );
        map.insert(
            HttpHeaderName::from_static("x-ratelimit-bucket"),
            HeaderValue::from_static("abcd1234"),
        );
        map.insert(
            HttpHeaderName::from_static("x-ratelimit-scope"),
            HeaderValue::from_static("shared"),
        );

        let headers = RatelimitHeaders::from_pairs(pairs(&map))?;
        let RatelimitHeaders::Present(present) = headers else {
            panic!("expected present headers");
        };
        assert_eq!(present.bucket(), Some("abcd1234"));
        assert_eq!(present.limit(), 10);
        assert_eq!(present.remaining(), 9);
        assert_eq!(present.reset_after(), 64_570);
        assert_eq!(present.reset(), 1_470_173_023_123);
        assert_eq!(present.scope(), Some(RatelimitScope::Shared));

        Ok(())
    }

    #[test]
    fn none_when_nothing_present() -> Result<(), Box<dyn Error>> {
        let map = HeaderMap::new();
        let headers = RatelimitHeaders::from_pairs(pairs(&map))?;
        assert!(headers.is_none());

        Ok(())
    }

    #[test]
    fn names() {
        assert_eq!("x-ratelimit-bucket", HeaderName::BUCKET);
        assert_eq!("x-ratelimit-global", HeaderName::GLOBAL);
        assert_eq!("x-ratelimit-limit", HeaderName::LIMIT);
        assert_eq!("x-ratelimit-remaining", HeaderName::REMAINING);
        assert_eq!("x-ratelimit-reset-after", HeaderName::RESET_AFTER);
        assert_eq!("x-ratelimit-reset", HeaderName::RESET);
        assert_eq!("retry-after", HeaderName::RETRY_AFTER);
        assert_eq!("x-ratelimit-scope", HeaderName::SCOPE);
    }

    #[test]
    fn types() {
        assert_eq!("bool", HeaderType::Bool.name());
        assert_eq!("float", HeaderType::Float.name());
        assert_eq!("integer", HeaderType::Integer.name());
        assert_eq!("string", HeaderType::String.name());
    }
}
