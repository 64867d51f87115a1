//! The error taxonomy for requests (`spec.md` §7).

use crate::api_error::ApiError;
use hyper::StatusCode;
use std::{
    error::Error as StdError,
    fmt::{Display, Formatter, Result as FmtResult},
    result::Result as StdResult,
};

/// Result alias defaulting to this crate's [`Error`].
pub type Result<T, E = Error> = StdResult<T, E>;

type BoxError = Box<dyn StdError + Send + Sync>;

/// An error from a request, or from building one.
#[derive(Debug)]
pub struct Error {
    pub(crate) source: Option<BoxError>,
    pub(crate) kind: ErrorType,
}

impl Error {
    /// Immutable reference to the type of error that occurred.
    #[must_use]
    pub const fn kind(&self) -> &ErrorType {
        &self.kind
    }

    /// Consume the error, returning the source error if there is any.
    #[must_use]
    pub fn into_source(self) -> Option<BoxError> {
        self.source
    }

    /// Consume the error, returning the owned error type and the source
    /// error.
    #[must_use]
    pub fn into_parts(self) -> (ErrorType, Option<BoxError>) {
        (self.kind, self.source)
    }

    pub(crate) fn new(kind: ErrorType) -> Self {
        Self { kind, source: None }
    }

    pub(crate) fn with_source(kind: ErrorType, source: impl Into<BoxError>) -> Self {
        Self {
            kind,
            source: Some(source.into()),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match &self.kind {
            ErrorType::BuildingRequest => f.write_str("failed to build the request"),
            ErrorType::ChunkingResponse => f.write_str("chunking the response body failed"),
            ErrorType::Json => f.write_str("value could not be serialized as JSON"),
            ErrorType::Parsing => f.write_str("response body could not be deserialized"),
            ErrorType::RequestCanceled => {
                f.write_str("request was canceled, likely by a dropped ratelimiter ticket")
            }
            ErrorType::RequestTimedOut => f.write_str("request timed out"),
            ErrorType::RetriesExhausted { attempts } => {
                write!(f, "request failed after {attempts} attempts")
            }
            ErrorType::Request { status, .. } => {
                write!(f, "request failed, unclassified status {status}")
            }
            ErrorType::Forbidden => f.write_str("request was forbidden (403)"),
            ErrorType::NotFound => f.write_str("resource was not found (404)"),
            ErrorType::Unauthorized => {
                f.write_str("the configured token was rejected (401) and is remembered as invalid")
            }
            ErrorType::RateLimited { global, .. } => {
                write!(f, "ratelimited (global = {global})")
            }
            ErrorType::ServerError { status } => {
                write!(f, "the api returned a server error ({status})")
            }
            ErrorType::ServiceUnavailable => {
                f.write_str("the api is temporarily unavailable (503)")
            }
            ErrorType::ConnectionClosed => f.write_str("gateway connection was closed"),
            ErrorType::Command => f.write_str("command dispatch or registration failed"),
            ErrorType::Extension => f.write_str("extension load or unload failed"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.as_ref().map(|source| &**source as &(dyn StdError + 'static))
    }
}

/// Type of [`Error`] that occurred.
///
/// Mirrors `spec.md` §7's closed taxonomy: a generic base
/// (`BuildingRequest`/`Json`/etc. stand in for `HTTPException`), the
/// `Request` variants specialising `RequestException`, and single
/// placeholder variants for `ConnectionClosed`, `CommandException` and
/// `ExtensionFailure` — collaborator concerns this crate doesn't implement
/// but whose error surface must still exist for a complete taxonomy.
#[derive(Debug)]
#[non_exhaustive]
pub enum ErrorType {
    /// Failed to construct the outgoing HTTP request.
    BuildingRequest,
    /// Failed to read the response body.
    ChunkingResponse,
    /// Failed to serialize a request body as JSON.
    Json,
    /// Failed to deserialize a response body.
    Parsing,
    /// The ratelimiter ticket was canceled before a response arrived.
    RequestCanceled,
    /// The request did not complete within the configured timeout.
    RequestTimedOut,
    /// The retry ceiling (`spec.md` §4.3, 3 attempts) was exhausted.
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u8,
    },
    /// An unclassified 4xx/5xx response (the taxonomy's "other" bucket).
    Request {
        /// Response status code.
        status: StatusCode,
        /// Discord's structured error body, if the response had one.
        error: Option<ApiError>,
    },
    /// 403 Forbidden.
    Forbidden,
    /// 404 Not Found.
    NotFound,
    /// 401 Unauthorized was seen once and is now remembered: the client
    /// refuses further requests without sending them, to avoid hammering the
    /// API with a token that is known to be invalid (`SPEC_FULL.md` §10.3,
    /// [`crate::ClientBuilder::remember_invalid_token`]).
    Unauthorized,
    /// 429 Too Many Requests.
    RateLimited {
        /// Whether the ratelimit was global (applies to every bucket).
        global: bool,
        /// Seconds the caller should wait before retrying.
        retry_after: f64,
    },
    /// 500/502/504: transient, retried internally with backoff.
    ServerError {
        /// Response status code.
        status: StatusCode,
    },
    /// 503: fatal to this call, never retried.
    ServiceUnavailable,
    /// The gateway transport terminated (collaborator placeholder).
    ConnectionClosed,
    /// A command/dispatch wiring problem (collaborator placeholder).
    Command,
    /// An extension load/unload problem (collaborator placeholder).
    Extension,
}

impl ErrorType {
    /// Whether this error kind should be retried internally by the
    /// requester's retry loop (`spec.md` §4.4 status table).
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::ServerError { .. })
    }
}
