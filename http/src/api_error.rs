//! The small slice of the API's JSON error body this crate needs to surface
//! through [`crate::error::ErrorType::Request`].
//!
//! The full per-field validation-error body and the numeric error code
//! catalogue are model/DTO concerns `spec.md` §1 rules out of scope; only
//! enough is kept here to let [`Error`](crate::error::Error) carry the
//! response's own explanation along with its status code.

use serde::Deserialize;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Discord's generic JSON error body: `{"code": ..., "message": ...}`,
/// optionally with a nested `errors` object the API uses for per-field
/// validation failures.
#[derive(Clone, Debug, Deserialize)]
pub struct ApiError {
    /// Numeric, API-defined error code.
    pub code: u64,
    /// Human-readable description of the error.
    pub message: String,
    /// Per-field validation errors, if any, left unparsed: this crate does
    /// not model individual request bodies.
    #[serde(default)]
    pub errors: Option<serde_json::Value>,
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{} ({})", self.message, self.code)
    }
}
