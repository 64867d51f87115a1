//! The error taxonomy for dispatch-wiring failures (`spec.md` §7).

use std::{
    error::Error as StdError,
    fmt::{Display, Formatter, Result as FmtResult},
    result::Result as StdResult,
};

/// Result alias defaulting to this crate's [`Error`].
pub type Result<T, E = Error> = StdResult<T, E>;

type BoxError = Box<dyn StdError + Send + Sync>;

/// An error from dispatch wiring: event construction, or a collaborator
/// concern this crate only reserves a taxonomy slot for.
#[derive(Debug)]
pub struct Error {
    source: Option<BoxError>,
    kind: ErrorType,
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
            ErrorType::EventConstruction { name } => {
                write!(f, "failed to construct event '{name}' from its payload")
            }
            ErrorType::Command => f.write_str("command dispatch or registration failed"),
            ErrorType::Extension => f.write_str("extension load or unload failed"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| &**source as &(dyn StdError + 'static))
    }
}

/// Type of [`Error`] that occurred.
#[derive(Debug)]
#[non_exhaustive]
pub enum ErrorType {
    /// [`crate::Event::from_payload`] returned an error for the named wire
    /// event (`spec.md` §4.6 step 4, §7 "`from_payload` construction
    /// failures").
    EventConstruction {
        /// The wire event name being constructed when it failed.
        name: &'static str,
    },
    /// A command/dispatch wiring problem (collaborator placeholder).
    Command,
    /// An extension load/unload problem (collaborator placeholder).
    Extension,
}
