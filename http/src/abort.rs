//! Abort-if-ratelimited mode (`spec.md` §4.3 "Abort semantics", §4.8,
//! Glossary).
//!
//! Wrapping a call in [`abort_if_ratelimited`] turns a would-be rate-limit
//! wait into a non-exceptional scope exit: instead of sleeping out a 429 or
//! a bucket's reset countdown, the enclosing call returns with
//! [`Abort::aborted`] set to `true` and no value.
//!
//! The ambient flag is carried with [`tokio::task_local!`], which gives a
//! scoped enter/exit pair that restores the previous value on exit: nesting
//! an inner `abort_if_ratelimited` inside an outer one is legal and each
//! scope's exit restores exactly what was ambient before it.

use crate::error::{Error, ErrorType, Result};
use std::future::Future;

tokio::task_local! {
    static ABORT_IF_RATELIMITED: bool;
}

/// Outcome of a call made inside [`abort_if_ratelimited`].
#[derive(Debug)]
pub struct Abort<T> {
    aborted: bool,
    value: Option<T>,
}

impl<T> Abort<T> {
    /// Whether the wrapped call aborted instead of waiting out a ratelimit.
    #[must_use]
    pub const fn aborted(&self) -> bool {
        self.aborted
    }

    /// The wrapped call's return value, if it completed instead of
    /// aborting.
    #[must_use]
    pub fn into_value(self) -> Option<T> {
        self.value
    }
}

/// Whether the current task is inside an [`abort_if_ratelimited`] scope.
///
/// Checked by the requester's retry loop and, best-effort, before queuing a
/// ratelimiter ticket that is already known to require a wait.
pub(crate) fn is_active() -> bool {
    ABORT_IF_RATELIMITED
        .try_with(|active| *active)
        .unwrap_or(false)
}

/// An error kind that `abort_if_ratelimited` swallows, per `spec.md` §4.8:
/// a 408 or 429 raised by the wrapped call exits the scope normally with
/// `aborted = true` instead of propagating.
fn is_abortable(error: &Error) -> bool {
    match error.kind() {
        ErrorType::RateLimited { .. } => true,
        ErrorType::Request { status, .. } => status.as_u16() == 408,
        _ => false,
    }
}

/// Run `fut` with the abort-if-ratelimited flag set for its duration.
///
/// If `fut` completes normally, returns its value with `aborted = false`.
/// If it fails with a 408 or 429 ([`is_abortable`]), the error is swallowed
/// and `aborted = true` is returned instead. Any other error propagates.
pub async fn abort_if_ratelimited<F, T>(fut: F) -> Result<Abort<T>>
where
    F: Future<Output = Result<T>>,
{
    match ABORT_IF_RATELIMITED.scope(true, fut).await {
        Ok(value) => Ok(Abort {
            aborted: false,
            value: Some(value),
        }),
        Err(error) if is_abortable(&error) => Ok(Abort {
            aborted: true,
            value: None,
        }),
        Err(error) => Err(error),
    }
}

#[cfg(test)]
mod tests {
    use super::{abort_if_ratelimited, is_active};
    use crate::error::{Error, ErrorType};

    #[tokio::test]
    async fn not_active_outside_scope() {
        assert!(!is_active());
    }

    #[tokio::test]
    async fn active_inside_scope() {
        let outcome = abort_if_ratelimited(async {
            assert!(is_active());
            Ok(())
        })
        .await
        .unwrap();

        assert!(!outcome.aborted());
    }

    #[tokio::test]
    async fn swallows_ratelimited_error() {
        let outcome = abort_if_ratelimited(async {
            Err::<(), _>(Error::new(ErrorType::RateLimited {
                global: false,
                retry_after: 30.0,
            }))
        })
        .await
        .unwrap();

        assert!(outcome.aborted());
        assert!(outcome.into_value().is_none());
    }

    #[tokio::test]
    async fn propagates_other_errors() {
        let result = abort_if_ratelimited(async {
            Err::<(), _>(Error::new(ErrorType::NotFound))
        })
        .await;

        assert!(matches!(result.unwrap_err().kind(), ErrorType::NotFound));
    }

    #[tokio::test]
    async fn flag_is_not_active_after_scope_exits() {
        let _ = abort_if_ratelimited(async { Ok::<_, Error>(()) }).await;

        assert!(!is_active());
    }
}
