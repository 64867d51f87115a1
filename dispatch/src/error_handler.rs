//! Error-handler registry (`spec.md` §4.7 "ErrorHandlerMixin").
//!
//! The source sorts handlers by `isinstance` specificity so the most
//! derived matching exception type runs first. A nominal, non-hierarchical
//! error model has no inheritance to sort by, so "most specific match"
//! collapses to "exact type match": handlers are registered against a
//! concrete `E: Error` type and [`ErrorHandlerRegistry::handle`] runs the
//! first one whose type matches, exactly as the source's first-match
//! semantics describe once there is no hierarchy left to disambiguate.

use std::{
    any::TypeId,
    error::Error as StdError,
    future::Future,
    pin::Pin,
    sync::{Arc, RwLock},
};

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Any boxed, thread-safe standard error.
pub type DynError = dyn StdError + Send + Sync + 'static;

/// A registered handler for concrete error type `E`.
///
/// Implementations must not retain `error` past the call: the returned
/// future is `'static`, so anything needed from `error` must be cloned out
/// before it's used inside the future.
pub trait ErrorHandler<E>: Send + Sync + 'static
where
    E: StdError + Send + Sync + 'static,
{
    /// Handle the error, returning whether it was considered handled.
    fn handle(&self, error: &E) -> BoxFuture<bool>;
}

impl<E, F, Fut> ErrorHandler<E> for F
where
    E: StdError + Send + Sync + 'static,
    F: Fn(&E) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    fn handle(&self, error: &E) -> BoxFuture<bool> {
        Box::pin(self(error))
    }
}

trait ErasedErrorHandler: Send + Sync {
    fn try_handle(&self, error: &DynError) -> Option<BoxFuture<bool>>;
}

struct TypedErrorHandler<E, H> {
    handler: H,
    _marker: std::marker::PhantomData<fn(&E)>,
}

impl<E, H> ErasedErrorHandler for TypedErrorHandler<E, H>
where
    E: StdError + Send + Sync + 'static,
    H: ErrorHandler<E>,
{
    fn try_handle(&self, error: &DynError) -> Option<BoxFuture<bool>> {
        let error = error.downcast_ref::<E>()?;

        Some(self.handler.handle(error))
    }
}

/// Registry of error handlers, consulted by [`crate::EventDispatcher`] for
/// both listener failures and event-construction failures.
pub struct ErrorHandlerRegistry {
    handlers: RwLock<Vec<(TypeId, Box<dyn ErasedErrorHandler>)>>,
    fallback: RwLock<Option<Arc<dyn Fn(&DynError) -> BoxFuture<()> + Send + Sync>>>,
}

impl Default for ErrorHandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorHandlerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
            fallback: RwLock::new(None),
        }
    }

    /// Register a handler for concrete error type `E`. The first handler
    /// registered for a given type is the one consulted; later
    /// registrations for the same type are never reached.
    pub fn register<E, H>(&self, handler: H)
    where
        E: StdError + Send + Sync + 'static,
        H: ErrorHandler<E>,
    {
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((
                TypeId::of::<E>(),
                Box::new(TypedErrorHandler {
                    handler,
                    _marker: std::marker::PhantomData,
                }),
            ));
    }

    /// Register the fallback invoked when no typed handler matches.
    pub fn register_fallback<F, Fut>(&self, fallback: F)
    where
        F: Fn(&DynError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let fallback: Arc<dyn Fn(&DynError) -> BoxFuture<()> + Send + Sync> =
            Arc::new(move |error| Box::pin(fallback(error)) as BoxFuture<()>);

        *self.fallback.write().unwrap_or_else(|e| e.into_inner()) = Some(fallback);
    }

    /// Run the first matching handler for `error`, else the fallback if one
    /// is registered, else swallow it (`spec.md` §4.7, §7).
    pub(crate) async fn handle(&self, error: &DynError) {
        let matched = {
            let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());

            handlers.iter().find_map(|(_, handler)| handler.try_handle(error))
        };

        if let Some(future) = matched {
            let _handled = future.await;

            return;
        }

        let fallback = self
            .fallback
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        if let Some(fallback) = fallback {
            fallback(error).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ErrorHandlerRegistry;
    use static_assertions::assert_impl_all;
    use std::{
        fmt::{self, Display, Formatter},
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };

    assert_impl_all!(ErrorHandlerRegistry: Send, Sync);

    #[derive(Debug)]
    struct FirstError;

    impl Display for FirstError {
        fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
            f.write_str("first")
        }
    }

    impl std::error::Error for FirstError {}

    #[derive(Debug)]
    struct SecondError;

    impl Display for SecondError {
        fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
            f.write_str("second")
        }
    }

    impl std::error::Error for SecondError {}

    #[tokio::test]
    async fn runs_the_handler_matching_the_concrete_type() {
        let registry = ErrorHandlerRegistry::new();
        let seen_first = Arc::new(AtomicUsize::new(0));
        let seen_second = Arc::new(AtomicUsize::new(0));

        {
            let seen_first = Arc::clone(&seen_first);
            registry.register::<FirstError, _>(move |_: &FirstError| {
                let seen_first = Arc::clone(&seen_first);
                async move {
                    seen_first.fetch_add(1, Ordering::SeqCst);
                    true
                }
            });
        }
        {
            let seen_second = Arc::clone(&seen_second);
            registry.register::<SecondError, _>(move |_: &SecondError| {
                let seen_second = Arc::clone(&seen_second);
                async move {
                    seen_second.fetch_add(1, Ordering::SeqCst);
                    true
                }
            });
        }

        registry.handle(&SecondError).await;

        assert_eq!(seen_first.load(Ordering::SeqCst), 0);
        assert_eq!(seen_second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn falls_back_when_nothing_matches() {
        let registry = ErrorHandlerRegistry::new();
        let seen = Arc::new(AtomicUsize::new(0));

        {
            let seen = Arc::clone(&seen);
            registry.register_fallback(move |_| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                }
            });
        }

        registry.handle(&FirstError).await;

        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn swallows_silently_with_no_handler_and_no_fallback() {
        let registry = ErrorHandlerRegistry::new();

        registry.handle(&FirstError).await;
    }
}
