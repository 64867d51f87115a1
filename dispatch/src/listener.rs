//! Listener registration (`spec.md` §4.6).

use crate::event::Event;
use std::{future::Future, pin::Pin};

pub(crate) type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// An error a listener's callback surfaced while handling an event.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// A registered callback for event `E`.
///
/// Blanket-implemented for any `Fn(E) -> impl Future<Output = Result<(),
/// ListenerError>> + Send + 'static` closure, so
/// [`crate::EventDispatcher::add_listener`] accepts a plain async closure
/// the way the source's `@dispatcher.listener` decorator accepts a plain
/// async function.
pub trait Listener<E: Event>: Send + Sync + 'static {
    /// Invoke the listener with an owned event.
    fn call(&self, event: E) -> BoxFuture<Result<(), ListenerError>>;
}

impl<E, F, Fut> Listener<E> for F
where
    E: Event,
    F: Fn(E) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ListenerError>> + Send + 'static,
{
    fn call(&self, event: E) -> BoxFuture<Result<(), ListenerError>> {
        Box::pin(self(event))
    }
}
