//! [`EventDispatcher`]: fan-out dispatch over a task-supervised listener
//! registry (`spec.md` §4.6).

use crate::{
    error::{Error, ErrorType},
    error_handler::ErrorHandlerRegistry,
    event::{Cached, Event},
    listener::{Listener, ListenerError},
};
use serde_json::Value;
use std::{
    any::{Any, TypeId},
    collections::HashMap,
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, RwLock,
    },
};
use tokio::task::JoinSet;

#[cfg(feature = "tracing")]
use tracing::warn;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

type Constructor = Arc<
    dyn for<'a> Fn(&'a Value, Cached<'a>) -> Result<Option<Box<dyn Any + Send + Sync>>, Error>
        + Send
        + Sync,
>;

/// Identity of a registered listener, returned by
/// [`EventDispatcher::add_listener`] for later removal.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ListenerId(u64);

fn next_listener_id() -> ListenerId {
    static NEXT: AtomicU64 = AtomicU64::new(0);

    ListenerId(NEXT.fetch_add(1, Ordering::Relaxed))
}

trait ErasedListener: Send + Sync {
    fn call(&self, event: &(dyn Any + Send + Sync)) -> BoxFuture<Result<(), ListenerError>>;
}

struct TypedListener<E, L> {
    listener: L,
    _marker: std::marker::PhantomData<fn(E)>,
}

impl<E, L> ErasedListener for TypedListener<E, L>
where
    E: Event,
    L: Listener<E>,
{
    fn call(&self, event: &(dyn Any + Send + Sync)) -> BoxFuture<Result<(), ListenerError>> {
        match event.downcast_ref::<E>() {
            Some(event) => self.listener.call(event.clone()),
            None => Box::pin(async { Ok(()) }),
        }
    }
}

struct Bucket {
    construct: Constructor,
    listeners: Vec<(ListenerId, Arc<dyn ErasedListener>)>,
}

/// Fan-out dispatcher: maps wire event names to typed listener buckets and
/// invokes them under a supervised task group (`spec.md` §4.6).
///
/// Cheaply [`Clone`]: clones share the same listener registry and error
/// handlers.
#[derive(Clone)]
pub struct EventDispatcher {
    listeners: Arc<RwLock<HashMap<&'static str, HashMap<TypeId, Bucket>>>>,
    error_handlers: Arc<ErrorHandlerRegistry>,
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatcher {
    /// Create an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(RwLock::new(HashMap::new())),
            error_handlers: Arc::new(ErrorHandlerRegistry::new()),
        }
    }

    /// Register `listener` for every `E` constructed from wire event
    /// `E::NAME`.
    ///
    /// The event type is a compile-time type parameter rather than a
    /// runtime-inspected annotation (`spec.md` §9 "Annotation-driven
    /// listener binding"), so mis-registration is a compile error instead of
    /// the source's runtime `TypeError`. Multiple `Event` implementations
    /// may share one `NAME`; each keeps its own listener list (`spec.md`
    /// §4.6 "Multiple subtypes").
    pub fn add_listener<E, L>(&self, listener: L) -> ListenerId
    where
        E: Event,
        L: Listener<E>,
    {
        let id = next_listener_id();
        let erased: Arc<dyn ErasedListener> = Arc::new(TypedListener::<E, L> {
            listener,
            _marker: std::marker::PhantomData,
        });

        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());

        let bucket = listeners
            .entry(E::NAME)
            .or_default()
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Bucket {
                construct: Arc::new(|payload, cached| {
                    E::from_payload(payload, cached)
                        .map(|event| {
                            event.map(|event| Box::new(event) as Box<dyn Any + Send + Sync>)
                        })
                        .map_err(|source| {
                            Error::with_source(ErrorType::EventConstruction { name: E::NAME }, source)
                        })
                }),
                listeners: Vec::new(),
            });

        bucket.listeners.push((id, erased));

        id
    }

    /// Remove a listener by its id, across every event name and type.
    pub fn remove_listener(&self, id: ListenerId) {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());

        prune(&mut listeners, |bucket| {
            bucket.listeners.retain(|(listener_id, _)| *listener_id != id);
        });
    }

    /// Remove a listener by id, constrained to wire event `name`.
    pub fn remove_listener_named(&self, name: &str, id: ListenerId) {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());

        if let Some(by_type) = listeners.get_mut(name) {
            for bucket in by_type.values_mut() {
                bucket.listeners.retain(|(listener_id, _)| *listener_id != id);
            }
        }

        listeners.retain(|_, by_type| {
            by_type.retain(|_, bucket| !bucket.listeners.is_empty());

            !by_type.is_empty()
        });
    }

    /// Remove a listener by id, constrained to event type `E`.
    pub fn remove_listener_typed<E: Event>(&self, id: ListenerId) {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());

        if let Some(by_type) = listeners.get_mut(E::NAME) {
            if let Some(bucket) = by_type.get_mut(&TypeId::of::<E>()) {
                bucket.listeners.retain(|(listener_id, _)| *listener_id != id);
            }
        }

        listeners.retain(|_, by_type| {
            by_type.retain(|_, bucket| !bucket.listeners.is_empty());

            !by_type.is_empty()
        });
    }

    /// Whether any listener is registered for wire event `name`.
    #[must_use]
    pub fn has_handlers(&self, name: &str) -> bool {
        self.listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .map_or(false, |by_type| !by_type.is_empty())
    }

    /// Register an error handler for concrete error type `E` (`spec.md`
    /// §4.7).
    pub fn register_error_handler<E, H>(&self, handler: H)
    where
        E: std::error::Error + Send + Sync + 'static,
        H: crate::error_handler::ErrorHandler<E>,
    {
        self.error_handlers.register(handler);
    }

    /// Register the fallback invoked when no typed error handler matches.
    pub fn register_fallback_handler<F, Fut>(&self, fallback: F)
    where
        F: Fn(&crate::error_handler::DynError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.error_handlers.register_fallback(fallback);
    }

    /// Dispatch a decoded `{t: name, d: payload}` gateway frame (`spec.md`
    /// §4.6).
    ///
    /// If nothing is registered for `name`, cooperatively yields once and
    /// returns (step 2: callers that need to know whether anything would
    /// run should check [`EventDispatcher::has_handlers`] first).
    pub async fn dispatch(&self, name: &str, payload: &Value, cached: Cached<'_>) {
        let snapshot: Vec<(Constructor, Vec<(ListenerId, Arc<dyn ErasedListener>)>)> = {
            let listeners = self.listeners.read().unwrap_or_else(|e| e.into_inner());

            match listeners.get(name) {
                Some(by_type) => by_type
                    .values()
                    .map(|bucket| (Arc::clone(&bucket.construct), bucket.listeners.clone()))
                    .collect(),
                None => Vec::new(),
            }
        };

        if snapshot.is_empty() {
            tokio::task::yield_now().await;

            return;
        }

        let mut join_set = JoinSet::new();

        for (construct, listeners) in snapshot {
            let event = match construct(payload, cached) {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(error) => {
                    self.error_handlers.handle(&error).await;

                    continue;
                }
            };

            let event: Arc<dyn Any + Send + Sync> = Arc::from(event);

            for (_, listener) in listeners {
                let event = Arc::clone(&event);
                let error_handlers = Arc::clone(&self.error_handlers);

                join_set.spawn(async move {
                    if let Err(error) = listener.call(&*event).await {
                        error_handlers.handle(&*error).await;
                    }
                });
            }
        }

        while let Some(result) = join_set.join_next().await {
            if let Err(_join_error) = result {
                #[cfg(feature = "tracing")]
                warn!(error = %_join_error, "listener task panicked");
            }
        }
    }
}

fn prune(
    listeners: &mut HashMap<&'static str, HashMap<TypeId, Bucket>>,
    mut f: impl FnMut(&mut Bucket),
) {
    listeners.retain(|_, by_type| {
        for bucket in by_type.values_mut() {
            f(bucket);
        }

        by_type.retain(|_, bucket| !bucket.listeners.is_empty());

        !by_type.is_empty()
    });
}
