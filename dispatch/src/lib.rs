#![deny(unsafe_code)]

//! Typed gateway event dispatch.
//!
//! [`EventDispatcher`] maintains a `NAME -> EventType -> listeners` registry
//! and fans a decoded wire frame out to every matching listener under a
//! supervised task group, isolating one listener's failure from its
//! siblings. Registration is generic (`spec.md` §9 "Annotation-driven
//! listener binding"): the event type is a compile-time type parameter on
//! [`EventDispatcher::add_listener`] rather than extracted at runtime from a
//! callback's first-parameter annotation.
//!
//! [`error_handler`] is the `ErrorHandlerMixin` equivalent: a registry of
//! handlers keyed by concrete error type, consulted both for listener
//! failures and for [`Event::from_payload`] construction failures.

pub mod error;
pub mod error_handler;
pub mod event;
pub mod listener;

mod dispatcher;

pub use self::{
    dispatcher::{EventDispatcher, ListenerId},
    error::{Error, ErrorType},
    event::{Cached, Event},
    listener::{Listener, ListenerError},
};
