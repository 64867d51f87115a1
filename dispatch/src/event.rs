//! Events: a stable wire name plus payload construction (`spec.md` §4.5).

use serde_json::Value;
use std::any::Any;

/// Type-erased handle to whatever cache layer an embedding crate wires in.
///
/// The cache is a collaborator concern (`spec.md` §1) this crate does not
/// implement; [`Event::from_payload`] is handed a type-erased reference so a
/// real event can consult a cache without this crate depending on any
/// concrete cache type.
pub type Cached<'a> = &'a dyn Any;

/// An error produced while constructing an event from its wire payload.
pub type ConstructError = Box<dyn std::error::Error + Send + Sync>;

/// A typed gateway event.
///
/// Implementors declare the stable wire `t` value they're constructed from
/// and build themselves from the decoded `d` payload. Returning `Ok(None)`
/// means "nothing meaningful here, skip listeners" (`spec.md` §4.5); `Err`
/// means construction itself failed and is routed through the dispatcher's
/// error handlers instead (`spec.md` §4.6 step 4, §7).
pub trait Event: Clone + Send + Sync + 'static {
    /// The wire `t` value this event is constructed from.
    const NAME: &'static str;

    /// Build `Self` from the decoded payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload can't be interpreted as this event.
    fn from_payload(payload: &Value, cached: Cached<'_>) -> Result<Option<Self>, ConstructError>
    where
        Self: Sized;
}

/// Stable wire `t` values this crate provides feature parity for
/// (`spec.md` §6 "Event inventory"). Payload schemas for these are a
/// model/DTO concern out of scope per `spec.md` §1; an embedding crate
/// implements [`Event`] for its own payload types using these names.
#[rustfmt::skip]
pub mod names {
    macro_rules! names {
        ($($name:ident),+ $(,)?) => {
            $(
                #[doc = concat!("`", stringify!($name), "`")]
                pub const $name: &str = stringify!($name);
            )+
        };
    }

    names! {
        TYPING_START,
        CHANNEL_PINS_UPDATE,
        GUILD_DELETE,
        GUILD_BAN_ADD,
        GUILD_BAN_REMOVE,
        GUILD_EMOJIS_UPDATE,
        GUILD_STICKERS_UPDATE,
        GUILD_MEMBER_ADD,
        GUILD_MEMBER_REMOVE,
        GUILD_MEMBER_UPDATE,
        GUILD_ROLE_CREATE,
        GUILD_ROLE_UPDATE,
        GUILD_ROLE_DELETE,
        MESSAGE_CREATE,
        MESSAGE_UPDATE,
        MESSAGE_DELETE,
        MESSAGE_DELETE_BULK,
        MESSAGE_REACTION_ADD,
        MESSAGE_REACTION_REMOVE,
        MESSAGE_REACTION_REMOVE_ALL,
        MESSAGE_REACTION_REMOVE_EMOJI,
        HELLO,
        RESUMED,
        READY,
        THREAD_CREATE,
        THREAD_UPDATE,
        THREAD_DELETE,
        THREAD_LIST_SYNC,
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn names_match_wire_strings() {
        assert_eq!(super::names::MESSAGE_CREATE, "MESSAGE_CREATE");
        assert_eq!(super::names::THREAD_LIST_SYNC, "THREAD_LIST_SYNC");
    }
}
