//! Ratelimiting primitives for a bucketed HTTP API.
//!
//! The remote enforces two layers of rate limits: a per-bucket token bucket
//! (see [`Bucket`]) and a global kill-switch that, once tripped, pauses every
//! bucket until it is released. This crate models both and ships a default
//! in-memory implementation, [`InMemoryRatelimiter`], behind the
//! [`Ratelimiter`] trait so alternative backends can be swapped in without
//! touching the HTTP layer that consumes them.
//!
//! Acquiring permission to send a request is a four-step handshake described
//! in [`ticket`]: request a [`ticket::TicketReceiver`], await it for a
//! [`ticket::TicketSender`], perform the request, then report the response's
//! parsed [`RatelimitHeaders`] back through the sender.

#![deny(unsafe_code)]

pub mod headers;
pub mod in_memory;
pub mod ticket;

mod bucket;

pub use self::headers::RatelimitHeaders;
pub use self::in_memory::InMemoryRatelimiter;

use self::ticket::{TicketReceiver, TicketSender};
use futures_util::FutureExt;
use std::{
    error::Error as StdError,
    fmt::Debug,
    future::Future,
    pin::Pin,
    time::{Duration, Instant},
};

/// Key a bucket is stored under: either `endpoint + major_params` before the
/// server's bucket identity is known, or `bucket_id + major_params` once a
/// response has disclosed it. Ownership of key composition belongs to the
/// caller (the HTTP layer knows about endpoints and major parameters; this
/// crate only knows about opaque strings).
pub type BucketKey = String;

type BoxError = Box<dyn StdError + Send + Sync>;
type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Snapshot of a bucket's state at the time it was read.
///
/// This is a read-only view; callers cannot mutate a bucket directly, only
/// through the ticket handshake.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Bucket {
    limit: u64,
    remaining: u64,
    reset_after: Duration,
    started_at: Option<Instant>,
}

impl Bucket {
    /// Total number of tickets allotted in a cycle.
    #[must_use]
    pub const fn limit(&self) -> u64 {
        self.limit
    }

    /// Number of tickets remaining in the current cycle.
    #[must_use]
    pub const fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Duration after [`started_at`](Self::started_at) the bucket resets.
    #[must_use]
    pub const fn reset_after(&self) -> Duration {
        self.reset_after
    }

    /// When the bucket's reset countdown started, if it has.
    #[must_use]
    pub const fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    /// How long until the bucket resets.
    ///
    /// Returns `None` if the countdown hasn't started or has already
    /// elapsed.
    #[must_use]
    pub fn time_remaining(&self) -> Option<Duration> {
        let started_at = self.started_at?;
        let now = Instant::now();
        let reset_at = started_at + self.reset_after;

        if now >= reset_at {
            return None;
        }

        Some(reset_at.duration_since(now))
    }
}

/// A source of rate-limit tickets.
///
/// Implementations own the mapping from [`BucketKey`] to bucket state and the
/// process-wide global lock. The default implementation is
/// [`InMemoryRatelimiter`].
pub trait Ratelimiter: Debug + Send + Sync {
    /// Read-only snapshot of the bucket stored under `key`, if any.
    fn bucket(&self, key: &str) -> BoxFuture<Result<Option<Bucket>, BoxError>>;

    /// Whether the ratelimiter is currently globally locked.
    fn globally_locked(&self) -> BoxFuture<Result<bool, BoxError>>;

    /// Whether a bucket is stored under `key`.
    fn has(&self, key: &str) -> BoxFuture<Result<bool, BoxError>>;

    /// Request a ticket for the bucket stored under `key`, creating it with
    /// default limits if it doesn't exist yet.
    ///
    /// The returned future resolves once a ticket has been granted, in FIFO
    /// order relative to every other ticket requested for the same key.
    fn ticket(&self, key: BucketKey) -> BoxFuture<Result<TicketReceiver, BoxError>>;

    /// Request a ticket for `key` and await its grant in one call.
    ///
    /// Equivalent to calling [`Ratelimiter::ticket`] and then awaiting the
    /// returned [`TicketReceiver`]; provided so callers that don't need to
    /// observe the two steps separately don't have to.
    fn wait_for_ticket(&self, key: BucketKey) -> BoxFuture<Result<TicketSender, BoxError>> {
        Box::pin(self.ticket(key).then(|maybe_receiver| async move {
            match maybe_receiver {
                Ok(receiver) => receiver.await.map_err(|source| Box::new(source) as BoxError),
                Err(error) => Err(error),
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::Ratelimiter;
    use crate::InMemoryRatelimiter;

    #[tokio::test]
    async fn wait_for_ticket_grants_promptly_for_a_fresh_key() {
        let ratelimiter = InMemoryRatelimiter::new();

        let sender = ratelimiter
            .wait_for_ticket("a".to_owned())
            .await
            .expect("ticket request succeeds");

        sender.headers(None).unwrap();
    }
}
