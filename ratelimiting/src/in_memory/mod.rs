//! Default in-memory [`Ratelimiter`] implementation.
//!
//! [`InMemoryRatelimiter`] keeps one [`Bucket`] per key in a
//! [`HashMap`](std::collections::HashMap) behind a [`Mutex`], and a single
//! process-wide [`GlobalLockPair`]. Each bucket owns a background
//! [`BucketQueueTask`] that serialises ticket grants and evicts the map
//! entry once its queue drains, which is this crate's substitute for the
//! weak-reference map the originating system leans on its garbage collector
//! for (see `spec.md` §9).

use crate::{
    bucket::{Bucket, BucketQueueTask},
    ticket::TicketReceiver,
    Bucket as BucketInfo, BoxError, BoxFuture, BucketKey, Ratelimiter,
};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::sync::Mutex as AsyncMutex;

#[cfg(feature = "tracing")]
use tracing::debug;

/// Process-wide kill switch tripped by a global 429.
///
/// Pairs an [`AtomicBool`] fast-path check with an [`AsyncMutex`] so a
/// waiter only ever contends on the mutex while a lock is actually in
/// effect; [`Self::wait_until_unlocked`] is lock-free in the common case.
#[derive(Debug, Default)]
pub(crate) struct GlobalLockPair {
    guard: AsyncMutex<()>,
    locked: AtomicBool,
}

impl GlobalLockPair {
    /// Block until no global lock is in effect.
    pub(crate) async fn wait_until_unlocked(&self) {
        if self.locked.load(Ordering::Relaxed) {
            drop(self.guard.lock().await);
        }
    }

    /// Whether a global lock is currently in effect.
    pub(crate) fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    /// Trip the global lock for `duration`, then release it.
    ///
    /// Spawns a task holding the async mutex for the duration so concurrent
    /// callers of [`Self::wait_until_unlocked`] queue behind it rather than
    /// busy-polling the atomic.
    pub(crate) fn lock_for(self: &Arc<Self>, duration: Duration) {
        self.locked.store(true, Ordering::Relaxed);

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let guard = this.guard.lock().await;
            tokio::time::sleep(duration).await;
            this.locked.store(false, Ordering::Relaxed);
            drop(guard);
        });
    }
}

/// An in-memory [`Ratelimiter`] storing one bucket per key.
///
/// This is the default backend: clone it freely, each clone shares the same
/// underlying map and global lock.
#[derive(Clone, Debug, Default)]
pub struct InMemoryRatelimiter {
    buckets: Arc<Mutex<HashMap<BucketKey, Arc<Bucket>>>>,
    global: Arc<GlobalLockPair>,
}

impl InMemoryRatelimiter {
    /// Create a new, empty in-memory ratelimiter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Ratelimiter for InMemoryRatelimiter {
    fn bucket(&self, key: &str) -> BoxFuture<Result<Option<BucketInfo>, BoxError>> {
        let snapshot = self
            .buckets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .map(|bucket| BucketInfo {
                limit: bucket.limit(),
                remaining: bucket.remaining(),
                reset_after: bucket.reset_after(),
                started_at: bucket.started_at(),
            });

        Box::pin(async move { Ok(snapshot) })
    }

    fn globally_locked(&self) -> BoxFuture<Result<bool, BoxError>> {
        let locked = self.global.is_locked();

        Box::pin(async move { Ok(locked) })
    }

    fn has(&self, key: &str) -> BoxFuture<Result<bool, BoxError>> {
        let has = self
            .buckets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(key);

        Box::pin(async move { Ok(has) })
    }

    fn ticket(&self, key: BucketKey) -> BoxFuture<Result<TicketReceiver, BoxError>> {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());

        let receiver = if let Some(bucket) = buckets.get(&key) {
            #[cfg(feature = "tracing")]
            debug!(%key, "queueing onto existing bucket");

            bucket.queue()
        } else {
            #[cfg(feature = "tracing")]
            debug!(%key, "creating new bucket");

            let (bucket, queue) = Bucket::new(key.clone());
            let receiver = bucket.queue();

            tokio::spawn(
                BucketQueueTask::new(
                    Arc::clone(&bucket),
                    Arc::clone(&self.buckets),
                    Arc::clone(&self.global),
                    queue,
                )
                .run(),
            );

            buckets.insert(key, bucket);

            receiver
        };

        drop(buckets);

        Box::pin(async move { Ok(receiver) })
    }
}

#[cfg(test)]
mod tests {
    use super::InMemoryRatelimiter;
    use crate::{
        headers::{Present, RatelimitHeaders},
        Ratelimiter,
    };
    use static_assertions::assert_impl_all;
    use std::{error::Error, fmt::Debug, sync::Arc};

    assert_impl_all!(InMemoryRatelimiter: Clone, Debug, Ratelimiter, Send, Sync);

    #[tokio::test]
    async fn unknown_key_has_no_bucket() -> Result<(), Box<dyn Error>> {
        let ratelimiter = InMemoryRatelimiter::new();

        assert!(!ratelimiter.has("unknown").await?);
        assert!(ratelimiter.bucket("unknown").await?.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn first_ticket_is_granted_immediately() -> Result<(), Box<dyn Error>> {
        let ratelimiter = InMemoryRatelimiter::new();

        let receiver = ratelimiter.ticket("a".to_owned()).await?;
        let sender = tokio::time::timeout(std::time::Duration::from_millis(50), receiver)
            .await
            .expect("ticket granted promptly")?;

        sender.headers(None).unwrap();

        assert!(ratelimiter.has("a").await?);

        Ok(())
    }

    /// A bucket reporting `remaining: 0` after every grant, carrying a fixed
    /// reset window, as a real endpoint that stays at its limit would.
    fn exhausted(reset_after_ms: u64) -> RatelimitHeaders {
        RatelimitHeaders::Present(Present {
            bucket: None,
            limit: 1,
            remaining: 0,
            reset_after: reset_after_ms,
            reset: 0,
            scope: None,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn queued_tickets_are_granted_in_fifo_order() -> Result<(), Box<dyn Error>> {
        let ratelimiter = InMemoryRatelimiter::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let sender_a = ratelimiter.ticket("k".to_owned()).await?.await?;

        // Queue B and C behind A before A's grant is even acknowledged, so
        // both are waiting on the same bucket's single queue task.
        let receiver_b = ratelimiter.ticket("k".to_owned()).await?;
        let receiver_c = ratelimiter.ticket("k".to_owned()).await?;

        let order_b = Arc::clone(&order);
        let task_b = tokio::spawn(async move {
            let sender = receiver_b.await.expect("b is granted a ticket");
            order_b.lock().unwrap_or_else(|e| e.into_inner()).push('b');
            sender.headers(Some(exhausted(100))).unwrap();
        });

        let order_c = Arc::clone(&order);
        let task_c = tokio::spawn(async move {
            let sender = receiver_c.await.expect("c is granted a ticket");
            order_c.lock().unwrap_or_else(|e| e.into_inner()).push('c');
            sender.headers(None).unwrap();
        });

        // Let B and C start polling their receivers before A reports back.
        tokio::task::yield_now().await;

        sender_a.headers(Some(exhausted(100))).unwrap();

        task_b.await?;
        task_c.await?;

        assert_eq!(
            *order.lock().unwrap_or_else(|e| e.into_inner()),
            vec!['b', 'c']
        );

        Ok(())
    }
}
