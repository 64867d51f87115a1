//! Per-bucket token bucket and its background queue task.

use crate::{
    headers::RatelimitHeaders,
    ticket::{self, TicketNotifier, TicketReceiver},
    BucketKey,
};
use std::{
    sync::{
        atomic::{AtomicI64, AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

#[cfg(feature = "tracing")]
use tracing::{debug, warn};

/// Fallback limit assumed for a bucket until a response discloses the real
/// one via its headers.
const DEFAULT_LIMIT: u64 = 1;

/// Shared, mutable state behind a bucket. `BucketQueueTask` is the only task
/// that writes to it; `InMemoryRatelimiter::bucket`/`has` only read.
#[derive(Debug)]
pub(crate) struct Bucket {
    pub(crate) key: BucketKey,
    limit: AtomicU64,
    remaining: AtomicU64,
    /// Milliseconds until the bucket resets, as of the last header update,
    /// or -1 if the reset countdown isn't known yet.
    reset_after: AtomicI64,
    /// When the currently-known `reset_after` countdown was read off the
    /// wire. Used only to answer [`crate::Bucket::time_remaining`]; the
    /// queue task itself always sleeps the freshly-read duration directly.
    anchor: Mutex<Option<Instant>>,
    queue: UnboundedSender<TicketNotifier>,
}

impl Bucket {
    pub(crate) fn new(key: BucketKey) -> (Arc<Self>, UnboundedReceiver<TicketNotifier>) {
        let (tx, rx) = mpsc::unbounded_channel();

        let bucket = Self {
            key,
            limit: AtomicU64::new(DEFAULT_LIMIT),
            remaining: AtomicU64::new(DEFAULT_LIMIT),
            reset_after: AtomicI64::new(-1),
            anchor: Mutex::new(None),
            queue: tx,
        };

        (Arc::new(bucket), rx)
    }

    pub(crate) fn limit(&self) -> u64 {
        self.limit.load(Ordering::Relaxed)
    }

    pub(crate) fn remaining(&self) -> u64 {
        self.remaining.load(Ordering::Relaxed)
    }

    pub(crate) fn reset_after(&self) -> Duration {
        let millis = self.reset_after.load(Ordering::Relaxed).max(0) as u64;

        Duration::from_millis(millis)
    }

    pub(crate) fn is_known(&self) -> bool {
        self.reset_after.load(Ordering::Relaxed) >= 0
    }

    /// When the currently-known reset countdown was last read off the wire.
    pub(crate) fn started_at(&self) -> Option<Instant> {
        *self.anchor.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a ticket request, returning a receiver the caller awaits.
    pub(crate) fn queue(&self) -> TicketReceiver {
        let (tx, rx) = ticket::channel();

        // An error here means the `BucketQueueTask` has already exited,
        // which only happens once its queue has drained; the caller's
        // subsequent poll of `rx` will simply never resolve, mirroring what
        // happens if the bucket were evicted a moment earlier.
        let _sent = self.queue.send(tx);

        rx
    }

    /// Merge a response's ratelimit headers into this bucket's known limits.
    ///
    /// `remaining` uses min semantics (never increases from headers alone,
    /// only from the reset happening); `limit` preserves the used-count when
    /// it changes so a mid-cycle limit bump doesn't grant free tickets.
    fn update(&self, bucket: &crate::headers::Present) {
        let old_limit = self.limit.swap(bucket.limit(), Ordering::Relaxed);

        if old_limit != bucket.limit() {
            let used = old_limit.saturating_sub(self.remaining.load(Ordering::Relaxed));
            let new_remaining = bucket.limit().saturating_sub(used);
            self.remaining.store(new_remaining, Ordering::Relaxed);
        } else {
            self.remaining
                .fetch_min(bucket.remaining(), Ordering::Relaxed);
        }

        #[allow(clippy::cast_possible_wrap)]
        self.reset_after
            .store(bucket.reset_after() as i64, Ordering::Relaxed);
        *self.anchor.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
    }

    /// Treat the current cycle as over: refill to the bucket's limit and
    /// forget the reset countdown until the next header update discloses a
    /// new one.
    ///
    /// Called once the queue task has slept out a known `reset_after`
    /// window with no response having updated the bucket in the meantime.
    fn reset_window(&self) {
        let limit = self.limit.load(Ordering::Relaxed);
        self.remaining.store(limit, Ordering::Relaxed);
        self.reset_after.store(-1, Ordering::Relaxed);
        *self.anchor.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

/// Background task owning a single bucket's ticket queue.
///
/// Pops one [`TicketNotifier`] at a time, waits out the global lock and this
/// bucket's own reset countdown, grants the ticket, then awaits the
/// consumer's response headers before moving to the next one in line. This
/// is what gives FIFO ordering among concurrent acquirers of the same
/// bucket: only one ticket is ever in flight per bucket.
///
/// Exits once the queue is empty and no sender clone remains, at which point
/// it removes its own entry from the shared bucket map — an explicit
/// eviction standing in for the reference-counted weak-map the originating
/// system relies on its garbage collector for.
pub(crate) struct BucketQueueTask {
    bucket: Arc<Bucket>,
    buckets: Arc<Mutex<std::collections::HashMap<BucketKey, Arc<Bucket>>>>,
    global: Arc<super::in_memory::GlobalLockPair>,
    queue: UnboundedReceiver<TicketNotifier>,
}

impl BucketQueueTask {
    pub(crate) fn new(
        bucket: Arc<Bucket>,
        buckets: Arc<Mutex<std::collections::HashMap<BucketKey, Arc<Bucket>>>>,
        global: Arc<super::in_memory::GlobalLockPair>,
        queue: UnboundedReceiver<TicketNotifier>,
    ) -> Self {
        Self {
            bucket,
            buckets,
            global,
            queue,
        }
    }

    pub(crate) async fn run(mut self) {
        #[cfg(feature = "tracing")]
        debug!(key = %self.bucket.key, "starting bucket queue");

        while let Some(notifier) = self.queue.recv().await {
            self.wait_if_needed().await;

            let Some(headers_fut) = notifier.available() else {
                // Consumer canceled before we granted the ticket; move on.
                continue;
            };

            self.remaining_decrement();

            match headers_fut.await {
                Ok(Some(RatelimitHeaders::Present(present))) => {
                    self.bucket.update(&present);
                }
                Ok(Some(RatelimitHeaders::GlobalLimited(limited))) => {
                    self.global.lock_for(Duration::from_secs(limited.retry_after()));
                }
                Ok(Some(RatelimitHeaders::None) | None) => {}
                Err(_recv_error) => {
                    #[cfg(feature = "tracing")]
                    warn!(key = %self.bucket.key, "consumer dropped ticket sender");
                }
            }
        }

        #[cfg(feature = "tracing")]
        debug!(key = %self.bucket.key, "bucket queue drained, evicting");

        self.evict();
    }

    async fn wait_if_needed(&self) {
        self.global.wait_until_unlocked().await;

        if self.bucket.remaining() == 0 {
            if let Some(remaining) = self.time_remaining() {
                tokio::time::sleep(remaining).await;
            }

            // Either the known window just elapsed, or no window was known
            // at all — unreachable in practice since a bucket starts with
            // remaining == 1, but reset regardless to self-heal either way.
            self.bucket.reset_window();
        }
    }

    fn time_remaining(&self) -> Option<Duration> {
        if !self.bucket.is_known() {
            return None;
        }

        Some(self.bucket.reset_after())
    }

    fn remaining_decrement(&self) {
        let _ = self
            .bucket
            .remaining
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |remaining| {
                Some(remaining.saturating_sub(1))
            });
    }

    fn evict(&self) {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());

        // Only remove if nobody re-inserted a fresh queue sender for this
        // key in the interim (a ticket request arriving after `recv`
        // returned `None` but before this lock is acquired).
        if let Some(existing) = buckets.get(&self.bucket.key) {
            if Arc::ptr_eq(existing, &self.bucket) {
                buckets.remove(&self.bucket.key);
            }
        }
    }
}
