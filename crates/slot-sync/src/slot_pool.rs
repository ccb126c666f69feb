//! Capacity-bounded slot pool for compio runtime
//!
//! Tracks how many of a fixed number of slots are occupied. Callers claim a
//! slot with [`SlotPool::try_acquire`] or by awaiting [`SlotPool::acquire`] /
//! [`SlotPool::acquire_or_cancel`], and hand it back with
//! [`SlotPool::release`]. The pool itself hands out no guard; ownership of a
//! claimed slot is tracked by whoever wraps the pool.
//!
//! # Example
//!
//! ```rust,no_run
//! use slot_sync::{CancelSignal, SlotPool};
//!
//! # async fn example() {
//! let pool = SlotPool::new(4);
//!
//! if pool.acquire_or_cancel(&CancelSignal::never()).await {
//!     // Do work while holding the slot
//!     pool.release();
//! }
//! # }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::cancel::{CancelSignal, Cancelled};
use crate::waiters::WaiterQueue;

/// A fixed-capacity pool of admission slots
///
/// # Design
///
/// - **Lock-free fast path**: claiming and returning a slot is a single atomic
///   operation on the free-slot counter
/// - **Parked waiters**: tasks that find the pool full park a waker; each
///   release wakes one of them
/// - **No fairness**: a task that arrives while a woken waiter is still being
///   scheduled may take the freed slot first
/// - **Cloneable**: clones share the same slots
#[derive(Clone)]
pub struct SlotPool {
    /// Shared state between all clones of this pool
    inner: Arc<PoolInner>,
}

struct PoolInner {
    /// Free slots (atomic for lock-free operations)
    available: AtomicUsize,
    /// Total slots, fixed at construction
    capacity: usize,
    /// Tasks waiting for a slot
    waiters: WaiterQueue,
}

impl SlotPool {
    /// Create a pool with `capacity` free slots
    ///
    /// A capacity of zero is allowed: every `try_acquire` fails and every
    /// wait lasts until it is abandoned.
    ///
    /// # Example
    ///
    /// ```rust
    /// use slot_sync::SlotPool;
    ///
    /// let pool = SlotPool::new(16);
    /// assert_eq!(pool.available(), 16);
    /// ```
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                available: AtomicUsize::new(capacity),
                capacity,
                waiters: WaiterQueue::new(),
            }),
        }
    }

    /// Claim a slot without waiting
    ///
    /// Returns `true` if a slot was free and is now held by the caller, who
    /// must eventually call [`release`](Self::release).
    ///
    /// # Example
    ///
    /// ```rust
    /// use slot_sync::SlotPool;
    ///
    /// let pool = SlotPool::new(1);
    /// assert!(pool.try_acquire());
    /// assert!(!pool.try_acquire());
    /// ```
    #[must_use]
    pub fn try_acquire(&self) -> bool {
        let mut current = self.inner.available.load(Ordering::Acquire);

        loop {
            if current == 0 {
                return false;
            }

            match self.inner.available.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Wait until a slot can be claimed
    ///
    /// The returned future resolves once the caller holds a slot. Dropping it
    /// before completion claims nothing, so it can be raced against other
    /// events.
    pub fn acquire(&self) -> Acquire<'_> {
        Acquire {
            pool: self,
            key: None,
        }
    }

    /// Wait until a slot can be claimed or `cancel` fires
    ///
    /// Resolves to `true` if a slot is now held by the caller, `false` if the
    /// wait was cancelled first. A slot that is already free wins over a
    /// signal that has already fired.
    pub fn acquire_or_cancel<'a>(&'a self, cancel: &'a CancelSignal) -> AcquireOrCancel<'a> {
        AcquireOrCancel {
            acquire: self.acquire(),
            cancelled: cancel.cancelled(),
        }
    }

    /// Return a slot to the pool, waking one waiter
    ///
    /// Must be paired with exactly one earlier successful acquisition. A
    /// release with no slot held is ignored, so the free count never exceeds
    /// the capacity.
    pub fn release(&self) {
        let capacity = self.inner.capacity;
        let released = self.inner.available.fetch_update(
            Ordering::AcqRel,
            Ordering::Acquire,
            |available| (available < capacity).then_some(available + 1),
        );

        if released.is_ok() {
            self.inner.waiters.wake_one();
        }
    }

    /// Number of free slots
    ///
    /// Useful for monitoring; the value may change immediately after reading.
    #[must_use]
    pub fn available(&self) -> usize {
        self.inner.available.load(Ordering::Acquire)
    }

    /// Total number of slots
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Number of slots currently held (capacity - available)
    ///
    /// # Example
    ///
    /// ```rust
    /// use slot_sync::SlotPool;
    ///
    /// let pool = SlotPool::new(8);
    /// assert!(pool.try_acquire());
    /// assert_eq!(pool.in_use(), 1);
    /// ```
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.inner.capacity.saturating_sub(self.available())
    }
}

impl std::fmt::Debug for SlotPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotPool")
            .field("capacity", &self.capacity())
            .field("available", &self.available())
            .finish()
    }
}

/// Future returned by [`SlotPool::acquire`]
///
/// 1. Try the fast path (atomic decrement if a slot is free)
/// 2. Otherwise park the task's waker and check again, so a release that
///    raced with parking is not missed
/// 3. When woken, retry; if another task took the slot first, park again
#[must_use = "futures do nothing unless polled"]
pub struct Acquire<'a> {
    pool: &'a SlotPool,
    /// Key of our parked waker, if one is queued or was consumed by a wakeup
    key: Option<u64>,
}

impl Acquire<'_> {
    fn finish(&mut self) {
        if let Some(key) = self.key.take() {
            self.pool.inner.waiters.remove(key);
        }
    }
}

impl Future for Acquire<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if this.pool.try_acquire() {
            this.finish();
            return Poll::Ready(());
        }

        this.pool.inner.waiters.register(&mut this.key, cx.waker());

        if this.pool.try_acquire() {
            this.finish();
            return Poll::Ready(());
        }

        Poll::Pending
    }
}

impl Drop for Acquire<'_> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            // A release already woke us but we are leaving without the slot:
            // pass the wakeup on so it is not lost.
            if !self.pool.inner.waiters.remove(key) {
                self.pool.inner.waiters.wake_one();
            }
        }
    }
}

/// Future returned by [`SlotPool::acquire_or_cancel`]
#[must_use = "futures do nothing unless polled"]
pub struct AcquireOrCancel<'a> {
    acquire: Acquire<'a>,
    cancelled: Cancelled<'a>,
}

impl Future for AcquireOrCancel<'_> {
    type Output = bool;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if Pin::new(&mut this.acquire).poll(cx).is_ready() {
            return Poll::Ready(true);
        }
        if Pin::new(&mut this.cancelled).poll(cx).is_ready() {
            return Poll::Ready(false);
        }

        Poll::Pending
    }
}
