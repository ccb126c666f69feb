//! Keyed queue of parked task wakers
//!
//! Used by [`SlotPool`](crate::SlotPool) to park tasks waiting for a slot. Each
//! pending future owns at most one key; re-polling refreshes the stored waker
//! in place instead of queueing a duplicate, and a dropped future removes its
//! own entry so the queue never fills up with dead wakers.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::task::Waker;

/// Queue of wakers, each tagged with the key of the future that parked it
pub(crate) struct WaiterQueue {
    inner: Mutex<Waiters>,
}

struct Waiters {
    next_key: u64,
    queue: VecDeque<(u64, Waker)>,
}

impl WaiterQueue {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Waiters {
                next_key: 0,
                queue: VecDeque::new(),
            }),
        }
    }

    /// Park `waker` under `key`, allocating a fresh key if the previous one was
    /// already consumed by a wakeup
    pub(crate) fn register(&self, key: &mut Option<u64>, waker: &Waker) {
        let mut waiters = self.lock();

        if let Some(current) = *key {
            if let Some((_, stored)) = waiters.queue.iter_mut().find(|(k, _)| *k == current) {
                if !stored.will_wake(waker) {
                    stored.clone_from(waker);
                }
                return;
            }
        }

        let fresh = waiters.next_key;
        waiters.next_key = waiters.next_key.wrapping_add(1);
        waiters.queue.push_back((fresh, waker.clone()));
        *key = Some(fresh);
    }

    /// Remove the entry for `key`
    ///
    /// Returns `false` if the entry was no longer queued, meaning a wakeup
    /// already popped it.
    pub(crate) fn remove(&self, key: u64) -> bool {
        let mut waiters = self.lock();
        match waiters.queue.iter().position(|(k, _)| *k == key) {
            Some(index) => {
                waiters.queue.remove(index);
                true
            }
            None => false,
        }
    }

    /// Wake the oldest parked waiter, if any
    pub(crate) fn wake_one(&self) {
        // Wake outside the lock: a waker may poll inline.
        let popped = self.lock().queue.pop_front();
        if let Some((_, waker)) = popped {
            waker.wake();
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.lock().queue.len()
    }

    fn lock(&self) -> MutexGuard<'_, Waiters> {
        // The queue holds no invariants a panicking holder could break.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
