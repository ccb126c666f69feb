//! Bounded-concurrency admission gate
//!
//! A [`Gate<T>`] caps how many callers hold a [`Permit<T>`] at once. Callers
//! wait for a permit with [`Gate::forever`] (no time limit) or
//! [`Gate::timeout`] (bounded), and either wait gives up early when its
//! cancellation signal fires.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{select, Either};
use slot_sync::{CancelCause, CancelSignal, SlotPool};
use tracing::{debug, info, trace, warn};

use crate::error::{GateError, Result};
use crate::permit::Permit;

/// Callback invoked with the waiter's cancellation signal
pub type Callback = Arc<dyn Fn(&CancelSignal) + Send + Sync>;

/// Reporting for [`Gate::forever`] waits that run long
///
/// Once a `forever` call has waited `stuck_timeout` without a slot, the
/// stuck callback runs; when that call later obtains a slot or is cancelled,
/// the unstuck callback runs. Both run inline on the waiting task and a
/// panic in either propagates to the caller. A zero `stuck_timeout` turns
/// reporting off.
///
/// ```rust
/// use admission_gate::{ForeverMessaging, Gate};
/// use std::time::Duration;
///
/// let gate = Gate::<()>::new(8);
/// let noisy = gate.with_forever_messaging(
///     ForeverMessaging::new(Duration::from_secs(5))
///         .on_stuck(|_| tracing::warn!("still waiting for a slot"))
///         .on_unstuck(|_| tracing::info!("no longer waiting")),
/// );
/// assert_eq!(noisy.capacity(), gate.capacity());
/// ```
#[derive(Clone)]
pub struct ForeverMessaging {
    stuck_timeout: Duration,
    on_stuck: Option<Callback>,
    on_unstuck: Option<Callback>,
}

impl ForeverMessaging {
    /// Report waits longer than `stuck_timeout`, with no callbacks yet
    #[must_use]
    pub fn new(stuck_timeout: Duration) -> Self {
        Self {
            stuck_timeout,
            on_stuck: None,
            on_unstuck: None,
        }
    }

    /// Run `callback` when a wait passes the stuck timeout
    #[must_use]
    pub fn on_stuck<F>(mut self, callback: F) -> Self
    where
        F: Fn(&CancelSignal) + Send + Sync + 'static,
    {
        self.on_stuck = Some(Arc::new(callback));
        self
    }

    /// Run `callback` when a stuck wait resolves
    #[must_use]
    pub fn on_unstuck<F>(mut self, callback: F) -> Self
    where
        F: Fn(&CancelSignal) + Send + Sync + 'static,
    {
        self.on_unstuck = Some(Arc::new(callback));
        self
    }

    /// How long a `forever` wait may last before it counts as stuck
    #[must_use]
    pub fn stuck_timeout(&self) -> Duration {
        self.stuck_timeout
    }

    fn enabled(&self) -> bool {
        !self.stuck_timeout.is_zero()
    }
}

impl std::fmt::Debug for ForeverMessaging {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForeverMessaging")
            .field("stuck_timeout", &self.stuck_timeout)
            .field("on_stuck", &self.on_stuck.is_some())
            .field("on_unstuck", &self.on_unstuck.is_some())
            .finish()
    }
}

/// How a timed wait ended
enum Outcome {
    Admitted,
    Cancelled(CancelCause),
    Elapsed,
}

/// A capacity-bounded admission gate
///
/// `T` is a tag with no runtime representation: permits from a `Gate<A>`
/// satisfy `Enforced<A>` only, so a limit on one kind of work cannot be
/// passed off as a limit on another. If the gate is never passed around, any
/// tag will do.
///
/// Clones, and views made by [`with_forever_messaging`](Self::with_forever_messaging),
/// share the same slots.
///
/// # Example
///
/// ```rust,no_run
/// use admission_gate::{CancelSignal, Gate};
///
/// struct Uploads;
///
/// # async fn example() {
/// let gate = Gate::<Uploads>::new(4);
///
/// let permit = gate.forever(&CancelSignal::never()).await;
/// // At most 4 callers are here at once
/// permit.release();
/// # }
/// ```
pub struct Gate<T> {
    pool: SlotPool,
    messaging: Option<Arc<ForeverMessaging>>,
    _tag: PhantomData<fn() -> T>,
}

impl<T> Gate<T> {
    /// Create a gate admitting at most `capacity` callers at once
    ///
    /// A capacity of zero admits nobody: `timeout` always fails and `forever`
    /// waits until cancelled.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            pool: SlotPool::new(capacity),
            messaging: None,
            _tag: PhantomData,
        }
    }

    /// A view over the same slots whose [`forever`](Self::forever) reports
    /// long waits through `messaging`
    ///
    /// `self` is left unchanged. [`timeout`](Self::timeout) ignores these
    /// settings.
    #[must_use]
    pub fn with_forever_messaging(&self, messaging: ForeverMessaging) -> Self {
        Self {
            pool: self.pool.clone(),
            messaging: Some(Arc::new(messaging)),
            _tag: PhantomData,
        }
    }

    /// Wait, with no time limit, for a slot
    ///
    /// Returns a permit holding a slot, or a no-op permit if `cancel` fired
    /// first. The two can be told apart with [`Permit::is_admitted`].
    ///
    /// # Panics
    ///
    /// Panics raised by the stuck or unstuck callback are not caught. A slot
    /// already claimed when the unstuck callback panics is returned to the
    /// gate during unwinding.
    pub async fn forever(&self, cancel: &CancelSignal) -> Permit<T> {
        let messaging = match &self.messaging {
            Some(messaging) if messaging.enabled() => messaging,
            _ => return self.settle(self.pool.acquire_or_cancel(cancel).await),
        };

        match self.wait_with_limit(cancel, messaging.stuck_timeout).await {
            Outcome::Admitted => return self.admitted(),
            Outcome::Cancelled(cause) => {
                debug!("Wait for one of {} slots cancelled: {}", self.capacity(), cause);
                return Permit::noop();
            }
            Outcome::Elapsed => {}
        }

        warn!(
            "Stuck for {:?} waiting for one of {} slots",
            messaging.stuck_timeout,
            self.capacity()
        );
        if let Some(on_stuck) = &messaging.on_stuck {
            on_stuck(cancel);
        }

        // Own the slot before the unstuck callback runs so a panic there
        // still returns it on unwind.
        let permit = self.settle(self.pool.acquire_or_cancel(cancel).await);

        info!(
            "Unstuck waiting for one of {} slots (admitted: {})",
            self.capacity(),
            permit.is_admitted()
        );
        if let Some(on_unstuck) = &messaging.on_unstuck {
            on_unstuck(cancel);
        }

        permit
    }

    /// Wait at most `timeout` for a slot
    ///
    /// A zero `timeout` makes a single attempt without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Timeout`] if no slot freed up in time, or
    /// [`GateError::Cancelled`] if `cancel` fired first. A slot that is free
    /// when the call is made is always taken, even if `cancel` has fired.
    pub async fn timeout(&self, cancel: &CancelSignal, timeout: Duration) -> Result<Permit<T>> {
        let outcome = if timeout.is_zero() {
            if self.pool.try_acquire() {
                Outcome::Admitted
            } else if let Some(cause) = cancel.cause() {
                Outcome::Cancelled(cause)
            } else {
                Outcome::Elapsed
            }
        } else {
            self.wait_with_limit(cancel, timeout).await
        };

        match outcome {
            Outcome::Admitted => Ok(self.admitted()),
            Outcome::Cancelled(cause) => {
                debug!("Wait for one of {} slots cancelled: {}", self.capacity(), cause);
                Err(GateError::Cancelled {
                    capacity: self.capacity(),
                    cause,
                })
            }
            Outcome::Elapsed => {
                debug!(
                    "No slot of {} freed within {:?}",
                    self.capacity(),
                    timeout
                );
                Err(GateError::Timeout {
                    timeout,
                    capacity: self.capacity(),
                })
            }
        }
    }

    /// Maximum number of simultaneous permits
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.pool.capacity()
    }

    /// Number of permits currently holding a slot
    ///
    /// For monitoring only; the value may change immediately after reading.
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.pool.in_use()
    }

    /// Number of free slots
    #[must_use]
    pub fn available(&self) -> usize {
        self.pool.available()
    }

    /// Race a slot against `cancel` and a `limit` timer
    ///
    /// A free slot beats a fired signal, and both beat the timer.
    async fn wait_with_limit(&self, cancel: &CancelSignal, limit: Duration) -> Outcome {
        let contenders = select(self.pool.acquire(), cancel.cancelled());
        let timer = Box::pin(compio::time::sleep(limit));

        match select(contenders, timer).await {
            Either::Left((Either::Left(((), _)), _)) => Outcome::Admitted,
            Either::Left((Either::Right((cause, _)), _)) => Outcome::Cancelled(cause),
            Either::Right(((), _)) => Outcome::Elapsed,
        }
    }

    fn settle(&self, acquired: bool) -> Permit<T> {
        if acquired {
            self.admitted()
        } else {
            debug!("Wait for one of {} slots cancelled", self.capacity());
            Permit::noop()
        }
    }

    fn admitted(&self) -> Permit<T> {
        trace!(
            "Admitted ({} of {} slots in use)",
            self.pool.in_use(),
            self.capacity()
        );
        Permit::admitted(self.pool.clone())
    }
}

impl<T> Clone for Gate<T> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            messaging: self.messaging.clone(),
            _tag: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Gate<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gate")
            .field("pool", &self.pool)
            .field("messaging", &self.messaging)
            .finish()
    }
}
