//! Cooperative cancellation with a cause
//!
//! A [`CancelSource`] fires a signal once; every [`CancelSignal`] cloned from
//! it observes the same outcome. Waiters check the signal only where they
//! suspend, so cancellation never interrupts work already in progress.
//!
//! ```rust,no_run
//! use slot_sync::{CancelCause, CancelSource};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let source = CancelSource::with_timeout(Duration::from_secs(2));
//! let signal = source.signal();
//!
//! let cause = signal.cancelled().await;
//! assert!(matches!(cause, CancelCause::DeadlineExceeded));
//! # }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Why a signal fired
#[derive(Error, Debug, Clone)]
pub enum CancelCause {
    /// Fired explicitly through [`CancelSource::cancel`]
    #[error("operation cancelled")]
    Cancelled,

    /// The source's deadline passed
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Fired with a caller-supplied error
    #[error(transparent)]
    Other(Arc<dyn std::error::Error + Send + Sync>),
}

struct CancelState {
    /// Set exactly once, before `token` is cancelled; the first cause wins
    cause: OnceLock<CancelCause>,
    deadline: Option<Instant>,
    token: CancellationToken,
}

impl CancelState {
    fn new(deadline: Option<Instant>) -> Self {
        Self {
            cause: OnceLock::new(),
            deadline,
            token: CancellationToken::new(),
        }
    }

    fn fire(&self, cause: CancelCause) -> bool {
        if self.cause.set(cause).is_ok() {
            self.token.cancel();
            true
        } else {
            false
        }
    }

    fn cause(&self) -> Option<CancelCause> {
        if let Some(cause) = self.cause.get() {
            return Some(cause.clone());
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                self.fire(CancelCause::DeadlineExceeded);
                self.cause.get().cloned()
            }
            _ => None,
        }
    }
}

/// Owning side of a cancellation signal
#[derive(Clone)]
pub struct CancelSource {
    state: Arc<CancelState>,
}

impl CancelSource {
    /// A source that fires only when told to
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(CancelState::new(None)),
        }
    }

    /// A source that also fires with [`CancelCause::DeadlineExceeded`] once
    /// `timeout` has passed
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// A source that also fires with [`CancelCause::DeadlineExceeded`] at
    /// `deadline`
    #[must_use]
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            state: Arc::new(CancelState::new(Some(deadline))),
        }
    }

    /// Fire with [`CancelCause::Cancelled`]
    pub fn cancel(&self) {
        self.state.fire(CancelCause::Cancelled);
    }

    /// Fire with the given cause
    ///
    /// Returns `false` if the signal had already fired, in which case the
    /// earlier cause is kept.
    pub fn cancel_with(&self, cause: CancelCause) -> bool {
        self.state.fire(cause)
    }

    /// Observing side of this source
    #[must_use]
    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            state: Some(Arc::clone(&self.state)),
        }
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelSource")
            .field("cause", &self.state.cause.get())
            .field("deadline", &self.state.deadline)
            .finish()
    }
}

/// Observing side of a cancellation signal
///
/// The default value never fires.
#[derive(Clone, Default)]
pub struct CancelSignal {
    state: Option<Arc<CancelState>>,
}

impl CancelSignal {
    /// A signal that never fires
    #[must_use]
    pub fn never() -> Self {
        Self { state: None }
    }

    /// Whether the signal has fired
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        match self.state.as_deref() {
            Some(state) => state.token.is_cancelled() || state.cause().is_some(),
            None => false,
        }
    }

    /// The cause, if the signal has fired
    #[must_use]
    pub fn cause(&self) -> Option<CancelCause> {
        self.state.as_deref().and_then(CancelState::cause)
    }

    /// Wait until the signal fires, resolving to its cause
    ///
    /// For a signal that never fires the future stays pending forever.
    pub fn cancelled(&self) -> Cancelled<'_> {
        Cancelled {
            state: self.state.as_deref(),
            wait: None,
            timer: None,
        }
    }
}

impl std::fmt::Debug for CancelSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.state {
            Some(state) => f
                .debug_struct("CancelSignal")
                .field("cause", &state.cause.get())
                .field("deadline", &state.deadline)
                .finish(),
            None => f.write_str("CancelSignal(never)"),
        }
    }
}

/// Future returned by [`CancelSignal::cancelled`]
#[must_use = "futures do nothing unless polled"]
pub struct Cancelled<'a> {
    state: Option<&'a CancelState>,
    /// Token wait, started on first poll
    wait: Option<Pin<Box<WaitForCancellationFuture<'a>>>>,
    /// Deadline timer, started on first poll
    timer: Option<Pin<Box<dyn Future<Output = ()>>>>,
}

impl Future for Cancelled<'_> {
    type Output = CancelCause;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let Some(state) = this.state else {
            return Poll::Pending;
        };

        if let Some(cause) = state.cause() {
            return Poll::Ready(cause);
        }

        let wait = this
            .wait
            .get_or_insert_with(|| Box::pin(state.token.cancelled()));
        if wait.as_mut().poll(cx).is_ready() {
            if let Some(cause) = state.cause() {
                return Poll::Ready(cause);
            }
        }

        if let Some(deadline) = state.deadline {
            let timer = this.timer.get_or_insert_with(|| {
                Box::pin(compio::time::sleep(
                    deadline.saturating_duration_since(Instant::now()),
                ))
            });
            if timer.as_mut().poll(cx).is_ready() {
                state.fire(CancelCause::DeadlineExceeded);
                if let Some(cause) = state.cause() {
                    return Poll::Ready(cause);
                }
            }
        }

        Poll::Pending
    }
}
