//! Error handling and types

use std::time::Duration;

use slot_sync::CancelCause;
use thiserror::Error;

/// Reasons a bounded wait for a permit can fail
#[derive(Error, Debug, Clone)]
pub enum GateError {
    /// No slot freed up before the wait's time limit
    #[error("timed out after {timeout:?} waiting for one of {capacity} slots")]
    Timeout {
        /// The requested wait
        timeout: Duration,
        /// Capacity of the gate
        capacity: usize,
    },

    /// The cancellation signal fired before a slot freed up
    #[error("cancelled while waiting for one of {capacity} slots")]
    Cancelled {
        /// Capacity of the gate
        capacity: usize,
        /// Why the signal fired
        #[source]
        cause: CancelCause,
    },
}

impl GateError {
    /// Whether the wait ran out of time
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether the wait was cancelled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// The cancellation cause, for [`GateError::Cancelled`]
    #[must_use]
    pub fn cancel_cause(&self) -> Option<&CancelCause> {
        match self {
            Self::Cancelled { cause, .. } => Some(cause),
            Self::Timeout { .. } => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, GateError>;
