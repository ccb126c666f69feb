//! admission-gate: bounded-concurrency admission with capability-typed permits
//!
//! A [`Gate<T>`] limits how many callers may perform some action at the same
//! time. Waiting for a [`Permit<T>`] is the only way (short of the explicit
//! [`unlimited`] bypass) to obtain an [`Enforced<T>`] proof, so functions that
//! take that proof can only be reached by callers who obeyed the limit.
//!
//! # Example
//!
//! ```rust,no_run
//! use admission_gate::{CancelSource, Enforced, Gate};
//! use std::time::Duration;
//!
//! struct Downloads;
//!
//! fn download(_proof: &impl Enforced<Downloads>, url: &str) {
//!     println!("fetching {url}");
//! }
//!
//! #[compio::main]
//! async fn main() {
//!     let gate = Gate::<Downloads>::new(10);
//!     let shutdown = CancelSource::new();
//!
//!     match gate.timeout(&shutdown.signal(), Duration::from_secs(2)).await {
//!         Ok(permit) => {
//!             download(&permit, "https://example.com");
//!             permit.release();
//!         }
//!         Err(e) => eprintln!("gave up: {e}"),
//!     }
//! }
//! ```

pub mod cli;
pub mod error;
pub mod gate;
pub mod permit;
pub mod stress;

// Re-export commonly used types
pub use error::{GateError, Result};
pub use gate::{Callback, ForeverMessaging, Gate};
pub use permit::{unlimited, Enforced, Permit, Unlimited};
pub use slot_sync::{CancelCause, CancelSignal, CancelSource};
