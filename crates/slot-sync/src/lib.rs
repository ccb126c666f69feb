//! Slot pool and cancellation primitives for compio runtime
//!
//! This crate provides the building blocks of an admission gate that are
//! compatible with the [compio](https://github.com/compio-rs/compio) async
//! runtime.
//!
//! # Primitives
//!
//! - [`SlotPool`] - Fixed-capacity pool of slots with cancellable waiting
//! - [`CancelSource`] / [`CancelSignal`] - Cooperative cancellation carrying a [`CancelCause`]
//!
//! # Example
//!
//! ```rust,no_run
//! use slot_sync::{CancelSource, SlotPool};
//!
//! #[compio::main]
//! async fn main() {
//!     let pool = SlotPool::new(100);
//!     let source = CancelSource::new();
//!
//!     // Spawn many tasks, but only 100 hold a slot at once
//!     for i in 0..1000 {
//!         let pool = pool.clone();
//!         let signal = source.signal();
//!         compio::runtime::spawn(async move {
//!             if pool.acquire_or_cancel(&signal).await {
//!                 println!("Task {}", i);
//!                 pool.release();
//!             }
//!         });
//!     }
//! }
//! ```

pub mod cancel;
mod slot_pool;
mod waiters;

pub use cancel::{CancelCause, CancelSignal, CancelSource, Cancelled};
pub use slot_pool::{Acquire, AcquireOrCancel, SlotPool};
