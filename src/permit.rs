//! Capability-typed permits
//!
//! A function that must only run while a gate's limit is obeyed takes an
//! [`Enforced<T>`] argument. The trait is sealed, so the only values that
//! satisfy it are permits handed out by a `Gate<T>` and the explicit
//! [`Unlimited<T>`] bypass. The tag `T` keeps one gate's permits from standing
//! in for another's.
//!
//! ```rust
//! use admission_gate::{unlimited, Enforced};
//!
//! struct Uploads;
//!
//! fn upload(_proof: &impl Enforced<Uploads>) {}
//!
//! upload(&unlimited::<Uploads>());
//! ```

use std::marker::PhantomData;

use slot_sync::SlotPool;

mod sealed {
    pub trait Sealed<T> {}
}

/// Proof that the caller satisfied a `Gate<T>`
///
/// Carries no operations. Take `&impl Enforced<T>` when a function only needs
/// evidence of admission, not the power to release it.
pub trait Enforced<T>: sealed::Sealed<T> {}

/// An admission handed out by a `Gate<T>`
///
/// A permit either holds one of the gate's slots or is a no-op permit that
/// holds nothing (the wait was cancelled before a slot was claimed). The slot
/// is returned by [`release`](Self::release) or, failing that, on drop.
/// Either way it is returned exactly once.
#[must_use = "dropping a permit releases its slot immediately"]
pub struct Permit<T> {
    slot: Option<SlotPool>,
    _tag: PhantomData<fn() -> T>,
}

impl<T> Permit<T> {
    pub(crate) fn admitted(pool: SlotPool) -> Self {
        Self {
            slot: Some(pool),
            _tag: PhantomData,
        }
    }

    pub(crate) fn noop() -> Self {
        Self {
            slot: None,
            _tag: PhantomData,
        }
    }

    /// Whether this permit holds a slot
    ///
    /// `false` means the wait that produced it was cancelled.
    #[must_use]
    pub fn is_admitted(&self) -> bool {
        self.slot.is_some()
    }

    /// Return the slot to the gate
    ///
    /// Does nothing for a no-op permit.
    pub fn release(mut self) {
        self.release_slot();
    }

    fn release_slot(&mut self) {
        if let Some(pool) = self.slot.take() {
            pool.release();
        }
    }
}

impl<T> Drop for Permit<T> {
    fn drop(&mut self) {
        self.release_slot();
    }
}

impl<T> std::fmt::Debug for Permit<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Permit")
            .field("admitted", &self.is_admitted())
            .finish()
    }
}

impl<T> sealed::Sealed<T> for Permit<T> {}
impl<T> Enforced<T> for Permit<T> {}

/// Proof of admission that bypasses every gate
///
/// For call sites that are exempt from limiting but must still satisfy an
/// [`Enforced<T>`] parameter.
pub struct Unlimited<T> {
    _tag: PhantomData<fn() -> T>,
}

/// Create a bypass token for gates tagged `T`
#[must_use]
pub fn unlimited<T>() -> Unlimited<T> {
    Unlimited { _tag: PhantomData }
}

impl<T> Clone for Unlimited<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Unlimited<T> {}

impl<T> std::fmt::Debug for Unlimited<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Unlimited")
    }
}

impl<T> sealed::Sealed<T> for Unlimited<T> {}
impl<T> Enforced<T> for Unlimited<T> {}
