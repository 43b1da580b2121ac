//! Lock-free single-slot error register shared by the jobs of one call.
//!
//! Precedence on `record`:
//! - empty slot: any error is installed, cancellation included;
//! - occupied slot, cancellation error: dropped;
//! - occupied slot, any other error: replaces the current one.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use crate::error::PrimError;

/// Holds at most one `PrimError`. `record` is a CAS loop and never blocks.
pub struct ErrorSlot {
    // Null when empty. A pointer taken out by a successful CAS is owned by the
    // thread that took it; loaded pointers are only ever compared.
    current: AtomicPtr<PrimError>,
}

impl ErrorSlot {
    pub fn new() -> Self {
        Self {
            current: AtomicPtr::new(ptr::null_mut()),
        }
    }

    pub fn record(&self, err: PrimError) {
        let is_cancellation = err.is_cancellation();
        let new = Box::into_raw(Box::new(err));
        let mut existing = self.current.load(Ordering::Acquire);
        loop {
            if !existing.is_null() && is_cancellation {
                // SAFETY: `new` came from Box::into_raw above and was never published.
                drop(unsafe { Box::from_raw(new) });
                return;
            }
            match self
                .current
                .compare_exchange_weak(existing, new, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(replaced) => {
                    if !replaced.is_null() {
                        // SAFETY: the CAS removed `replaced` from the slot, so no
                        // other thread can take it again.
                        drop(unsafe { Box::from_raw(replaced) });
                    }
                    return;
                }
                Err(actual) => existing = actual,
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.current.load(Ordering::Acquire).is_null()
    }

    /// Take the final error. Call after every writer has finished.
    pub fn drain(self) -> Option<PrimError> {
        let taken = self.current.swap(ptr::null_mut(), Ordering::AcqRel);
        if taken.is_null() {
            None
        } else {
            // SAFETY: swapped out of the slot; `self` is consumed so nothing else
            // can reach it.
            Some(*unsafe { Box::from_raw(taken) })
        }
    }
}

impl Default for ErrorSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ErrorSlot {
    fn drop(&mut self) {
        let taken = *self.current.get_mut();
        if !taken.is_null() {
            // SAFETY: `&mut self` means no concurrent writers remain.
            drop(unsafe { Box::from_raw(taken) });
        }
    }
}

impl std::fmt::Debug for ErrorSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorSlot")
            .field("empty", &self.is_empty())
            .finish()
    }
}
