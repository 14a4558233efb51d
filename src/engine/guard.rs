//! Re-entrancy guard
//!
//! A single compare-and-set cell owned by the job it protects. Acquiring it
//! hands out a token; dropping the token releases the guard, so release
//! happens on success, error and unwind alike.

use std::sync::atomic::{AtomicBool, Ordering};

/// Guard admitting at most one pass at a time
#[derive(Debug, Default)]
pub struct PassGuard {
    running: AtomicBool,
}

impl PassGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the guard, or `None` if a pass already holds it
    pub fn try_acquire(&self) -> Option<PassToken<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| PassToken { guard: self })
    }

    pub fn is_held(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Proof of holding the guard; releases it on drop
#[derive(Debug)]
pub struct PassToken<'a> {
    guard: &'a PassGuard,
}

impl Drop for PassToken<'_> {
    fn drop(&mut self) {
        self.guard.running.store(false, Ordering::Release);
    }
}
