//! Concurrency policies - choose the accumulator variant at the type level
//!
//! `Concurrent` guards every access with a `SpinLock`. `Unsynchronized` is a
//! zero-sized no-op for single-writer use; it is `!Sync`, so a record using
//! it cannot be shared between threads.

use super::spin::{Acquired, SpinLock};
use core::cell::Cell;
use core::marker::PhantomData;

/// Lock word stored at the head of every record
pub trait LockPolicy: Send + 'static {
    /// Whether accesses are linearized
    const CONCURRENT: bool;

    fn unlocked() -> Self;

    /// Enter a critical section; returns whether `leave` must be called
    fn enter(&self) -> bool;

    fn leave(&self);
}

/// Spin-locked variant
pub type Concurrent = SpinLock;

impl LockPolicy for SpinLock {
    const CONCURRENT: bool = true;

    #[inline]
    fn unlocked() -> Self {
        SpinLock::new()
    }

    #[inline]
    fn enter(&self) -> bool {
        self.acquire() == Acquired::Fresh
    }

    #[inline]
    fn leave(&self) {
        self.release();
    }
}

/// Unlocked single-writer variant
#[derive(Debug, Default)]
pub struct Unsynchronized {
    _not_sync: PhantomData<Cell<()>>,
}

impl LockPolicy for Unsynchronized {
    const CONCURRENT: bool = false;

    #[inline]
    fn unlocked() -> Self {
        Self::default()
    }

    #[inline(always)]
    fn enter(&self) -> bool {
        false
    }

    #[inline(always)]
    fn leave(&self) {}
}

/// Leaves the critical section on scope exit, unwinding included
pub(crate) struct Section<'a, P: LockPolicy> {
    policy: &'a P,
    owned: bool,
}

impl<'a, P: LockPolicy> Section<'a, P> {
    #[inline]
    pub(crate) fn enter(policy: &'a P) -> Self {
        Self {
            owned: policy.enter(),
            policy,
        }
    }
}

impl<P: LockPolicy> Drop for Section<'_, P> {
    #[inline]
    fn drop(&mut self) {
        if self.owned {
            self.policy.leave();
        }
    }
}
