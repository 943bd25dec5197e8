//! Spin lock - one owner word, busy-wait acquisition
//!
//! The word holds `UNLOCKED` or the token of the owning thread. A thread that
//! already owns the lock re-acquires it as a no-op instead of deadlocking.
//!
//! No fairness, no timeout: under heavy contention a thread may starve.
//! Callers needing a deadline loop over `try_acquire` themselves.

use crossbeam::utils::Backoff;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

/// Owner word value of a free lock
pub const UNLOCKED: u64 = 0;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static TOKEN: u64 = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
}

/// Non-zero token identifying the calling thread (never reused)
#[inline]
pub fn current_thread_token() -> u64 {
    TOKEN.with(|t| *t)
}

/// How an acquisition succeeded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquired {
    /// The word moved from `UNLOCKED` to this thread
    Fresh,
    /// This thread already owned the lock; nothing changed
    Reentrant,
}

/// Spin lock state (8 bytes, placeable in raw memory)
#[repr(transparent)]
pub struct SpinLock {
    word: AtomicU64,
}

impl SpinLock {
    pub const fn new() -> Self {
        Self {
            word: AtomicU64::new(UNLOCKED),
        }
    }

    /// Acquire, yielding the processor between attempts
    #[inline]
    pub fn acquire(&self) -> Acquired {
        self.acquire_with(false)
    }

    /// Acquire; with `barge` the wait busy-spins instead of yielding
    pub fn acquire_with(&self, barge: bool) -> Acquired {
        let me = current_thread_token();
        if self.word.load(Ordering::Relaxed) == me {
            return Acquired::Reentrant;
        }

        let backoff = Backoff::new();
        loop {
            if self
                .word
                .compare_exchange_weak(UNLOCKED, me, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return Acquired::Fresh;
            }

            // Wait on plain loads until the word looks free
            while self.word.load(Ordering::Relaxed) != UNLOCKED {
                if barge {
                    backoff.spin();
                } else {
                    thread::yield_now();
                }
            }
        }
    }

    /// Single attempt; `None` if another thread owns the lock
    pub fn try_acquire(&self) -> Option<Acquired> {
        let me = current_thread_token();
        match self
            .word
            .compare_exchange(UNLOCKED, me, Ordering::Acquire, Ordering::Relaxed)
        {
            Ok(_) => Some(Acquired::Fresh),
            Err(owner) if owner == me => Some(Acquired::Reentrant),
            Err(_) => None,
        }
    }

    /// Release; `false` (and no effect) unless the calling thread owns the lock
    pub fn release(&self) -> bool {
        self.word
            .compare_exchange(current_thread_token(), UNLOCKED, Ordering::Release, Ordering::Relaxed)
            .is_ok()
    }

    #[inline]
    pub fn is_held(&self) -> bool {
        self.word.load(Ordering::Relaxed) != UNLOCKED
    }

    #[inline]
    pub fn is_held_by_current_thread(&self) -> bool {
        self.word.load(Ordering::Relaxed) == current_thread_token()
    }

    /// Token of the owning thread
    #[inline]
    pub fn owner(&self) -> Option<u64> {
        match self.word.load(Ordering::Relaxed) {
            UNLOCKED => None,
            token => Some(token),
        }
    }

    /// Acquire and release on scope exit
    #[inline]
    pub fn lock(&self) -> SpinGuard<'_> {
        SpinGuard::new(self, self.acquire())
    }

    /// `lock` with busy-spinning waits
    #[inline]
    pub fn lock_barging(&self) -> SpinGuard<'_> {
        SpinGuard::new(self, self.acquire_with(true))
    }

    #[inline]
    pub fn try_lock(&self) -> Option<SpinGuard<'_>> {
        self.try_acquire().map(|how| SpinGuard::new(self, how))
    }
}

impl Default for SpinLock {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for SpinLock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SpinLock").field("owner", &self.owner()).finish()
    }
}

/// Scope guard - releases only if it performed the acquisition
pub struct SpinGuard<'a> {
    lock: &'a SpinLock,
    how: Acquired,
}

impl<'a> SpinGuard<'a> {
    #[inline]
    fn new(lock: &'a SpinLock, how: Acquired) -> Self {
        Self { lock, how }
    }

    /// Whether this guard nests inside an outer acquisition
    #[inline]
    pub fn is_reentrant(&self) -> bool {
        self.how == Acquired::Reentrant
    }
}

impl Drop for SpinGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        if self.how == Acquired::Fresh {
            self.lock.release();
        }
    }
}
