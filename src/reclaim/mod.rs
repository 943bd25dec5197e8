//! Deferred deallocation - release blocks once their owner is gone
//!
//! Design: The registry holds each owner's address table, never the owner.
//! A `ReclaimGuard` lives inside the owner; dropping the owner drops the
//! guard, which queues an unreachability notice. A background thread drains
//! the queue and releases the blocks:
//! 1. Remove the registration (single fire: the second notice finds nothing)
//! 2. Run the optional cleanup hook, isolating panics
//! 3. Zero every slot and free each non-zero address

mod table;
mod worker;


pub use table::{AddressTable, Reclaimable};

use crate::arena::Arena;
use crate::config::ReclaimConfig;
use crate::error::ConfigError;
use crate::logging::{debug, log_cleanup_failure, log_reclaimed, log_registration, warn};
use dashmap::DashMap;
use flume::Sender;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

type CleanupHook = Box<dyn FnOnce() + Send + 'static>;

/// Messages drained by the reclaimer thread
pub(crate) enum Notice {
    /// Owner of registration `id` is gone
    Unreachable(u64),
    /// Acknowledge once every earlier notice is processed
    Flush(Sender<()>),
}

/// Reclaimer counters for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReclaimStats {
    /// Registrations whose owner is still alive or not yet processed
    pub registered: usize,
    /// Notices queued but not yet processed
    pub pending: i64,
    /// Registrations released so far
    pub reclaimed: u64,
    /// Cleanup hooks that panicked
    pub cleanup_failures: u64,
}

struct Registration {
    table: Arc<AddressTable>,
    hook: Mutex<Option<CleanupHook>>,
}

/// State shared by the reclaimer, its guards and its thread
pub(crate) struct Shared {
    arena: Arc<Arena>,
    registry: DashMap<u64, Registration>,
    pending: AtomicI64,
    reclaimed: AtomicU64,
    failures: AtomicU64,
}

impl Shared {
    fn mark_pending(&self, delta: i64) {
        self.pending.fetch_add(delta, Ordering::Relaxed);
        self.arena.note_pending(delta);
    }

    /// Release one registration; a repeated id is a no-op
    pub(crate) fn reclaim(&self, id: u64) {
        let Some((_, registration)) = self.registry.remove(&id) else {
            debug!(registration = id, "Notice for unknown registration ignored");
            return;
        };

        if let Some(hook) = registration.hook.into_inner() {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(hook)) {
                self.failures.fetch_add(1, Ordering::Relaxed);
                log_cleanup_failure(id, panic_message(panic.as_ref()));
            }
        }

        let table = &registration.table;
        let mut freed = 0;
        for index in 0..table.len() {
            let address = table.take(index);
            if address != 0 {
                // SAFETY: the registry entry was removed above, so this is the
                // only release of the block; the owner is gone.
                unsafe { self.arena.free(address) };
                freed += 1;
            }
        }

        self.reclaimed.fetch_add(1, Ordering::Relaxed);
        log_reclaimed(id, freed);
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Deferred deallocation tracker
pub struct Reclaimer {
    shared: Arc<Shared>,
    sender: Sender<Notice>,
    next_id: AtomicU64,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Reclaimer {
    /// Create the tracker and spawn its thread
    pub fn start(arena: Arc<Arena>, config: &ReclaimConfig) -> Result<Self, ConfigError> {
        let shared = Arc::new(Shared {
            arena,
            registry: DashMap::with_capacity(256),
            pending: AtomicI64::new(0),
            reclaimed: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        });

        let (sender, receiver) = flume::unbounded();
        let handle = worker::spawn(&config.thread_name, Arc::clone(&shared), receiver)
            .map_err(ConfigError::Reclaimer)?;

        Ok(Self {
            shared,
            sender,
            next_id: AtomicU64::new(1),
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Arena the registered blocks belong to
    pub fn arena(&self) -> &Arc<Arena> {
        &self.shared.arena
    }

    /// Register an owner's table for release when its guard drops
    ///
    /// Only the owner's address table is retained. Returns `None` for a table
    /// without live addresses; nothing is registered in that case.
    pub fn register<R: Reclaimable + ?Sized>(&self, owner: &R) -> Option<ReclaimGuard> {
        self.insert(Arc::clone(owner.address_table()), None)
    }

    /// Like `register`, running `hook` before the blocks are released
    ///
    /// A panicking hook is logged and counted; the blocks are released anyway.
    pub fn register_with_cleanup<R, F>(&self, owner: &R, hook: F) -> Option<ReclaimGuard>
    where
        R: Reclaimable + ?Sized,
        F: FnOnce() + Send + 'static,
    {
        self.insert(Arc::clone(owner.address_table()), Some(Box::new(hook)))
    }

    fn insert(&self, table: Arc<AddressTable>, hook: Option<CleanupHook>) -> Option<ReclaimGuard> {
        if table.is_empty() {
            return None;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let addresses = table.len();
        self.shared.registry.insert(
            id,
            Registration {
                table,
                hook: Mutex::new(hook),
            },
        );
        log_registration(id, addresses);

        Some(ReclaimGuard {
            id,
            sender: self.sender.clone(),
            shared: Arc::clone(&self.shared),
        })
    }

    /// Block until every notice queued before this call has been processed
    ///
    /// Must not be called from a cleanup hook.
    pub fn flush(&self) {
        let (ack, done) = flume::bounded(1);
        if self.sender.send(Notice::Flush(ack)).is_err() {
            return;
        }
        let _ = done.recv();
    }

    /// Whether registration `id` is still awaiting release
    pub fn is_registered(&self, id: u64) -> bool {
        self.shared.registry.contains_key(&id)
    }

    pub fn stats(&self) -> ReclaimStats {
        ReclaimStats {
            registered: self.shared.registry.len(),
            pending: self.shared.pending.load(Ordering::Relaxed),
            reclaimed: self.shared.reclaimed.load(Ordering::Relaxed),
            cleanup_failures: self.shared.failures.load(Ordering::Relaxed),
        }
    }

    /// Whether the background thread is still running
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }
}

/// Registration handle stored inside an owner
///
/// Dropping it queues the owner's blocks for release. It fires once.
pub struct ReclaimGuard {
    id: u64,
    sender: Sender<Notice>,
    shared: Arc<Shared>,
}

impl ReclaimGuard {
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl core::fmt::Debug for ReclaimGuard {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ReclaimGuard").field("id", &self.id).finish()
    }
}

impl Drop for ReclaimGuard {
    fn drop(&mut self) {
        self.shared.mark_pending(1);
        if self.sender.send(Notice::Unreachable(self.id)).is_err() {
            // Reclaimer thread is gone; release on the dropping thread
            warn!(registration = self.id, "Reclaimer thread unavailable, releasing inline");
            self.shared.reclaim(self.id);
            self.shared.mark_pending(-1);
        }
    }
}
