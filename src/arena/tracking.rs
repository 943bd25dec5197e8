//! Allocation tracking - live block table and byte totals
//!
//! Only present when tracking is enabled. Entries are keyed by the caller's
//! address, so lookups never touch block memory.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};

/// One live block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationEntry {
    /// Bytes reserved for the caller, rounding included
    pub size: usize,
    /// Rounding excess inside `size`
    pub overhead: usize,
}

/// Aggregate arena statistics
///
/// Every field reads `-1` when tracking is disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArenaStats {
    pub total_bytes: i64,
    pub total_overhead_bytes: i64,
    pub live_allocation_count: i64,
    pub pending_reclamation_count: i64,
}

impl ArenaStats {
    /// Value reported in low-overhead mode
    pub const DISABLED: Self = Self {
        total_bytes: -1,
        total_overhead_bytes: -1,
        live_allocation_count: -1,
        pending_reclamation_count: -1,
    };

    pub fn is_disabled(&self) -> bool {
        *self == Self::DISABLED
    }
}

/// Live block table (lock-sharded map + atomic totals)
pub(crate) struct AllocationTable {
    entries: DashMap<usize, AllocationEntry>,
    total_bytes: AtomicI64,
    overhead_bytes: AtomicI64,
}

impl AllocationTable {
    pub(crate) fn new() -> Self {
        Self {
            entries: DashMap::with_capacity(256),
            total_bytes: AtomicI64::new(0),
            overhead_bytes: AtomicI64::new(0),
        }
    }

    pub(crate) fn insert(&self, address: usize, entry: AllocationEntry) {
        if let Some(previous) = self.entries.insert(address, entry) {
            // An address can only reappear after its release was recorded
            debug_assert!(false, "address {:#x} tracked twice", address);
            self.subtract(previous);
        }
        self.total_bytes.fetch_add(entry.size as i64, Ordering::Relaxed);
        self.overhead_bytes.fetch_add(entry.overhead as i64, Ordering::Relaxed);
    }

    pub(crate) fn remove(&self, address: usize) -> Option<AllocationEntry> {
        let (_, entry) = self.entries.remove(&address)?;
        self.subtract(entry);
        Some(entry)
    }

    pub(crate) fn get(&self, address: usize) -> Option<AllocationEntry> {
        self.entries.get(&address).map(|e| *e.value())
    }

    fn subtract(&self, entry: AllocationEntry) {
        self.total_bytes.fetch_sub(entry.size as i64, Ordering::Relaxed);
        self.overhead_bytes.fetch_sub(entry.overhead as i64, Ordering::Relaxed);
    }

    pub(crate) fn stats(&self, pending: i64) -> ArenaStats {
        ArenaStats {
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
            total_overhead_bytes: self.overhead_bytes.load(Ordering::Relaxed),
            live_allocation_count: self.entries.len() as i64,
            pending_reclamation_count: pending,
        }
    }
}
