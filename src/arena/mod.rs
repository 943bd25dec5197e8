//! Memory arena - raw block allocation with optional tracking
//!
//! Design: Two-layer architecture:
//! 1. System allocator for the blocks themselves (one block per request)
//! 2. Prefix header + optional tracking table for bookkeeping
//!
//! Blocks are handed out as numeric addresses. Releasing them is `unsafe`
//! and normally left to the reclaimer, which fires exactly once per owner.

mod align;
mod header;
mod tracking;


pub use align::{align_up, Placement, SizePolicy, PAGE_SIZE};
pub use header::{BlockHeader, MIN_ALIGN};
pub use tracking::{AllocationEntry, ArenaStats};

use crate::config::MemoryConfig;
use crate::error::{ArenaError, Result};
use crate::logging::{log_allocation, log_allocation_failure, log_deallocation, log_reallocation};
use std::alloc::{alloc, dealloc, realloc};
use std::sync::atomic::{AtomicI64, Ordering};
use tracking::AllocationTable;

/// Handle to one block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Allocation {
    address: usize,
    size: usize,
    overhead: usize,
}

impl Allocation {
    /// Numeric block address (never zero)
    #[inline]
    pub fn address(&self) -> usize {
        self.address
    }

    /// Bytes the caller asked for
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Extra bytes reserved by power-of-two rounding
    #[inline]
    pub fn overhead(&self) -> usize {
        self.overhead
    }

    /// Bytes that may be written starting at `address`
    #[inline]
    pub fn capacity(&self) -> usize {
        self.size + self.overhead
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.address as *mut u8
    }
}

/// Raw block arena
pub struct Arena {
    policy: SizePolicy,
    table: Option<AllocationTable>,
    pending: AtomicI64,
}

impl Arena {
    pub fn new(config: &MemoryConfig) -> Self {
        Self {
            policy: SizePolicy::new(config.align_allocations, config.max_aligned_size),
            table: config.track_allocations.then(AllocationTable::new),
            pending: AtomicI64::new(0),
        }
    }

    /// Whether the tracking table is maintained
    #[inline]
    pub fn is_tracking(&self) -> bool {
        self.table.is_some()
    }

    /// Size policy used by `allocate_aligned`
    #[inline]
    pub fn policy(&self) -> SizePolicy {
        self.policy
    }

    /// Reserve exactly `size` bytes
    pub fn allocate(&self, size: usize) -> Result<Allocation> {
        self.reserve(size, SizePolicy::exact(size), false)
    }

    /// Reserve `size` bytes, rounded to a power of two when alignment is on
    pub fn allocate_aligned(&self, size: usize) -> Result<Allocation> {
        self.reserve(size, self.policy.place(size), self.policy.enabled)
    }

    /// Grow or shrink a block, preserving `min(old, new)` bytes
    ///
    /// The old address is invalid afterwards. On failure the old block is
    /// left untouched.
    ///
    /// # Safety
    ///
    /// `address` must be a live block from this arena, and no other thread
    /// may access the block during the call.
    pub unsafe fn reallocate(&self, address: usize, new_size: usize) -> Result<Allocation> {
        let old = BlockHeader::read(address);
        let placement = if old.rounded {
            self.policy.place(new_size)
        } else {
            SizePolicy::exact(new_size)
        };
        let align = placement.align.max(MIN_ALIGN);

        let updated = if align == old.align {
            let old_layout = old.layout().ok_or(ArenaError::SizeOverflow { requested: old.size })?;
            let new_layout = header::block_layout(placement.size, align)
                .ok_or(ArenaError::SizeOverflow { requested: new_size })?;

            // The address must leave the table before the allocator can hand it out again
            self.untrack(address);
            let base = realloc((address - old.span()) as *mut u8, old_layout, new_layout.size());
            if base.is_null() {
                self.track(address, old);
                log_allocation_failure(new_size);
                return Err(ArenaError::OutOfMemory { requested: new_size });
            }

            let header = BlockHeader::new(placement.size, placement.overhead, align, old.rounded);
            let moved = base as usize + header.span();
            header.write(moved);
            self.track(moved, header);
            moved
        } else {
            let fresh = self.reserve(new_size, placement, old.rounded)?;
            core::ptr::copy_nonoverlapping(
                address as *const u8,
                fresh.as_ptr(),
                old.size.min(fresh.capacity()),
            );
            self.free(address);
            fresh.address
        };

        log_reallocation(address, updated, new_size);

        Ok(Allocation {
            address: updated,
            size: new_size,
            overhead: placement.overhead,
        })
    }

    /// Release a block
    ///
    /// # Safety
    ///
    /// `address` must be a live block from this arena. It must not be used
    /// again, and must not be freed twice.
    pub unsafe fn free(&self, address: usize) {
        let header = BlockHeader::read(address);
        let Some(layout) = header.layout() else {
            // Unreachable for blocks this arena produced
            debug_assert!(false, "corrupt header at {:#x}", address);
            return;
        };

        self.untrack(address);
        dealloc((address - header.span()) as *mut u8, layout);
        log_deallocation(address, header.size);
    }

    /// Header of a live block
    ///
    /// # Safety
    ///
    /// `address` must be a live block from this arena.
    pub unsafe fn header(&self, address: usize) -> BlockHeader {
        BlockHeader::read(address)
    }

    /// Whether `address` is a live block (`None` when untracked)
    pub fn is_live(&self, address: usize) -> Option<bool> {
        self.table.as_ref().map(|t| t.get(address).is_some())
    }

    /// Tracked entry for a live block
    pub fn entry(&self, address: usize) -> Option<AllocationEntry> {
        self.table.as_ref()?.get(address)
    }

    /// Aggregate statistics (`ArenaStats::DISABLED` when untracked)
    pub fn stats(&self) -> ArenaStats {
        match &self.table {
            Some(table) => table.stats(self.pending.load(Ordering::Relaxed)),
            None => ArenaStats::DISABLED,
        }
    }

    /// Adjust the count of owners awaiting reclamation
    pub(crate) fn note_pending(&self, delta: i64) {
        self.pending.fetch_add(delta, Ordering::Relaxed);
    }

    fn reserve(&self, requested: usize, placement: Placement, rounded: bool) -> Result<Allocation> {
        let align = placement.align.max(MIN_ALIGN);
        let layout = header::block_layout(placement.size, align)
            .ok_or(ArenaError::SizeOverflow { requested })?;

        let base = unsafe { alloc(layout) };
        if base.is_null() {
            log_allocation_failure(requested);
            return Err(ArenaError::OutOfMemory { requested });
        }

        let header = BlockHeader::new(placement.size, placement.overhead, align, rounded);
        let address = base as usize + header.span();
        debug_assert_eq!(align_up(address, align), address);

        // SAFETY: the span in front of `address` lies inside the fresh block
        unsafe { header.write(address) };
        self.track(address, header);
        log_allocation(address, requested, placement.overhead);

        Ok(Allocation {
            address,
            size: requested,
            overhead: placement.overhead,
        })
    }

    #[inline]
    fn track(&self, address: usize, header: BlockHeader) {
        if let Some(table) = &self.table {
            table.insert(
                address,
                AllocationEntry {
                    size: header.size,
                    overhead: header.overhead,
                },
            );
        }
    }

    #[inline]
    fn untrack(&self, address: usize) {
        if let Some(table) = &self.table {
            table.remove(address);
        }
    }
}
