//! Direct cells - a lock word plus a plain record, living in arena memory
//!
//! Layout: `[policy word][record]`, `repr(C)`. The cell registers its block
//! with the reclaimer on creation and never frees it itself.

use super::policy::{LockPolicy, Section};
use super::spin::SpinLock;
use crate::arena::MIN_ALIGN;
use crate::engine::Engine;
use crate::error::{ArenaError, Result};
use crate::reclaim::{AddressTable, Reclaimable, ReclaimGuard};
use core::cell::UnsafeCell;
use core::ptr::NonNull;
use std::sync::Arc;

#[repr(C)]
struct Record<P, T> {
    lock: P,
    value: UnsafeCell<T>,
}

/// Owning handle to a locked record in arena memory
pub struct DirectCell<P: LockPolicy, T: Copy + Send + 'static> {
    record: NonNull<Record<P, T>>,
    table: Arc<AddressTable>,
    _reclaim: Option<ReclaimGuard>,
}

impl<P: LockPolicy, T: Copy + Send + 'static> DirectCell<P, T> {
    /// Allocate and register a cell holding `value`
    pub fn new_in(engine: &Engine, value: T) -> Result<Self> {
        Self::with_slots(engine, value, 0)
    }

    /// Cell whose address table has `extra` slots after its own
    ///
    /// Owners that hold further blocks store them in slots `1..=extra` so the
    /// reclaimer releases them together with the record.
    pub(crate) fn with_slots(engine: &Engine, value: T, extra: usize) -> Result<Self> {
        let size = core::mem::size_of::<Record<P, T>>();
        debug_assert!(core::mem::align_of::<Record<P, T>>() <= MIN_ALIGN);

        let block = engine.arena().allocate_aligned(size)?;
        let record = NonNull::new(block.as_ptr() as *mut Record<P, T>)
            .ok_or(ArenaError::OutOfMemory { requested: size })?;

        // SAFETY: fresh block, large enough and at least MIN_ALIGN aligned
        unsafe {
            record.as_ptr().write(Record {
                lock: P::unlocked(),
                value: UnsafeCell::new(value),
            });
        }

        let table = Arc::new(AddressTable::with_len(1 + extra));
        table.set(0, block.address());
        let reclaim = engine.reclaimer().register(&table);

        Ok(Self {
            record,
            table,
            _reclaim: reclaim,
        })
    }

    #[inline]
    fn record(&self) -> &Record<P, T> {
        // SAFETY: the block stays allocated until our guard drops
        unsafe { self.record.as_ref() }
    }

    /// Run `f` inside the critical section
    ///
    /// `f` must not re-enter this cell.
    #[inline]
    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let record = self.record();
        let _section = Section::enter(&record.lock);
        // SAFETY: the section excludes other threads (Concurrent) or the
        // cell is !Sync (Unsynchronized); `f` does not re-enter.
        f(unsafe { &mut *record.value.get() })
    }

    /// Copy of the record
    #[inline]
    pub fn read(&self) -> T {
        self.with(|value| *value)
    }

    /// Replace the record
    #[inline]
    pub fn write(&self, value: T) {
        self.with(|slot| *slot = value);
    }

    /// Lock word at the head of the record
    #[inline]
    pub fn lock(&self) -> &P {
        &self.record().lock
    }

    /// Arena address of the record block
    #[inline]
    pub fn address(&self) -> usize {
        self.record.as_ptr() as usize
    }
}

impl<P: LockPolicy, T: Copy + Send + 'static> Reclaimable for DirectCell<P, T> {
    fn address_table(&self) -> &Arc<AddressTable> {
        &self.table
    }
}

impl<P: LockPolicy, T: Copy + Send + core::fmt::Debug + 'static> core::fmt::Debug for DirectCell<P, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DirectCell")
            .field("address", &format_args!("{:#x}", self.address()))
            .field("concurrent", &P::CONCURRENT)
            .field("value", &self.read())
            .finish()
    }
}

// SAFETY: the cell exclusively owns its block; moving it moves ownership
unsafe impl<P: LockPolicy, T: Copy + Send + 'static> Send for DirectCell<P, T> {}

// SAFETY: every access goes through the spin lock
unsafe impl<T: Copy + Send + 'static> Sync for DirectCell<SpinLock, T> {}
