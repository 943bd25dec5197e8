//! Address tables - the block addresses an owner hands to the reclaimer
//!
//! Owners keep their slots current when a block moves. The reclaimer zeroes
//! each slot as it releases the block, so a zero slot is never freed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Fixed-length array of block addresses shared by an owner and its registration
pub struct AddressTable {
    slots: Box<[AtomicUsize]>,
}

impl AddressTable {
    /// Table holding `addresses` in order
    pub fn new(addresses: &[usize]) -> Self {
        Self {
            slots: addresses.iter().map(|&a| AtomicUsize::new(a)).collect(),
        }
    }

    /// Table of `len` zero slots
    pub fn with_len(len: usize) -> Self {
        Self {
            slots: (0..len).map(|_| AtomicUsize::new(0)).collect(),
        }
    }

    /// Shared table holding `addresses`
    pub fn shared(addresses: &[usize]) -> Arc<Self> {
        Arc::new(Self::new(addresses))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when no slot holds a live address
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|s| s.load(Ordering::Acquire) == 0)
    }

    /// Address in slot `index` (0 when released or out of range)
    #[inline]
    pub fn get(&self, index: usize) -> usize {
        self.slots.get(index).map_or(0, |s| s.load(Ordering::Acquire))
    }

    /// Replace slot `index`, returning the previous address
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[inline]
    pub fn set(&self, index: usize, address: usize) -> usize {
        self.slots[index].swap(address, Ordering::AcqRel)
    }

    /// Zero slot `index`, returning the address it held
    #[inline]
    pub fn take(&self, index: usize) -> usize {
        self.slots.get(index).map_or(0, |s| s.swap(0, Ordering::AcqRel))
    }

    /// Snapshot of all slots
    pub fn addresses(&self) -> Vec<usize> {
        self.slots.iter().map(|s| s.load(Ordering::Acquire)).collect()
    }
}

impl core::fmt::Debug for AddressTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list()
            .entries(self.addresses().iter().map(|a| format!("{:#x}", a)))
            .finish()
    }
}

/// An object that owns arena blocks through an address table
pub trait Reclaimable {
    fn address_table(&self) -> &Arc<AddressTable>;
}

/// A bare shared table stands for an owner still under construction
impl Reclaimable for Arc<AddressTable> {
    fn address_table(&self) -> &Arc<AddressTable> {
        self
    }
}
