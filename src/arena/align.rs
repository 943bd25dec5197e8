//! Allocation-size policy - power-of-two rounding
//!
//! Rounded blocks are also address-aligned to their rounded size, capped at
//! one page.

use super::header::MIN_ALIGN;

/// Largest address alignment handed out for rounded blocks
pub const PAGE_SIZE: usize = 4096;

/// Size policy applied by `Arena::allocate_aligned`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizePolicy {
    pub enabled: bool,
    pub max_aligned_size: usize,
}

/// Outcome of applying the policy to one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Bytes actually reserved for the caller
    pub size: usize,
    /// `size - requested`
    pub overhead: usize,
    /// Address alignment
    pub align: usize,
}

impl SizePolicy {
    pub const fn new(enabled: bool, max_aligned_size: usize) -> Self {
        Self { enabled, max_aligned_size }
    }

    /// Placement for an unrounded request
    #[inline]
    pub const fn exact(size: usize) -> Placement {
        Placement { size, overhead: 0, align: MIN_ALIGN }
    }

    /// Placement for a request subject to rounding
    ///
    /// Falls back to `exact` when rounding is off, the request is above the
    /// ceiling, or the next power of two does not fit in `usize`.
    pub fn place(&self, size: usize) -> Placement {
        if !self.enabled || size > self.max_aligned_size {
            return Self::exact(size);
        }

        match size.max(1).checked_next_power_of_two() {
            Some(rounded) => Placement {
                size: rounded,
                overhead: rounded - size,
                align: rounded.clamp(MIN_ALIGN, PAGE_SIZE),
            },
            None => Self::exact(size),
        }
    }
}

/// Align address upward to next multiple of alignment
#[inline(always)]
pub const fn align_up(addr: usize, align: usize) -> usize {
    (addr.wrapping_add(align).wrapping_sub(1)) & !align.wrapping_sub(1)
}
