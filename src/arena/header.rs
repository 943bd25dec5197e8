//! Block metadata - prefix header stored before every allocation
//!
//! Design: Address-only release. The header sits immediately before the
//! address handed to callers, so `free` and `reallocate` recover the layout
//! from the address alone.

use core::alloc::Layout;

/// Minimum alignment of every block (and of the header span)
pub const MIN_ALIGN: usize = 16;

/// Prefix header (32 bytes on 64-bit, padded to the block's header span)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Bytes usable by the caller (rounded size for aligned blocks)
    pub size: usize,
    /// Bytes added by power-of-two rounding
    pub overhead: usize,
    /// Address alignment, also determines the header span
    pub align: usize,
    /// Block came from the rounding path; reallocation keeps rounding it
    pub rounded: bool,
}

impl BlockHeader {
    #[inline]
    pub const fn new(size: usize, overhead: usize, align: usize, rounded: bool) -> Self {
        Self { size, overhead, align, rounded }
    }

    /// Requested size before rounding
    #[inline]
    pub const fn requested(&self) -> usize {
        self.size - self.overhead
    }

    /// Bytes reserved in front of the caller's address
    #[inline]
    pub const fn span(&self) -> usize {
        span_for(self.align)
    }

    /// Layout of the whole block, header included
    #[inline]
    pub fn layout(&self) -> Option<Layout> {
        block_layout(self.size, self.align)
    }

    /// Read the header of a live block
    ///
    /// # Safety
    ///
    /// `address` must be a live block address produced by an arena.
    #[inline]
    pub unsafe fn read(address: usize) -> Self {
        let ptr = (address - core::mem::size_of::<Self>()) as *const Self;
        ptr.read()
    }

    /// Write the header in front of `address`
    ///
    /// # Safety
    ///
    /// `address` must have at least `size_of::<BlockHeader>()` writable bytes
    /// in front of it inside the same block.
    #[inline]
    pub unsafe fn write(self, address: usize) {
        let ptr = (address - core::mem::size_of::<Self>()) as *mut Self;
        ptr.write(self);
    }
}

/// Header span for an alignment: at least one header, always a multiple of `align`
#[inline]
pub const fn span_for(align: usize) -> usize {
    let header = core::mem::size_of::<BlockHeader>();
    let align = if align < MIN_ALIGN { MIN_ALIGN } else { align };
    (header + align - 1) / align * align
}

/// Layout for a block holding `size` caller bytes
#[inline]
pub fn block_layout(size: usize, align: usize) -> Option<Layout> {
    let align = align.max(MIN_ALIGN);
    let total = span_for(align).checked_add(size)?;
    Layout::from_size_align(total, align).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_is_aligned_and_fits_header() {
        assert_eq!(span_for(1), 32);
        assert_eq!(span_for(16), 32);
        assert_eq!(span_for(32), 32);
        assert_eq!(span_for(64), 64);
        assert_eq!(span_for(4096), 4096);
        for align in [16, 32, 64, 128, 4096] {
            assert_eq!(span_for(align) % align, 0);
            assert!(span_for(align) >= core::mem::size_of::<BlockHeader>());
        }
    }

    #[test]
    fn layout_includes_span() {
        let layout = block_layout(100, 16).unwrap();
        assert_eq!(layout.size(), 132);
        assert_eq!(layout.align(), 16);
    }

    #[test]
    fn layout_overflow_is_none() {
        assert!(block_layout(usize::MAX, 16).is_none());
    }

    #[test]
    fn requested_excludes_overhead() {
        let header = BlockHeader::new(128, 28, 128, true);
        assert_eq!(header.requested(), 100);
    }
}
